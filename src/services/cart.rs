use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::cart_item;
use crate::errors::ServiceError;
use crate::services::stock_validator::CartLine;

/// One line of a user's cart as the cart collaborator reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_at_addition: Decimal,
}

impl From<&CartEntry> for CartLine {
    fn from(entry: &CartEntry) -> Self {
        CartLine::new(entry.product_id, entry.quantity)
    }
}

/// Cart collaborator. Both calls run on the checkout transaction so a
/// rolled-back checkout leaves the cart untouched.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn find_cart(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
    ) -> Result<Vec<CartEntry>, ServiceError>;

    async fn clear(&self, txn: &DatabaseTransaction, user_id: Uuid) -> Result<(), ServiceError>;
}

/// `CartStore` backed by the `cart_items` table.
#[derive(Debug, Clone, Default)]
pub struct DbCartStore;

#[async_trait]
impl CartStore for DbCartStore {
    #[instrument(skip(self, txn))]
    async fn find_cart(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
    ) -> Result<Vec<CartEntry>, ServiceError> {
        let items = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(txn)
            .await?;

        Ok(items
            .into_iter()
            .map(|item| CartEntry {
                product_id: item.product_id,
                quantity: item.quantity,
                price_at_addition: item.price_at_addition,
            })
            .collect())
    }

    #[instrument(skip(self, txn))]
    async fn clear(&self, txn: &DatabaseTransaction, user_id: Uuid) -> Result<(), ServiceError> {
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(txn)
            .await?;
        debug!(%user_id, removed = result.rows_affected, "Cart cleared");
        Ok(())
    }
}
