use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::order::{Column, Entity as Order, Model as OrderModel};
use crate::entities::order_item::{
    Column as OrderItemColumn, Entity as OrderItem, Model as OrderItemModel,
};
use crate::errors::ServiceError;

/// Repository for order reads and row locks
#[derive(Debug, Clone)]
pub struct OrderRepository {
    db: Arc<DatabaseConnection>,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an order by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(id).one(&*self.db).await?)
    }

    /// Find an order only if it belongs to `user_id`
    pub async fn find_for_customer(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    /// Find orders by customer ID, newest first. `page` is 1-based.
    pub async fn find_by_customer(
        &self,
        user_id: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::OrderDate)
            .order_by_desc(Column::Id)
            .paginate(&*self.db, page_size.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total))
    }

    /// Get order items for an order
    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemModel>, ServiceError> {
        Self::items_for(&*self.db, order_id).await
    }

    /// Items of an order, ordered by product so stock rows are always
    /// touched in the same order.
    pub async fn items_for<C>(conn: &C, order_id: Uuid) -> Result<Vec<OrderItemModel>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(OrderItem::find()
            .filter(OrderItemColumn::OrderId.eq(order_id))
            .order_by_asc(OrderItemColumn::ProductId)
            .all(conn)
            .await?)
    }

    /// `SELECT ... FOR UPDATE` on the order row. The lock is held until `txn` ends.
    pub async fn lock_by_id(
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(id).lock_exclusive().one(txn).await?)
    }

    /// Same as [`Self::lock_by_id`] but scoped to the owning user.
    pub async fn lock_for_customer(
        txn: &DatabaseTransaction,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(txn)
            .await?)
    }
}
