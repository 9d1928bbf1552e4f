use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entities::{user, Rank};
use crate::errors::ServiceError;

/// Supplies the loyalty rank used for discounts.
#[async_trait]
pub trait RankProvider: Send + Sync {
    async fn get_rank(&self, user_id: Uuid) -> Result<Rank, ServiceError>;
}

/// Reads the rank from the `users` table. Unknown users rank as BRONZE.
#[derive(Clone)]
pub struct DbRankProvider {
    db_pool: Arc<DatabaseConnection>,
}

impl DbRankProvider {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl RankProvider for DbRankProvider {
    #[instrument(skip(self))]
    async fn get_rank(&self, user_id: Uuid) -> Result<Rank, ServiceError> {
        match user::Entity::find_by_id(user_id).one(&*self.db_pool).await? {
            Some(user) => Ok(user.rank),
            None => {
                warn!(%user_id, "User not found; applying default rank");
                Ok(Rank::default())
            }
        }
    }
}

/// Fixed rank for every user.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRankProvider(pub Rank);

#[async_trait]
impl RankProvider for FixedRankProvider {
    async fn get_rank(&self, _user_id: Uuid) -> Result<Rank, ServiceError> {
        Ok(self.0)
    }
}
