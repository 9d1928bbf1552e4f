//! The only writer of `products.stock_quantity` and `products.reserved_quantity`.
//!
//! Every operation is a single guarded `UPDATE` issued on the caller's
//! transaction. The guard lives in the `WHERE` clause so concurrent writers
//! serialize in the database and a counter can never go negative.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::entities::order_item;
use crate::entities::product::{self, Column};
use crate::errors::ServiceError;
use crate::metrics;

fn ensure_positive(product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Stock quantity for product {} must be positive, got {}",
            product_id, quantity
        )));
    }
    Ok(())
}

async fn load(txn: &DatabaseTransaction, product_id: Uuid) -> Result<product::Model, ServiceError> {
    product::Entity::find_by_id(product_id)
        .one(txn)
        .await?
        .ok_or(ServiceError::ProductNotFound(product_id))
}

/// Holds `quantity` units: `reserved += quantity` while `stock - reserved >= quantity`.
#[instrument(skip(txn))]
pub async fn reserve(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    ensure_positive(product_id, quantity)?;

    let result = product::Entity::update_many()
        .col_expr(
            Column::ReservedQuantity,
            Expr::col(Column::ReservedQuantity).add(quantity),
        )
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(product_id))
        .filter(
            Expr::expr(Expr::col(Column::StockQuantity).sub(Expr::col(Column::ReservedQuantity)))
                .gte(quantity),
        )
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        let product = load(txn, product_id).await?;
        return Err(ServiceError::InsufficientStock {
            product_id,
            available: product.available_quantity().max(0),
            requested: quantity,
        });
    }

    metrics::record_ledger_operation("reserve");
    debug!(%product_id, quantity, "Reserved stock");
    Ok(())
}

/// Turns a reservation into a sale: `stock -= quantity; reserved -= quantity`.
#[instrument(skip(txn))]
pub async fn commit(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    ensure_positive(product_id, quantity)?;

    let result = product::Entity::update_many()
        .col_expr(
            Column::StockQuantity,
            Expr::col(Column::StockQuantity).sub(quantity),
        )
        .col_expr(
            Column::ReservedQuantity,
            Expr::col(Column::ReservedQuantity).sub(quantity),
        )
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(product_id))
        .filter(Column::ReservedQuantity.gte(quantity))
        .filter(Column::StockQuantity.gte(quantity))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        let product = load(txn, product_id).await?;
        error!(
            %product_id,
            quantity,
            stock = product.stock_quantity,
            reserved = product.reserved_quantity,
            "Commit without a matching reservation"
        );
        return Err(ServiceError::InventoryError(format!(
            "Cannot commit {} units of product {}: stock {}, reserved {}",
            quantity, product_id, product.stock_quantity, product.reserved_quantity
        )));
    }

    metrics::record_ledger_operation("commit");
    debug!(%product_id, quantity, "Committed stock");
    Ok(())
}

/// Gives a reservation back: `reserved -= quantity`. Stock is untouched.
#[instrument(skip(txn))]
pub async fn release(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    ensure_positive(product_id, quantity)?;

    let result = product::Entity::update_many()
        .col_expr(
            Column::ReservedQuantity,
            Expr::col(Column::ReservedQuantity).sub(quantity),
        )
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(product_id))
        .filter(Column::ReservedQuantity.gte(quantity))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        let product = load(txn, product_id).await?;
        error!(
            %product_id,
            quantity,
            reserved = product.reserved_quantity,
            "Release without a matching reservation"
        );
        return Err(ServiceError::InventoryError(format!(
            "Cannot release {} units of product {}: reserved {}",
            quantity, product_id, product.reserved_quantity
        )));
    }

    metrics::record_ledger_operation("release");
    debug!(%product_id, quantity, "Released stock");
    Ok(())
}

/// Puts sold units back on hand: `stock += quantity`. Used when a paid
/// order is cancelled.
#[instrument(skip(txn))]
pub async fn restock(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    ensure_positive(product_id, quantity)?;

    let result = product::Entity::update_many()
        .col_expr(
            Column::StockQuantity,
            Expr::col(Column::StockQuantity).add(quantity),
        )
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(product_id))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ProductNotFound(product_id));
    }

    metrics::record_ledger_operation("restock");
    debug!(%product_id, quantity, "Restocked");
    Ok(())
}

pub async fn commit_items(
    txn: &DatabaseTransaction,
    items: &[order_item::Model],
) -> Result<(), ServiceError> {
    for item in items {
        commit(txn, item.product_id, item.quantity).await?;
    }
    Ok(())
}

pub async fn release_items(
    txn: &DatabaseTransaction,
    items: &[order_item::Model],
) -> Result<(), ServiceError> {
    for item in items {
        release(txn, item.product_id, item.quantity).await?;
    }
    Ok(())
}

pub async fn restock_items(
    txn: &DatabaseTransaction,
    items: &[order_item::Model],
) -> Result<(), ServiceError> {
    for item in items {
        restock(txn, item.product_id, item.quantity).await?;
    }
    Ok(())
}
