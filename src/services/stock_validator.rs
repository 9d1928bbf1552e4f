//! Availability check and repricing of cart lines before checkout.

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::entities::product;
use crate::errors::ServiceError;

/// A requested quantity of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

impl CartLine {
    pub fn new(product_id: Uuid, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A cart line priced at the product's current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl PricedLine {
    /// `None` when the total does not fit in a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Sums the line totals, rejecting carts whose amount overflows.
pub fn order_total(lines: &[PricedLine]) -> Result<Decimal, ServiceError> {
    lines.iter().try_fold(Decimal::ZERO, |total, line| {
        line.line_total()
            .and_then(|line_total| total.checked_add(line_total))
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "order amount is out of range at product {}",
                    line.product_id
                ))
            })
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedCart {
    /// Sorted by product id.
    pub lines: Vec<PricedLine>,
    pub original_amount: Decimal,
}

/// Merges lines for the same product and sorts by product id.
///
/// Fails on non-positive quantities or when a merged quantity overflows.
pub fn normalize(lines: &[CartLine]) -> Result<Vec<CartLine>, ServiceError> {
    let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in lines {
        if line.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for product {} must be positive, got {}",
                line.product_id, line.quantity
            )));
        }
        let entry = merged.entry(line.product_id).or_insert(0);
        *entry = entry.checked_add(line.quantity).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Quantity for product {} is too large",
                line.product_id
            ))
        })?;
    }

    Ok(merged
        .into_iter()
        .map(|(product_id, quantity)| CartLine::new(product_id, quantity))
        .collect())
}

/// Checks `stock - reserved >= quantity` for every line and prices the
/// lines at the current product price. Nothing is written.
///
/// All lines must pass; the first failing product aborts the validation.
#[instrument(skip(conn, lines), fields(lines = lines.len()))]
pub async fn validate<C>(conn: &C, lines: &[CartLine]) -> Result<ValidatedCart, ServiceError>
where
    C: ConnectionTrait,
{
    let lines = normalize(lines)?;
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one cart line is required".to_string(),
        ));
    }

    let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let products: HashMap<Uuid, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut priced = Vec::with_capacity(lines.len());

    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or(ServiceError::ProductNotFound(line.product_id))?;

        let available = product.available_quantity();
        if available < line.quantity {
            warn!(
                product_id = %line.product_id,
                available,
                requested = line.quantity,
                "Insufficient stock"
            );
            return Err(ServiceError::InsufficientStock {
                product_id: line.product_id,
                available: available.max(0),
                requested: line.quantity,
            });
        }

        priced.push(PricedLine {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: product.price,
        });
    }

    let original_amount = order_total(&priced)?;

    debug!(%original_amount, "Cart validated");

    Ok(ValidatedCart {
        lines: priced,
        original_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn normalize_merges_and_sorts() {
        let a = Uuid::from_u128(2);
        let b = Uuid::from_u128(1);
        let lines = normalize(&[CartLine::new(a, 1), CartLine::new(b, 2), CartLine::new(a, 3)])
            .unwrap();
        assert_eq!(lines, vec![CartLine::new(b, 2), CartLine::new(a, 4)]);
    }

    #[test]
    fn normalize_rejects_non_positive_quantities() {
        let id = Uuid::new_v4();
        assert_matches!(
            normalize(&[CartLine::new(id, 0)]),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            normalize(&[CartLine::new(id, -2)]),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn order_total_sums_lines() {
        let lines = [
            PricedLine {
                product_id: Uuid::from_u128(1),
                quantity: 3,
                unit_price: Decimal::new(1250, 2),
            },
            PricedLine {
                product_id: Uuid::from_u128(2),
                quantity: 2,
                unit_price: Decimal::new(5, 1),
            },
        ];
        assert_eq!(order_total(&lines).unwrap(), Decimal::new(3850, 2));
        assert_eq!(order_total(&[]).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn order_total_rejects_overflow_instead_of_panicking() {
        let huge = PricedLine {
            product_id: Uuid::from_u128(1),
            quantity: 2,
            unit_price: Decimal::MAX,
        };
        assert!(huge.line_total().is_none());
        assert_matches!(order_total(&[huge]), Err(ServiceError::ValidationError(_)));

        let half = PricedLine {
            product_id: Uuid::from_u128(2),
            quantity: 1,
            unit_price: Decimal::MAX / Decimal::TWO + Decimal::ONE,
        };
        assert_matches!(
            order_total(&[half.clone(), half]),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn normalize_rejects_overflow() {
        let id = Uuid::new_v4();
        assert_matches!(
            normalize(&[CartLine::new(id, i32::MAX), CartLine::new(id, 1)]),
            Err(ServiceError::ValidationError(_))
        );
    }
}
