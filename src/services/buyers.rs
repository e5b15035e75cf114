//! Buyer discount resolution.
//!
//! Customers and corporate clients belong to another subsystem; the sale
//! workflow only needs each buyer's discount tier.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::entities::{corporate_client, customer, BuyerRef};
use crate::errors::ServiceError;

/// Source of a buyer's discount percent.
#[async_trait]
pub trait DiscountResolver: Send + Sync {
    /// Percent in `[0, 100]`; `NotFound` when the buyer does not exist.
    async fn discount_percent(&self, buyer: &BuyerRef) -> Result<Decimal, ServiceError>;
}

/// Reads discount tiers from the `customers` and `corporate_clients` tables.
#[derive(Clone)]
pub struct SeaOrmDiscountResolver {
    db_pool: Arc<DatabaseConnection>,
}

impl SeaOrmDiscountResolver {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }
}

/// Stored tiers are maintained elsewhere; keep them within the pricing domain.
fn clamp_percent(buyer: &BuyerRef, stored: Decimal) -> Decimal {
    let clamped = stored.max(Decimal::ZERO).min(Decimal::ONE_HUNDRED);
    if clamped != stored {
        warn!(buyer = %buyer, stored = %stored, "Buyer discount outside [0, 100], clamped");
    }
    clamped
}

#[async_trait]
impl DiscountResolver for SeaOrmDiscountResolver {
    #[instrument(skip(self))]
    async fn discount_percent(&self, buyer: &BuyerRef) -> Result<Decimal, ServiceError> {
        let db = &*self.db_pool;
        let stored = match buyer {
            BuyerRef::Customer(id) => customer::Entity::find_by_id(*id)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?
                .map(|c| c.discount_percent),
            BuyerRef::CorporateClient(id) => corporate_client::Entity::find_by_id(*id)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?
                .map(|c| c.discount_percent),
        };

        stored
            .map(|percent| clamp_percent(buyer, percent))
            .ok_or_else(|| ServiceError::NotFound(format!("Buyer {} not found", buyer)))
    }
}
