pub mod admin;
pub mod common;
pub mod sales;
pub mod units;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    AuditTrail, DiscountResolver, InventoryStore, ReconciliationService, SalesCoordinator,
    SeaOrmDiscountResolver,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub inventory: InventoryStore,
    pub sales: SalesCoordinator,
    pub audit: AuditTrail,
    pub reconciliation: ReconciliationService,
}

impl AppServices {
    /// Wires every service against one pool and event channel, with buyer
    /// discounts read from the database.
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, config: &AppConfig) -> Self {
        let discounts: Arc<dyn DiscountResolver> =
            Arc::new(SeaOrmDiscountResolver::new(db_pool.clone()));
        Self::with_discounts(db_pool, event_sender, config, discounts)
    }

    pub fn with_discounts(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        config: &AppConfig,
        discounts: Arc<dyn DiscountResolver>,
    ) -> Self {
        let sales = SalesCoordinator::new(db_pool.clone(), discounts, event_sender.clone())
            .with_max_additional_discount(config.max_additional_discount_percent);

        Self {
            inventory: InventoryStore::new(db_pool.clone(), event_sender.clone()),
            sales,
            audit: AuditTrail::new(db_pool.clone()),
            reconciliation: ReconciliationService::new(
                db_pool,
                event_sender,
                config.reconciliation_grace(),
            ),
        }
    }
}
