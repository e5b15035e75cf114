// Sale-transaction core
pub mod inventory;
pub mod pricing;
pub mod sales;

// Collaborators and background consistency
pub mod audit;
pub mod buyers;
pub mod reconciliation;

pub use audit::AuditTrail;
pub use buyers::{DiscountResolver, SeaOrmDiscountResolver};
pub use inventory::InventoryStore;
pub use reconciliation::ReconciliationService;
pub use sales::SalesCoordinator;
