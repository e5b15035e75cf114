pub mod audit_entry;
pub mod corporate_client;
pub mod customer;
pub mod inventory_unit;
pub mod sale;

pub use audit_entry::{AuditOperation, SubjectKind};
pub use inventory_unit::UnitStatus;
pub use sale::{BuyerRef, PaymentType, SaleStatus};
