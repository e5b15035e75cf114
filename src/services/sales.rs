//! Sale Transaction Coordinator
//!
//! Turns a sale request into a consistent (Sale, InventoryUnit, AuditEntry)
//! update. The conditional `Available|Reserved -> Sold` transition is the sole
//! authority on whether a sale may proceed; the sale row and its audit
//! entries are written afterwards in one transaction, which first checks
//! that the unit is still `Sold`. If that transaction fails the unit is
//! released again right away, and the periodic reconciler covers the case
//! where even that release fails.

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::transaction;
use crate::entities::audit_entry;
use crate::entities::inventory_unit;
use crate::entities::sale::{self, Entity as SaleEntity};
use crate::entities::{AuditOperation, BuyerRef, PaymentType, SaleStatus, UnitStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::audit::{self, AuditRecord, AuditTrail, SYSTEM_RECONCILER};
use crate::services::buyers::DiscountResolver;
use crate::services::inventory::{find_unit, transition_unit, try_transition};
use crate::services::pricing::{compute_final_price, PriceBreakdown};

pub const DEFAULT_LIST_LIMIT: u64 = 50;
pub const MAX_LIST_LIMIT: u64 = 500;

/// Everything `create_sale` needs. The employee comes from the authenticated caller.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct NewSale {
    pub unit_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub corporate_client_id: Option<Uuid>,
    pub employee_id: Uuid,
    #[serde(default)]
    pub payment_type: PaymentType,
    #[serde(default)]
    pub additional_discount_percent: Decimal,
    #[validate(length(min = 1, max = 64))]
    pub contract_number: Option<String>,
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
}

/// Non-price fields that may change after a sale; `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct SaleChanges {
    pub payment_type: Option<PaymentType>,
    #[validate(length(min = 1, max = 64))]
    pub contract_number: Option<String>,
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
}

impl SaleChanges {
    fn is_empty(&self) -> bool {
        self.payment_type.is_none() && self.contract_number.is_none() && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleFilter {
    pub unit_id: Option<Uuid>,
    pub status: Option<SaleStatus>,
}

/// The partial unique index on active sales turns a duplicate into a conflict.
fn sale_insert_error(unit_id: Uuid, err: DbErr) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict(format!("unit {} already has an active sale", unit_id))
        }
        _ => ServiceError::db_error(err),
    }
}

fn status_snapshot(status: UnitStatus) -> serde_json::Value {
    json!({ "status": status })
}

#[derive(Clone)]
pub struct SalesCoordinator {
    db_pool: Arc<DatabaseConnection>,
    discounts: Arc<dyn DiscountResolver>,
    audit_trail: AuditTrail,
    event_sender: EventSender,
    max_additional_discount_percent: Decimal,
}

impl SalesCoordinator {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        discounts: Arc<dyn DiscountResolver>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            audit_trail: AuditTrail::new(db_pool.clone()),
            db_pool,
            discounts,
            event_sender,
            max_additional_discount_percent: Decimal::ONE_HUNDRED,
        }
    }

    /// Lowers the ceiling for manager-granted discounts (clamped into `[0, 100]`).
    pub fn with_max_additional_discount(mut self, percent: Decimal) -> Self {
        self.max_additional_discount_percent =
            percent.max(Decimal::ZERO).min(Decimal::ONE_HUNDRED);
        self
    }

    fn validate_new_sale(&self, new_sale: &NewSale) -> Result<BuyerRef, ServiceError> {
        new_sale.validate()?;

        let buyer = BuyerRef::from_parts(new_sale.customer_id, new_sale.corporate_client_id)
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "exactly one of customer_id or corporate_client_id must be set".to_string(),
                )
            })?;

        if new_sale.employee_id.is_nil() {
            return Err(ServiceError::ValidationError(
                "employee_id is required".to_string(),
            ));
        }

        let additional = new_sale.additional_discount_percent;
        if additional < Decimal::ZERO || additional > self.max_additional_discount_percent {
            return Err(ServiceError::ValidationError(format!(
                "additional_discount_percent must be between 0 and {} (got {})",
                self.max_additional_discount_percent, additional
            )));
        }

        Ok(buyer)
    }

    /// Sells one unit. Returns the new sale id.
    #[instrument(skip(self, new_sale), fields(unit_id = %new_sale.unit_id, employee_id = %new_sale.employee_id))]
    pub async fn create_sale(&self, new_sale: NewSale) -> Result<Uuid, ServiceError> {
        let db = &*self.db_pool;

        let buyer = self.validate_new_sale(&new_sale)?;
        let unit = find_unit(db, new_sale.unit_id).await?;

        if !unit.status.is_sellable() {
            counter!("dealership.sale.conflict", 1);
            return Err(ServiceError::Conflict(format!(
                "unit {} not available for sale (status {})",
                unit.id, unit.status
            )));
        }

        let buyer_percent = self.discounts.discount_percent(&buyer).await?;
        let price = compute_final_price(
            unit.base_price,
            buyer_percent,
            new_sale.additional_discount_percent,
        )?;

        let Some(from) =
            transition_unit(db, unit.id, &UnitStatus::sellable(), UnitStatus::Sold).await?
        else {
            counter!("dealership.sale.conflict", 1);
            warn!(unit_id = %unit.id, "Lost the race for unit; another sale completed first");
            return Err(ServiceError::Conflict(format!(
                "unit {} is no longer available",
                unit.id
            )));
        };

        let sale_id = Uuid::new_v4();
        match self
            .persist_sale(sale_id, &new_sale, buyer, unit.id, from, &price)
            .await
        {
            Ok(_) => {}
            Err(e @ ServiceError::Conflict(_)) => {
                // the unit is either held by another sale or already released; leave it be
                counter!("dealership.sale.conflict", 1);
                warn!(unit_id = %unit.id, error = %e, "Sale not recorded; unit changed hands");
                return Err(e);
            }
            Err(e) => {
                error!(unit_id = %unit.id, error = %e, "Sale persistence failed after unit was marked sold");
                self.compensate(unit.id, &e).await;
                return Err(e);
            }
        }

        counter!("dealership.sale.created", 1);
        info!(
            sale_id = %sale_id,
            unit_id = %unit.id,
            buyer = %buyer,
            final_price = %price.final_price,
            "Sale completed"
        );

        self.event_sender.send_or_log(Event::UnitStatusChanged {
            unit_id: unit.id,
            from,
            to: UnitStatus::Sold,
        });
        self.event_sender.send_or_log(Event::SaleCompleted {
            sale_id,
            unit_id: unit.id,
            final_price: price.final_price,
        });

        Ok(sale_id)
    }

    /// Sale row plus both audit entries as one unit of work.
    ///
    /// `Conflict` when the unit stopped being `Sold` after `from -> Sold`
    /// (the reconciler released it) or another sale already holds it.
    async fn persist_sale(
        &self,
        sale_id: Uuid,
        new_sale: &NewSale,
        buyer: BuyerRef,
        unit_id: Uuid,
        from: UnitStatus,
        price: &PriceBreakdown,
    ) -> Result<sale::Model, ServiceError> {
        let actor = new_sale.employee_id.to_string();
        let txn = transaction::begin(&*self.db_pool).await?;

        let outcome = async {
            // locks the unit row; a concurrent release either committed first or waits for us
            let touched = inventory_unit::Entity::update_many()
                .col_expr(inventory_unit::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(inventory_unit::Column::Id.eq(unit_id))
                .filter(inventory_unit::Column::Status.eq(UnitStatus::Sold))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if touched.rows_affected != 1 {
                return Err(ServiceError::Conflict(format!(
                    "unit {} was released before the sale was recorded",
                    unit_id
                )));
            }

            let sale = sale::ActiveModel {
                id: Set(sale_id),
                unit_id: Set(unit_id),
                customer_id: Set(buyer.customer_id()),
                corporate_client_id: Set(buyer.corporate_client_id()),
                employee_id: Set(new_sale.employee_id),
                sold_at: Set(Utc::now()),
                base_price: Set(price.base_price),
                discount_amount: Set(price.discount_amount),
                final_price: Set(price.final_price),
                discount_percent: Set(price.discount_percent),
                payment_type: Set(new_sale.payment_type),
                status: Set(SaleStatus::Completed),
                contract_number: Set(new_sale.contract_number.clone()),
                notes: Set(new_sale.notes.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|e| sale_insert_error(unit_id, e))?;

            audit::append(
                &txn,
                AuditRecord::unit(unit_id, AuditOperation::Transition, actor.as_str())
                    .with_old(status_snapshot(from))
                    .with_new(json!({ "status": UnitStatus::Sold, "sale_id": sale_id })),
            )
            .await?;

            audit::append(
                &txn,
                AuditRecord::sale(sale_id, AuditOperation::Create, actor.as_str())
                    .with_new(serde_json::to_value(&sale)?),
            )
            .await?;

            Ok::<_, ServiceError>(sale)
        }
        .await;

        match outcome {
            Ok(sale) => {
                transaction::commit(txn).await?;
                Ok(sale)
            }
            Err(e) => {
                transaction::rollback(txn).await;
                Err(e)
            }
        }
    }

    /// Immediate `Sold -> Available` after a failed persist.
    async fn compensate(&self, unit_id: Uuid, cause: &ServiceError) {
        let db = &*self.db_pool;
        match try_transition(db, unit_id, &[UnitStatus::Sold], UnitStatus::Available).await {
            Ok(true) => {
                counter!("dealership.reconciliation.compensated", 1);
                let record = AuditRecord::unit(
                    unit_id,
                    AuditOperation::Reconciliation,
                    SYSTEM_RECONCILER,
                )
                .with_old(status_snapshot(UnitStatus::Sold))
                .with_new(json!({
                    "status": UnitStatus::Available,
                    "reason": format!("sale persistence failed: {}", cause),
                }));
                if let Err(e) = audit::append(db, record).await {
                    error!(unit_id = %unit_id, error = %e, "Failed to record compensation audit entry");
                }
                warn!(unit_id = %unit_id, "Unit released after failed sale persistence");
                self.event_sender
                    .send_or_log(Event::UnitReconciled { unit_id });
            }
            Ok(false) => {
                warn!(unit_id = %unit_id, "Compensation skipped; unit no longer sold");
            }
            Err(e) => {
                // left for the periodic reconciliation pass
                error!(unit_id = %unit_id, error = %e, "Compensating transition failed");
            }
        }
    }

    /// Cancels a completed sale and releases its unit.
    ///
    /// The cancellation stands even if the unit is no longer `Sold`; in that
    /// case a discrepancy entry is recorded for the unit instead.
    #[instrument(skip(self))]
    pub async fn cancel_sale(&self, sale_id: Uuid, actor: &str) -> Result<(), ServiceError> {
        let txn = transaction::begin(&*self.db_pool).await?;

        let outcome = async {
            let sale = find_sale(&txn, sale_id).await?;
            if !sale.is_active() {
                return Err(ServiceError::Conflict(format!(
                    "sale {} is already cancelled",
                    sale_id
                )));
            }

            // guards against a concurrent cancel of the same sale
            let result = SaleEntity::update_many()
                .col_expr(sale::Column::Status, Expr::value(SaleStatus::Cancelled))
                .col_expr(sale::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(sale::Column::Id.eq(sale_id))
                .filter(sale::Column::Status.eq(SaleStatus::Completed))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if result.rows_affected != 1 {
                return Err(ServiceError::Conflict(format!(
                    "sale {} is already cancelled",
                    sale_id
                )));
            }

            audit::append(
                &txn,
                AuditRecord::sale(sale_id, AuditOperation::Cancel, actor)
                    .with_old(json!({ "status": SaleStatus::Completed }))
                    .with_new(json!({ "status": SaleStatus::Cancelled })),
            )
            .await?;

            let released =
                try_transition(&txn, sale.unit_id, &[UnitStatus::Sold], UnitStatus::Available)
                    .await?;

            if released {
                audit::append(
                    &txn,
                    AuditRecord::unit(sale.unit_id, AuditOperation::Transition, actor)
                        .with_old(json!({ "status": UnitStatus::Sold, "sale_id": sale_id }))
                        .with_new(status_snapshot(UnitStatus::Available)),
                )
                .await?;
            } else {
                let actual = inventory_unit::Entity::find_by_id(sale.unit_id)
                    .one(&txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .map(|unit| unit.status);
                warn!(
                    sale_id = %sale_id,
                    unit_id = %sale.unit_id,
                    actual = ?actual,
                    "Unit diverged from sale history; cancellation recorded without release"
                );
                audit::append(
                    &txn,
                    AuditRecord::unit(sale.unit_id, AuditOperation::Discrepancy, actor)
                        .with_old(json!({ "expected": UnitStatus::Sold, "sale_id": sale_id }))
                        .with_new(json!({ "status": actual })),
                )
                .await?;
            }

            Ok::<_, ServiceError>((sale.unit_id, sale.buyer(), released))
        }
        .await;

        let (unit_id, buyer, released) = match outcome {
            Ok(done) => {
                transaction::commit(txn).await?;
                done
            }
            Err(e) => {
                transaction::rollback(txn).await;
                return Err(e);
            }
        };

        counter!("dealership.sale.cancelled", 1);
        info!(sale_id = %sale_id, unit_id = %unit_id, buyer = ?buyer, released, "Sale cancelled");

        if released {
            self.event_sender.send_or_log(Event::UnitStatusChanged {
                unit_id,
                from: UnitStatus::Sold,
                to: UnitStatus::Available,
            });
        }
        self.event_sender.send_or_log(Event::SaleCancelled {
            sale_id,
            unit_id,
            unit_released: released,
        });

        Ok(())
    }

    /// Deleting a sale is cancelling it; the row stays for history.
    pub async fn delete_sale(&self, sale_id: Uuid, actor: &str) -> Result<(), ServiceError> {
        self.cancel_sale(sale_id, actor).await
    }

    /// Updates payment type, contract number or notes of a completed sale.
    #[instrument(skip(self, changes))]
    pub async fn update_sale(
        &self,
        sale_id: Uuid,
        changes: SaleChanges,
        actor: &str,
    ) -> Result<sale::Model, ServiceError> {
        changes.validate()?;
        if changes.is_empty() {
            return Err(ServiceError::ValidationError(
                "no updatable fields supplied".to_string(),
            ));
        }

        let txn = transaction::begin(&*self.db_pool).await?;

        let outcome = async {
            let before = find_sale(&txn, sale_id).await?;
            if !before.is_active() {
                return Err(ServiceError::Conflict(format!(
                    "sale {} is cancelled and cannot be updated",
                    sale_id
                )));
            }

            let mut update = SaleEntity::update_many()
                .col_expr(sale::Column::UpdatedAt, Expr::value(Utc::now()));
            if let Some(payment_type) = changes.payment_type {
                update = update.col_expr(sale::Column::PaymentType, Expr::value(payment_type));
            }
            if let Some(contract_number) = changes.contract_number.clone() {
                update =
                    update.col_expr(sale::Column::ContractNumber, Expr::value(contract_number));
            }
            if let Some(notes) = changes.notes.clone() {
                update = update.col_expr(sale::Column::Notes, Expr::value(notes));
            }

            let result = update
                .filter(sale::Column::Id.eq(sale_id))
                .filter(sale::Column::Status.eq(SaleStatus::Completed))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if result.rows_affected != 1 {
                return Err(ServiceError::Conflict(format!(
                    "sale {} was cancelled concurrently",
                    sale_id
                )));
            }

            let after = find_sale(&txn, sale_id).await?;
            audit::append(
                &txn,
                AuditRecord::sale(sale_id, AuditOperation::Update, actor)
                    .with_old(json!({
                        "payment_type": before.payment_type,
                        "contract_number": before.contract_number,
                        "notes": before.notes,
                    }))
                    .with_new(json!({
                        "payment_type": after.payment_type,
                        "contract_number": after.contract_number,
                        "notes": after.notes,
                    })),
            )
            .await?;

            Ok::<_, ServiceError>(after)
        }
        .await;

        match outcome {
            Ok(sale) => {
                transaction::commit(txn).await?;
                info!(sale_id = %sale_id, "Sale updated");
                self.event_sender.send_or_log(Event::SaleUpdated(sale_id));
                Ok(sale)
            }
            Err(e) => {
                transaction::rollback(txn).await;
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get_sale(&self, sale_id: Uuid) -> Result<sale::Model, ServiceError> {
        find_sale(&*self.db_pool, sale_id).await
    }

    /// Newest first. `limit` defaults to 50 and is capped at 500.
    #[instrument(skip(self))]
    pub async fn list_sales(
        &self,
        filter: SaleFilter,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<sale::Model>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

        let mut query = SaleEntity::find();
        if let Some(unit_id) = filter.unit_id {
            query = query.filter(sale::Column::UnitId.eq(unit_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(sale::Column::Status.eq(status));
        }

        query
            .order_by_desc(sale::Column::SoldAt)
            .order_by_desc(sale::Column::CreatedAt)
            .limit(limit)
            .offset(offset.unwrap_or(0))
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Audit history of a sale or unit, newest first.
    pub async fn get_history(
        &self,
        subject_id: Uuid,
    ) -> Result<Vec<audit_entry::Model>, ServiceError> {
        self.audit_trail.get_history(subject_id).await
    }
}

async fn find_sale<C>(conn: &C, sale_id: Uuid) -> Result<sale::Model, ServiceError>
where
    C: ConnectionTrait,
{
    SaleEntity::find_by_id(sale_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))
}
