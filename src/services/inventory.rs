//! Inventory Unit Store
//!
//! Durable storage of equipment units plus the one primitive every status
//! change goes through: [`transition_unit`], a conditional `UPDATE` whose
//! `rows_affected` decides who won. Nothing in the crate writes
//! `inventory_units.status` any other way.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::transaction;
use crate::entities::inventory_unit::{self, Entity as InventoryUnitEntity};
use crate::entities::sale::{self, Entity as SaleEntity};
use crate::entities::{AuditOperation, SaleStatus, UnitStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::audit::{self, AuditRecord};

/// Re-reads before giving up on a status that changed under us.
const TRANSITION_ATTEMPTS: usize = 3;

/// Atomically moves `unit_id` to `target` if and only if its current status is in `expected`.
///
/// Returns `Ok(false)` when the unit is absent, its status is not in `expected`
/// at the moment of the write, or no status in `expected` may legally reach
/// `target`. A lost race is an expected outcome, not an error.
pub async fn try_transition<C>(
    conn: &C,
    unit_id: Uuid,
    expected: &[UnitStatus],
    target: UnitStatus,
) -> Result<bool, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(transition_unit(conn, unit_id, expected, target)
        .await?
        .is_some())
}

/// Same contract as [`try_transition`], returning the status the unit actually left.
///
/// Each write is conditioned on the single status just observed, so the
/// returned value is the one the winning `UPDATE` replaced.
pub async fn transition_unit<C>(
    conn: &C,
    unit_id: Uuid,
    expected: &[UnitStatus],
    target: UnitStatus,
) -> Result<Option<UnitStatus>, ServiceError>
where
    C: ConnectionTrait,
{
    let legal: Vec<UnitStatus> = expected
        .iter()
        .copied()
        .filter(|from| from.can_transition_to(target))
        .collect();
    if legal.is_empty() {
        debug!(unit_id = %unit_id, target = %target, "No legal source status for transition");
        return Ok(None);
    }

    for _ in 0..TRANSITION_ATTEMPTS {
        let observed = InventoryUnitEntity::find_by_id(unit_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|unit| unit.status);
        let from = match observed {
            Some(status) if legal.contains(&status) => status,
            _ => break,
        };

        let now = Utc::now();
        let result = InventoryUnitEntity::update_many()
            .col_expr(inventory_unit::Column::Status, Expr::value(target))
            .col_expr(inventory_unit::Column::StatusChangedAt, Expr::value(now))
            .col_expr(inventory_unit::Column::UpdatedAt, Expr::value(now))
            .filter(inventory_unit::Column::Id.eq(unit_id))
            .filter(inventory_unit::Column::Status.eq(from))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 1 {
            debug!(unit_id = %unit_id, from = %from, target = %target, "Conditional status transition won");
            return Ok(Some(from));
        }
    }

    debug!(unit_id = %unit_id, target = %target, "Conditional status transition lost");
    Ok(None)
}

/// Loads one unit on `conn`.
pub async fn find_unit<C>(conn: &C, unit_id: Uuid) -> Result<inventory_unit::Model, ServiceError>
where
    C: ConnectionTrait,
{
    InventoryUnitEntity::find_by_id(unit_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Inventory unit {} not found", unit_id)))
}

fn status_snapshot(status: UnitStatus) -> serde_json::Value {
    json!({ "status": status })
}

/// Intake payload for a new unit.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct NewUnit {
    pub base_price: Decimal,
    pub warehouse_id: Option<Uuid>,
    #[validate(length(min = 1, max = 64))]
    pub serial_number: Option<String>,
}

/// Filters for [`InventoryStore::list_units`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitFilter {
    pub status: Option<UnitStatus>,
    pub warehouse_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct InventoryStore {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryStore {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// [`try_transition`] on the pool, outside any transaction.
    #[instrument(skip(self))]
    pub async fn try_transition(
        &self,
        unit_id: Uuid,
        expected: &[UnitStatus],
        target: UnitStatus,
    ) -> Result<bool, ServiceError> {
        try_transition(&*self.db_pool, unit_id, expected, target).await
    }

    #[instrument(skip(self))]
    pub async fn get_unit(&self, unit_id: Uuid) -> Result<inventory_unit::Model, ServiceError> {
        find_unit(&*self.db_pool, unit_id).await
    }

    /// Page of units (1-based `page`) plus the total matching count.
    #[instrument(skip(self))]
    pub async fn list_units(
        &self,
        filter: UnitFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<inventory_unit::Model>, u64), ServiceError> {
        let mut query = InventoryUnitEntity::find();
        if let Some(status) = filter.status {
            query = query.filter(inventory_unit::Column::Status.eq(status));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            query = query.filter(inventory_unit::Column::WarehouseId.eq(warehouse_id));
        }

        let paginator = query
            .order_by_desc(inventory_unit::Column::CreatedAt)
            .paginate(&*self.db_pool, per_page.max(1));

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let units = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        Ok((units, total))
    }

    /// Registers a new unit as `Available`.
    #[instrument(skip(self, new_unit), fields(serial_number = ?new_unit.serial_number))]
    pub async fn create_unit(
        &self,
        new_unit: NewUnit,
        actor: &str,
    ) -> Result<inventory_unit::Model, ServiceError> {
        new_unit.validate()?;
        if new_unit.base_price.is_sign_negative() && !new_unit.base_price.is_zero() {
            return Err(ServiceError::ValidationError(
                "base_price must not be negative".to_string(),
            ));
        }

        let txn = transaction::begin(&*self.db_pool).await?;
        let outcome = async {
            let unit = inventory_unit::ActiveModel {
                serial_number: Set(new_unit.serial_number),
                warehouse_id: Set(new_unit.warehouse_id),
                base_price: Set(new_unit.base_price),
                status: Set(UnitStatus::Available),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;

            audit::append(
                &txn,
                AuditRecord::unit(unit.id, AuditOperation::Intake, actor)
                    .with_new(serde_json::to_value(&unit)?),
            )
            .await?;
            Ok::<_, ServiceError>(unit)
        }
        .await;

        match outcome {
            Ok(unit) => {
                transaction::commit(txn).await?;
                info!(unit_id = %unit.id, base_price = %unit.base_price, "Inventory unit registered");
                Ok(unit)
            }
            Err(e) => {
                transaction::rollback(txn).await;
                Err(e)
            }
        }
    }

    /// `Available -> Reserved`
    pub async fn reserve_unit(
        &self,
        unit_id: Uuid,
        actor: &str,
    ) -> Result<inventory_unit::Model, ServiceError> {
        self.transition_audited(
            unit_id,
            &[UnitStatus::Available],
            UnitStatus::Reserved,
            AuditOperation::Reserve,
            actor,
        )
        .await
    }

    /// `Reserved -> Available`
    pub async fn release_unit(
        &self,
        unit_id: Uuid,
        actor: &str,
    ) -> Result<inventory_unit::Model, ServiceError> {
        self.transition_audited(
            unit_id,
            &[UnitStatus::Reserved],
            UnitStatus::Available,
            AuditOperation::Release,
            actor,
        )
        .await
    }

    /// `Available | Reserved -> Retired`. Terminal.
    pub async fn retire_unit(
        &self,
        unit_id: Uuid,
        actor: &str,
    ) -> Result<inventory_unit::Model, ServiceError> {
        self.transition_audited(
            unit_id,
            &UnitStatus::sellable(),
            UnitStatus::Retired,
            AuditOperation::Retire,
            actor,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn transition_audited(
        &self,
        unit_id: Uuid,
        expected: &[UnitStatus],
        target: UnitStatus,
        operation: AuditOperation,
        actor: &str,
    ) -> Result<inventory_unit::Model, ServiceError> {
        let txn = transaction::begin(&*self.db_pool).await?;
        let outcome = async {
            let current = find_unit(&txn, unit_id).await?;

            let Some(from) = transition_unit(&txn, unit_id, expected, target).await? else {
                return Err(ServiceError::Conflict(format!(
                    "unit {} cannot move from {} to {}",
                    unit_id, current.status, target
                )));
            };

            audit::append(
                &txn,
                AuditRecord::unit(unit_id, operation, actor)
                    .with_old(status_snapshot(from))
                    .with_new(status_snapshot(target)),
            )
            .await?;

            let updated = find_unit(&txn, unit_id).await?;
            Ok::<_, ServiceError>((from, updated))
        }
        .await;

        match outcome {
            Ok((from, updated)) => {
                transaction::commit(txn).await?;
                info!(unit_id = %unit_id, from = %from, to = %target, "Unit status changed");
                self.event_sender.send_or_log(Event::UnitStatusChanged {
                    unit_id,
                    from,
                    to: target,
                });
                Ok(updated)
            }
            Err(e) => {
                transaction::rollback(txn).await;
                Err(e)
            }
        }
    }

    /// Changes the list price; only allowed while the unit can still be sold.
    #[instrument(skip(self))]
    pub async fn update_price(
        &self,
        unit_id: Uuid,
        new_price: Decimal,
        actor: &str,
    ) -> Result<inventory_unit::Model, ServiceError> {
        if new_price.is_sign_negative() && !new_price.is_zero() {
            return Err(ServiceError::ValidationError(
                "base_price must not be negative".to_string(),
            ));
        }

        let txn = transaction::begin(&*self.db_pool).await?;
        let outcome = async {
            let current = find_unit(&txn, unit_id).await?;

            // price is frozen once the unit leaves the sellable states
            let result = InventoryUnitEntity::update_many()
                .col_expr(inventory_unit::Column::BasePrice, Expr::value(new_price))
                .col_expr(inventory_unit::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(inventory_unit::Column::Id.eq(unit_id))
                .filter(inventory_unit::Column::Status.is_in(UnitStatus::sellable()))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if result.rows_affected != 1 {
                return Err(ServiceError::Conflict(format!(
                    "price of unit {} is frozen while {}",
                    unit_id, current.status
                )));
            }

            audit::append(
                &txn,
                AuditRecord::unit(unit_id, AuditOperation::PriceChange, actor)
                    .with_old(json!({ "base_price": current.base_price }))
                    .with_new(json!({ "base_price": new_price })),
            )
            .await?;

            find_unit(&txn, unit_id).await
        }
        .await;

        match outcome {
            Ok(unit) => {
                transaction::commit(txn).await?;
                info!(unit_id = %unit_id, base_price = %new_price, "Unit price updated");
                Ok(unit)
            }
            Err(e) => {
                transaction::rollback(txn).await;
                Err(e)
            }
        }
    }

    /// Removes a unit that no active sale references.
    #[instrument(skip(self))]
    pub async fn delete_unit(&self, unit_id: Uuid, actor: &str) -> Result<(), ServiceError> {
        let txn = transaction::begin(&*self.db_pool).await?;
        let outcome = async {
            let current = find_unit(&txn, unit_id).await?;

            let active_sales = SaleEntity::find()
                .filter(sale::Column::UnitId.eq(unit_id))
                .filter(sale::Column::Status.ne(SaleStatus::Cancelled))
                .count(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if active_sales > 0 {
                return Err(ServiceError::Conflict(format!(
                    "unit {} is referenced by an active sale",
                    unit_id
                )));
            }

            // a concurrent sale flips the unit to Sold before inserting its row
            let result = InventoryUnitEntity::delete_many()
                .filter(inventory_unit::Column::Id.eq(unit_id))
                .filter(inventory_unit::Column::Status.ne(UnitStatus::Sold))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if result.rows_affected != 1 {
                return Err(ServiceError::Conflict(format!(
                    "unit {} is sold and cannot be deleted",
                    unit_id
                )));
            }

            audit::append(
                &txn,
                AuditRecord::unit(unit_id, AuditOperation::Delete, actor)
                    .with_old(serde_json::to_value(&current)?),
            )
            .await?;
            Ok::<_, ServiceError>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                transaction::commit(txn).await?;
                info!(unit_id = %unit_id, "Inventory unit deleted");
                Ok(())
            }
            Err(e) => {
                warn!(unit_id = %unit_id, error = %e, "Unit deletion rejected");
                transaction::rollback(txn).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (InventoryStore, tokio::sync::mpsc::Receiver<Event>) {
        let cfg = crate::db::DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            ..Default::default()
        };
        let pool = crate::db::establish_connection_with_config(&cfg)
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let (sender, rx) = crate::events::channel(16);
        (InventoryStore::new(Arc::new(pool), sender), rx)
    }

    async fn intake(store: &InventoryStore) -> Uuid {
        store
            .create_unit(
                NewUnit {
                    base_price: Decimal::new(1_500_000, 2),
                    warehouse_id: None,
                    serial_number: None,
                },
                "tester",
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn transition_unit_reports_the_status_it_left() {
        let (store, _rx) = store().await;
        let db = &*store.db_pool;
        let unit_id = intake(&store).await;

        let reserved = transition_unit(db, unit_id, &[UnitStatus::Available], UnitStatus::Reserved)
            .await
            .unwrap();
        assert_eq!(reserved, Some(UnitStatus::Available));

        // read as sellable, but what it actually left is Reserved
        let sold = transition_unit(db, unit_id, &UnitStatus::sellable(), UnitStatus::Sold)
            .await
            .unwrap();
        assert_eq!(sold, Some(UnitStatus::Reserved));

        let again = transition_unit(db, unit_id, &UnitStatus::sellable(), UnitStatus::Sold)
            .await
            .unwrap();
        assert_eq!(again, None);
        assert_eq!(store.get_unit(unit_id).await.unwrap().status, UnitStatus::Sold);
    }

    #[tokio::test]
    async fn transition_unit_refuses_illegal_and_missing() {
        let (store, _rx) = store().await;
        let db = &*store.db_pool;
        let unit_id = intake(&store).await;

        assert_eq!(
            transition_unit(db, unit_id, &[UnitStatus::Retired], UnitStatus::Available)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            transition_unit(db, Uuid::new_v4(), &[UnitStatus::Available], UnitStatus::Sold)
                .await
                .unwrap(),
            None
        );
        assert!(!try_transition(db, unit_id, &[UnitStatus::Reserved], UnitStatus::Sold)
            .await
            .unwrap());
        assert_eq!(
            store.get_unit(unit_id).await.unwrap().status,
            UnitStatus::Available
        );
    }

    #[tokio::test]
    async fn reserve_audit_records_actual_source_status() {
        let (store, _rx) = store().await;
        let unit_id = intake(&store).await;

        store.reserve_unit(unit_id, "tester").await.unwrap();
        store.release_unit(unit_id, "tester").await.unwrap();

        let history = crate::services::audit::AuditTrail::new(store.db_pool.clone())
            .get_history(unit_id)
            .await
            .unwrap();
        let released = &history[0];
        assert_eq!(
            released.old_value.as_ref().and_then(|v| v.get("status")),
            Some(&json!(UnitStatus::Reserved))
        );
        assert_eq!(
            released.new_value.as_ref().and_then(|v| v.get("status")),
            Some(&json!(UnitStatus::Available))
        );
    }
}
