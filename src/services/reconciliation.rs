//! Consistency check between unit status and sale history.
//!
//! A unit that is `Sold` with no completed sale is the residue of a sale whose
//! persistence failed after the status transition. Once such a unit has been
//! `Sold` for longer than the grace period it is moved back to `Available`
//! through the conditional transition and a `reconciliation` audit entry is
//! written.
//!
//! The opposite drift, an `Available` or `Reserved` unit that a completed sale
//! still points at, is repaired by moving the unit back to `Sold`.

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Query, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::transaction;
use crate::entities::inventory_unit::{self, Entity as InventoryUnitEntity};
use crate::entities::sale::{self, Entity as SaleEntity};
use crate::entities::{AuditOperation, SaleStatus, UnitStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::audit::{self, AuditRecord, SYSTEM_RECONCILER};
use crate::services::inventory::{find_unit, transition_unit, try_transition};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReconciliationReport {
    /// `Sold` units older than the grace period
    pub scanned: u64,
    /// Released back to `Available`
    pub compensated: u64,
    /// Left untouched: backed by a completed sale, or moved on concurrently
    pub skipped: u64,
    /// Sellable units moved back to `Sold` because a completed sale holds them
    #[serde(default)]
    pub restored: u64,
}

/// Result of checking a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnitReconciliation {
    /// Status agrees with sale history
    Consistent,
    /// Orphaned `Sold`, but still inside the grace period
    Pending,
    /// Released back to `Available`
    Compensated,
    /// Moved back to `Sold` to match its completed sale
    Restored,
}

#[derive(Clone)]
pub struct ReconciliationService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    grace: chrono::Duration,
}

impl ReconciliationService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender, grace: Duration) -> Self {
        Self {
            db_pool,
            event_sender,
            grace: chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero()),
        }
    }

    /// One pass over all `Sold` units past the grace period.
    #[instrument(skip(self))]
    pub async fn reconcile_once(&self) -> Result<ReconciliationReport, ServiceError> {
        let cutoff = Utc::now() - self.grace;

        let candidates = InventoryUnitEntity::find()
            .filter(inventory_unit::Column::Status.eq(UnitStatus::Sold))
            .filter(inventory_unit::Column::StatusChangedAt.lte(cutoff))
            .order_by_asc(inventory_unit::Column::StatusChangedAt)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        let mut report = ReconciliationReport {
            scanned: candidates.len() as u64,
            ..Default::default()
        };

        for unit in candidates {
            match self.release_if_orphaned(unit.id, cutoff).await {
                Ok(true) => report.compensated += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.skipped += 1;
                    error!(unit_id = %unit.id, error = %e, "Reconciliation of unit failed");
                }
            }
        }

        let held = InventoryUnitEntity::find()
            .filter(inventory_unit::Column::Status.is_in(UnitStatus::sellable()))
            .filter(
                inventory_unit::Column::Id.in_subquery(
                    Query::select()
                        .column(sale::Column::UnitId)
                        .from(SaleEntity)
                        .and_where(sale::Column::Status.eq(SaleStatus::Completed))
                        .to_owned(),
                ),
            )
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        for unit in held {
            match self.restore_if_held(unit.id).await {
                Ok(true) => report.restored += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.skipped += 1;
                    error!(unit_id = %unit.id, error = %e, "Restoring sold status failed");
                }
            }
        }

        if report.compensated > 0 || report.restored > 0 {
            warn!(
                scanned = report.scanned,
                compensated = report.compensated,
                restored = report.restored,
                "Reconciliation repaired units"
            );
        } else {
            debug!(scanned = report.scanned, "Reconciliation pass found nothing to release");
        }

        Ok(report)
    }

    /// On-demand check of one unit.
    #[instrument(skip(self))]
    pub async fn reconcile_unit(&self, unit_id: Uuid) -> Result<UnitReconciliation, ServiceError> {
        let unit = find_unit(&*self.db_pool, unit_id).await?;
        if unit.status.is_sellable() {
            return Ok(if self.restore_if_held(unit_id).await? {
                UnitReconciliation::Restored
            } else {
                UnitReconciliation::Consistent
            });
        }
        if unit.status != UnitStatus::Sold {
            return Ok(UnitReconciliation::Consistent);
        }

        let cutoff = Utc::now() - self.grace;
        if unit.status_changed_at > cutoff {
            let active = has_completed_sale(&*self.db_pool, unit_id).await?;
            return Ok(if active {
                UnitReconciliation::Consistent
            } else {
                UnitReconciliation::Pending
            });
        }

        if self.release_if_orphaned(unit_id, cutoff).await? {
            Ok(UnitReconciliation::Compensated)
        } else {
            Ok(UnitReconciliation::Consistent)
        }
    }

    /// Releases the unit when it is still `Sold`, past `cutoff`, and has no completed sale.
    async fn release_if_orphaned(
        &self,
        unit_id: Uuid,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let txn = transaction::begin(&*self.db_pool).await?;

        let outcome = async {
            let unit = find_unit(&txn, unit_id).await?;
            if unit.status != UnitStatus::Sold || unit.status_changed_at > cutoff {
                return Ok(false);
            }

            if !try_transition(&txn, unit_id, &[UnitStatus::Sold], UnitStatus::Available).await? {
                return Ok(false);
            }

            // checked after the write so a sale committed while we waited on the row is seen
            if has_completed_sale(&txn, unit_id).await? {
                return Ok(false);
            }

            audit::append(
                &txn,
                AuditRecord::unit(unit_id, AuditOperation::Reconciliation, SYSTEM_RECONCILER)
                    .with_old(json!({
                        "status": UnitStatus::Sold,
                        "status_changed_at": unit.status_changed_at,
                    }))
                    .with_new(json!({
                        "status": UnitStatus::Available,
                        "reason": "sold without a completed sale",
                    })),
            )
            .await?;

            Ok::<_, ServiceError>(true)
        }
        .await;

        match outcome {
            Ok(true) => {
                transaction::commit(txn).await?;
                counter!("dealership.reconciliation.compensated", 1);
                warn!(unit_id = %unit_id, "Orphaned sold unit released");
                self.event_sender.send_or_log(Event::UnitReconciled { unit_id });
                Ok(true)
            }
            Ok(false) => {
                transaction::rollback(txn).await;
                Ok(false)
            }
            Err(e) => {
                transaction::rollback(txn).await;
                Err(e)
            }
        }
    }

    /// Moves a sellable unit back to `Sold` when a completed sale references it.
    async fn restore_if_held(&self, unit_id: Uuid) -> Result<bool, ServiceError> {
        let txn = transaction::begin(&*self.db_pool).await?;

        let outcome = async {
            let Some(sale_id) = completed_sale_of(&txn, unit_id).await? else {
                return Ok(None);
            };

            let Some(from) =
                transition_unit(&txn, unit_id, &UnitStatus::sellable(), UnitStatus::Sold).await?
            else {
                return Ok(None);
            };

            audit::append(
                &txn,
                AuditRecord::unit(unit_id, AuditOperation::Reconciliation, SYSTEM_RECONCILER)
                    .with_old(json!({ "status": from }))
                    .with_new(json!({
                        "status": UnitStatus::Sold,
                        "sale_id": sale_id,
                        "reason": "completed sale references the unit",
                    })),
            )
            .await?;

            Ok::<_, ServiceError>(Some(from))
        }
        .await;

        match outcome {
            Ok(Some(from)) => {
                transaction::commit(txn).await?;
                counter!("dealership.reconciliation.restored", 1);
                warn!(unit_id = %unit_id, from = %from, "Unit restored to sold");
                self.event_sender.send_or_log(Event::UnitStatusChanged {
                    unit_id,
                    from,
                    to: UnitStatus::Sold,
                });
                self.event_sender.send_or_log(Event::UnitReconciled { unit_id });
                Ok(true)
            }
            Ok(None) => {
                transaction::rollback(txn).await;
                Ok(false)
            }
            Err(e) => {
                transaction::rollback(txn).await;
                Err(e)
            }
        }
    }

    /// Runs [`Self::reconcile_once`] every `interval` until the task is aborted.
    pub fn spawn_worker(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Starting reconciliation worker");
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                timer.tick().await;
                if let Err(e) = self.reconcile_once().await {
                    error!(error = %e, "Reconciliation pass failed");
                }
            }
        })
    }
}

async fn completed_sale_of<C>(conn: &C, unit_id: Uuid) -> Result<Option<Uuid>, ServiceError>
where
    C: sea_orm::ConnectionTrait,
{
    let sale = SaleEntity::find()
        .filter(sale::Column::UnitId.eq(unit_id))
        .filter(sale::Column::Status.eq(SaleStatus::Completed))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(sale.map(|sale| sale.id))
}

async fn has_completed_sale<C>(conn: &C, unit_id: Uuid) -> Result<bool, ServiceError>
where
    C: sea_orm::ConnectionTrait,
{
    let count = SaleEntity::find()
        .filter(sale::Column::UnitId.eq(unit_id))
        .filter(sale::Column::Status.eq(SaleStatus::Completed))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(count > 0)
}
