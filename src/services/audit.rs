//! Sale Audit Trail
//!
//! Append-only history of every mutation to a sale or an inventory unit.
//! Entries are written on the caller's connection so they share the caller's
//! transaction; reads return newest first.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::audit_entry::{self, Entity as AuditEntryEntity};
use crate::entities::{AuditOperation, SubjectKind};
use crate::errors::ServiceError;

/// Actor recorded for entries written by the background reconciler.
pub const SYSTEM_RECONCILER: &str = "system:reconciler";

/// An entry about to be appended.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub subject_id: Uuid,
    pub subject_kind: SubjectKind,
    pub operation: AuditOperation,
    pub old_value: Option<JsonValue>,
    pub new_value: Option<JsonValue>,
    pub actor: String,
}

impl AuditRecord {
    pub fn unit(unit_id: Uuid, operation: AuditOperation, actor: impl Into<String>) -> Self {
        Self {
            subject_id: unit_id,
            subject_kind: SubjectKind::Unit,
            operation,
            old_value: None,
            new_value: None,
            actor: actor.into(),
        }
    }

    pub fn sale(sale_id: Uuid, operation: AuditOperation, actor: impl Into<String>) -> Self {
        Self {
            subject_id: sale_id,
            subject_kind: SubjectKind::Sale,
            operation,
            old_value: None,
            new_value: None,
            actor: actor.into(),
        }
    }

    pub fn with_old(mut self, value: JsonValue) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn with_new(mut self, value: JsonValue) -> Self {
        self.new_value = Some(value);
        self
    }
}

/// Writes one entry on `conn`, which may be a transaction.
pub async fn append<C>(conn: &C, record: AuditRecord) -> Result<audit_entry::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let entry = audit_entry::ActiveModel {
        subject_id: Set(record.subject_id),
        subject_kind: Set(record.subject_kind),
        operation: Set(record.operation),
        old_value: Set(record.old_value),
        new_value: Set(record.new_value),
        actor: Set(record.actor),
        recorded_at: Set(Utc::now()),
        ..Default::default()
    };

    let saved = entry.insert(conn).await.map_err(ServiceError::db_error)?;
    debug!(
        audit_id = saved.id,
        subject_id = %saved.subject_id,
        operation = %saved.operation,
        "Audit entry appended"
    );
    Ok(saved)
}

/// Read side of the audit trail.
#[derive(Clone)]
pub struct AuditTrail {
    db_pool: Arc<DatabaseConnection>,
}

impl AuditTrail {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    /// Full history of one unit or sale, newest first.
    #[instrument(skip(self))]
    pub async fn get_history(
        &self,
        subject_id: Uuid,
    ) -> Result<Vec<audit_entry::Model>, ServiceError> {
        AuditEntryEntity::find()
            .filter(audit_entry::Column::SubjectId.eq(subject_id))
            .order_by_desc(audit_entry::Column::Id)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}
