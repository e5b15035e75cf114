use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// What kind of row an audit entry describes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubjectKind {
    #[sea_orm(string_value = "unit")]
    Unit,
    #[sea_orm(string_value = "sale")]
    Sale,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditOperation {
    #[sea_orm(string_value = "intake")]
    Intake,
    #[sea_orm(string_value = "transition")]
    Transition,
    #[sea_orm(string_value = "create")]
    Create,
    #[sea_orm(string_value = "update")]
    Update,
    #[sea_orm(string_value = "cancel")]
    Cancel,
    #[sea_orm(string_value = "reserve")]
    Reserve,
    #[sea_orm(string_value = "release")]
    Release,
    #[sea_orm(string_value = "retire")]
    Retire,
    #[sea_orm(string_value = "price_change")]
    PriceChange,
    #[sea_orm(string_value = "delete")]
    Delete,
    /// Unit status diverged from sale history and was left as is
    #[sea_orm(string_value = "discrepancy")]
    Discrepancy,
    /// Compensating `Sold -> Available` for a unit with no active sale
    #[sea_orm(string_value = "reconciliation")]
    Reconciliation,
}

/// Append-only; there is no update path for this table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "audit_entries")]
#[schema(as = AuditEntry)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub subject_id: Uuid,
    pub subject_kind: SubjectKind,
    pub operation: AuditOperation,
    #[schema(value_type = Option<Object>)]
    pub old_value: Option<Json>,
    #[schema(value_type = Option<Object>)]
    pub new_value: Option<Json>,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
