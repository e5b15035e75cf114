use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a physical unit.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
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
pub enum UnitStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "reserved")]
    Reserved,
    #[sea_orm(string_value = "sold")]
    Sold,
    #[sea_orm(string_value = "retired")]
    Retired,
}

impl UnitStatus {
    /// Whether `self -> target` is a legal domain transition. `Retired` is terminal.
    pub fn can_transition_to(self, target: UnitStatus) -> bool {
        use UnitStatus::*;
        matches!(
            (self, target),
            (Available, Reserved)
                | (Available, Sold)
                | (Reserved, Sold)
                | (Reserved, Available)
                | (Sold, Available)
                | (Available, Retired)
                | (Reserved, Retired)
        )
    }

    /// Statuses a sale may start from.
    pub fn sellable() -> [UnitStatus; 2] {
        [UnitStatus::Available, UnitStatus::Reserved]
    }

    pub fn is_sellable(self) -> bool {
        Self::sellable().contains(&self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "inventory_units")]
#[schema(as = InventoryUnit)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub serial_number: Option<String>,
    pub warehouse_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub base_price: Decimal,
    pub status: UnitStatus,
    /// Last time `status` changed; the reconciler's grace period is measured from here
    pub status_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sale::Entity")]
    Sales,
}

impl Related<super::sale::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sales.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);

            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.status {
                active_model.status = Set(UnitStatus::Available);
            }
            if let ActiveValue::NotSet = active_model.status_changed_at {
                active_model.status_changed_at = Set(now);
            }
        }

        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    #[test]
    fn retired_is_terminal() {
        for target in UnitStatus::iter() {
            assert!(!UnitStatus::Retired.can_transition_to(target));
        }
    }

    #[test]
    fn sale_paths() {
        assert!(UnitStatus::Available.can_transition_to(UnitStatus::Sold));
        assert!(UnitStatus::Reserved.can_transition_to(UnitStatus::Sold));
        assert!(UnitStatus::Sold.can_transition_to(UnitStatus::Available));
        assert!(!UnitStatus::Sold.can_transition_to(UnitStatus::Reserved));
        assert!(!UnitStatus::Sold.can_transition_to(UnitStatus::Sold));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&UnitStatus::Available).unwrap(),
            "\"available\""
        );
        assert_eq!(UnitStatus::Reserved.to_string(), "reserved");
    }
}
