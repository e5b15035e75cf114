use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

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
pub enum SaleStatus {
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum PaymentType {
    #[default]
    #[sea_orm(string_value = "cash")]
    Cash,
    #[sea_orm(string_value = "cashless")]
    Cashless,
    #[sea_orm(string_value = "credit")]
    Credit,
    #[sea_orm(string_value = "leasing")]
    Leasing,
}

/// The party buying a unit: exactly one of an individual customer or a corporate client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BuyerRef {
    Customer(Uuid),
    CorporateClient(Uuid),
}

impl BuyerRef {
    /// Builds a reference from the two nullable columns/fields; `None` unless exactly one is set.
    pub fn from_parts(customer_id: Option<Uuid>, corporate_client_id: Option<Uuid>) -> Option<Self> {
        match (customer_id, corporate_client_id) {
            (Some(id), None) => Some(BuyerRef::Customer(id)),
            (None, Some(id)) => Some(BuyerRef::CorporateClient(id)),
            _ => None,
        }
    }

    pub fn customer_id(&self) -> Option<Uuid> {
        match self {
            BuyerRef::Customer(id) => Some(*id),
            BuyerRef::CorporateClient(_) => None,
        }
    }

    pub fn corporate_client_id(&self) -> Option<Uuid> {
        match self {
            BuyerRef::CorporateClient(id) => Some(*id),
            BuyerRef::Customer(_) => None,
        }
    }
}

impl std::fmt::Display for BuyerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuyerRef::Customer(id) => write!(f, "customer:{}", id),
            BuyerRef::CorporateClient(id) => write!(f, "corporate_client:{}", id),
        }
    }
}

/// The `sales` table. Price columns are frozen at creation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "sales")]
#[schema(as = Sale)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub unit_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub corporate_client_id: Option<Uuid>,
    pub employee_id: Uuid,
    pub sold_at: DateTime<Utc>,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub base_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub discount_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub final_price: Decimal,
    /// Combined (buyer + additional) percent actually applied, after capping
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub discount_percent: Decimal,
    pub payment_type: PaymentType,
    pub status: SaleStatus,
    pub contract_number: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn buyer(&self) -> Option<BuyerRef> {
        BuyerRef::from_parts(self.customer_id, self.corporate_client_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == SaleStatus::Completed
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_unit::Entity",
        from = "Column::UnitId",
        to = "super::inventory_unit::Column::Id"
    )]
    Unit,
}

impl Related<super::inventory_unit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Unit.def()
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
        }

        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buyer_ref_requires_exactly_one_kind() {
        let id = Uuid::new_v4();
        assert_eq!(
            BuyerRef::from_parts(Some(id), None),
            Some(BuyerRef::Customer(id))
        );
        assert_eq!(
            BuyerRef::from_parts(None, Some(id)),
            Some(BuyerRef::CorporateClient(id))
        );
        assert_eq!(BuyerRef::from_parts(None, None), None);
        assert_eq!(BuyerRef::from_parts(Some(id), Some(id)), None);
    }

    #[test]
    fn payment_type_defaults_to_cash() {
        assert_eq!(PaymentType::default(), PaymentType::Cash);
        let parsed: PaymentType = serde_json::from_str("\"leasing\"").unwrap();
        assert_eq!(parsed, PaymentType::Leasing);
    }

    #[test]
    fn model_reports_buyer_and_activity() {
        let corporate = Uuid::new_v4();
        let now = Utc::now();
        let mut sale = Model {
            id: Uuid::new_v4(),
            unit_id: Uuid::new_v4(),
            customer_id: None,
            corporate_client_id: Some(corporate),
            employee_id: Uuid::new_v4(),
            sold_at: now,
            base_price: Decimal::new(100_000, 0),
            discount_amount: Decimal::ZERO,
            final_price: Decimal::new(100_000, 0),
            discount_percent: Decimal::ZERO,
            payment_type: PaymentType::Credit,
            status: SaleStatus::Completed,
            contract_number: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(sale.buyer(), Some(BuyerRef::CorporateClient(corporate)));
        assert!(sale.is_active());

        sale.status = SaleStatus::Cancelled;
        assert!(!sale.is_active());
    }
}
