#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use dealership_sales::{
    config::AppConfig,
    db,
    entities::{corporate_client, customer, inventory_unit, sale, PaymentType},
    events::{self, EventSender},
    handlers::common::EMPLOYEE_ID_HEADER,
    services::{
        inventory::NewUnit, sales::NewSale, AuditTrail, InventoryStore, ReconciliationService,
        SalesCoordinator,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// Fresh SQLite database in its own temp dir, schema applied by the real migrator.
pub struct TestContext {
    pub state: AppState,
    pub employee_id: Uuid,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Same as [`TestContext::new`] with a chance to tweak the configuration first.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = dir.path().join("dealership_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // single connection unless a test asks for `pooled`
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.reconciliation_grace_secs = 0;
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = events::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);

        Self {
            state,
            employee_id: Uuid::new_v4(),
            _event_task: event_task,
            _dir: dir,
        }
    }

    /// A pool of `connections` SQLite connections sharing one WAL-mode file.
    pub async fn pooled(connections: u32) -> Self {
        Self::with_config(|cfg| {
            cfg.db_max_connections = connections;
            cfg.db_min_connections = connections;
        })
        .await
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub fn db_arc(&self) -> Arc<DatabaseConnection> {
        self.state.db.clone()
    }

    pub fn event_sender(&self) -> EventSender {
        self.state.event_sender.clone()
    }

    pub fn inventory(&self) -> &InventoryStore {
        &self.state.services.inventory
    }

    pub fn sales(&self) -> &SalesCoordinator {
        &self.state.services.sales
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.state.services.audit
    }

    pub fn reconciliation(&self) -> &ReconciliationService {
        &self.state.services.reconciliation
    }

    pub fn actor(&self) -> String {
        self.employee_id.to_string()
    }

    pub fn router(&self) -> Router {
        dealership_sales::app_router(self.state.clone())
    }

    pub async fn seed_unit(&self, base_price: Decimal) -> inventory_unit::Model {
        self.inventory()
            .create_unit(
                NewUnit {
                    base_price,
                    warehouse_id: None,
                    serial_number: Some(format!("SN-{}", &Uuid::new_v4().simple().to_string()[..8])),
                },
                &self.actor(),
            )
            .await
            .expect("seed unit")
    }

    pub async fn seed_customer(&self, discount_percent: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        customer::ActiveModel {
            id: Set(id),
            full_name: Set("Dana Field".to_string()),
            discount_percent: Set(discount_percent),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed customer");
        id
    }

    pub async fn seed_corporate_client(&self, discount_percent: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        corporate_client::ActiveModel {
            id: Set(id),
            company_name: Set("Ridge Quarry Ltd".to_string()),
            discount_percent: Set(discount_percent),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed corporate client");
        id
    }

    pub fn new_sale(&self, unit_id: Uuid, customer_id: Uuid) -> NewSale {
        NewSale {
            unit_id,
            customer_id: Some(customer_id),
            corporate_client_id: None,
            employee_id: self.employee_id,
            payment_type: PaymentType::Cash,
            additional_discount_percent: Decimal::ZERO,
            contract_number: None,
            notes: None,
        }
    }

    pub async fn sell(&self, unit_id: Uuid, customer_id: Uuid) -> sale::Model {
        let sale_id = self
            .sales()
            .create_sale(self.new_sale(unit_id, customer_id))
            .await
            .expect("create sale");
        self.sales().get_sale(sale_id).await.expect("load sale")
    }

    /// Sends a request through the full router, as the context's employee.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let actor = self.actor();
        self.request_with_headers(method, uri, body, &[(EMPLOYEE_ID_HEADER, actor.as_str())])
            .await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("response body is not json")
    }
}
