use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Dealership Sales API",
        version = "1.0.0",
        description = r#"
# Dealership Sales API

Sale-transaction core for a heavy-equipment dealership.

- **Units**: intake, reservation, price changes, retirement
- **Sales**: one unit to one buyer, priced from base price and discounts
- **Audit**: append-only history for every unit and sale

## Caller identity

Authentication happens upstream. Mutating endpoints require the acting
employee in the `x-employee-id` header.

## Errors

```json
{
  "error": "Conflict",
  "message": "Conflict: unit ... is no longer available for sale",
  "request_id": "req-abc123",
  "timestamp": "2026-10-18T10:30:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Sales", description = "Sale lifecycle endpoints"),
        (name = "Units", description = "Inventory unit endpoints"),
        (name = "Admin", description = "Administrative endpoints")
    ),
    paths(
        // Sales
        crate::handlers::sales::create_sale,
        crate::handlers::sales::list_sales,
        crate::handlers::sales::get_sale,
        crate::handlers::sales::update_sale,
        crate::handlers::sales::cancel_sale,
        crate::handlers::sales::delete_sale,
        crate::handlers::sales::get_sale_history,

        // Units
        crate::handlers::units::create_unit,
        crate::handlers::units::list_units,
        crate::handlers::units::get_unit,
        crate::handlers::units::delete_unit,
        crate::handlers::units::update_price,
        crate::handlers::units::reserve_unit,
        crate::handlers::units::release_unit,
        crate::handlers::units::retire_unit,
        crate::handlers::units::get_unit_history,
        crate::handlers::units::reconcile_unit,

        // Admin
        crate::handlers::admin::run_reconciliation,
    ),
    components(
        schemas(
            crate::entities::inventory_unit::Model,
            crate::entities::sale::Model,
            crate::entities::audit_entry::Model,
            crate::entities::UnitStatus,
            crate::entities::SaleStatus,
            crate::entities::PaymentType,
            crate::entities::AuditOperation,
            crate::entities::SubjectKind,
            crate::handlers::sales::CreateSaleRequest,
            crate::handlers::sales::CreatedSale,
            crate::services::sales::SaleChanges,
            crate::services::inventory::NewUnit,
            crate::handlers::units::UpdatePriceRequest,
            crate::handlers::units::ReconcileUnitResponse,
            crate::services::reconciliation::ReconciliationReport,
            crate::services::reconciliation::UnitReconciliation,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
