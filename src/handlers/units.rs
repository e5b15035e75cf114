use crate::{
    entities::{audit_entry, inventory_unit, UnitStatus},
    errors::ApiError,
    handlers::common::{total_pages, validate_input, Actor, PaginationParams},
    services::{
        inventory::{NewUnit, UnitFilter},
        reconciliation::UnitReconciliation,
    },
    ApiResponse, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct UnitListQuery {
    pub status: Option<UnitStatus>,
    pub warehouse_id: Option<Uuid>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
}

impl UnitListQuery {
    fn pagination(&self) -> PaginationParams {
        let defaults = PaginationParams::default();
        PaginationParams {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdatePriceRequest {
    #[schema(value_type = String, example = "125000.00")]
    pub base_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReconcileUnitResponse {
    pub unit_id: Uuid,
    pub outcome: UnitReconciliation,
}

pub fn units_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_unit).get(list_units))
        .route("/:id", get(get_unit).delete(delete_unit))
        .route("/:id/price", put(update_price))
        .route("/:id/reserve", post(reserve_unit))
        .route("/:id/release", post(release_unit))
        .route("/:id/retire", post(retire_unit))
        .route("/:id/history", get(get_unit_history))
        .route("/:id/reconcile", post(reconcile_unit))
}

/// Register a unit
#[utoipa::path(
    post,
    path = "/api/v1/units",
    summary = "Register unit",
    description = "Intake of a new unit; it starts out available",
    request_body = NewUnit,
    params(("x-employee-id" = Uuid, Header, description = "Acting employee")),
    responses(
        (status = 201, description = "Unit registered", body = ApiResponse<inventory_unit::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Units"
)]
pub async fn create_unit(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<NewUnit>,
) -> Result<(StatusCode, Json<ApiResponse<inventory_unit::Model>>), ApiError> {
    validate_input(&request)?;
    let unit = state
        .services
        .inventory
        .create_unit(request, &actor.audit_name())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(unit))))
}

/// List units
#[utoipa::path(
    get,
    path = "/api/v1/units",
    summary = "List units",
    params(UnitListQuery),
    responses(
        (status = 200, description = "Units retrieved", body = ApiResponse<PaginatedResponse<inventory_unit::Model>>),
        (status = 400, description = "Invalid query", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Units"
)]
pub async fn list_units(
    State(state): State<AppState>,
    Query(query): Query<UnitListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<inventory_unit::Model>>>, ApiError> {
    let (page, per_page) = query.pagination().normalized();
    let filter = UnitFilter {
        status: query.status,
        warehouse_id: query.warehouse_id,
    };

    let (items, total) = state
        .services
        .inventory
        .list_units(filter, page, per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit: per_page,
        total_pages: total_pages(total, per_page),
    })))
}

/// Get a unit by id
#[utoipa::path(
    get,
    path = "/api/v1/units/{id}",
    summary = "Get unit",
    params(("id" = Uuid, Path, description = "Unit ID")),
    responses(
        (status = 200, description = "Unit found", body = ApiResponse<inventory_unit::Model>),
        (status = 404, description = "Unit not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Units"
)]
pub async fn get_unit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<inventory_unit::Model>>, ApiError> {
    let unit = state.services.inventory.get_unit(id).await?;
    Ok(Json(ApiResponse::success(unit)))
}

/// Delete a unit that no active sale references
#[utoipa::path(
    delete,
    path = "/api/v1/units/{id}",
    summary = "Delete unit",
    params(
        ("id" = Uuid, Path, description = "Unit ID"),
        ("x-employee-id" = Uuid, Header, description = "Acting employee"),
    ),
    responses(
        (status = 204, description = "Unit deleted"),
        (status = 404, description = "Unit not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit is sold or referenced by a sale", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Units"
)]
pub async fn delete_unit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .inventory
        .delete_unit(id, &actor.audit_name())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change the list price
#[utoipa::path(
    put,
    path = "/api/v1/units/{id}/price",
    summary = "Update unit price",
    description = "Allowed only while the unit is available or reserved",
    request_body = UpdatePriceRequest,
    params(
        ("id" = Uuid, Path, description = "Unit ID"),
        ("x-employee-id" = Uuid, Header, description = "Acting employee"),
    ),
    responses(
        (status = 200, description = "Price updated", body = ApiResponse<inventory_unit::Model>),
        (status = 400, description = "Negative price", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unit not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit is sold or retired", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Units"
)]
pub async fn update_price(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(request): Json<UpdatePriceRequest>,
) -> Result<Json<ApiResponse<inventory_unit::Model>>, ApiError> {
    let unit = state
        .services
        .inventory
        .update_price(id, request.base_price, &actor.audit_name())
        .await?;
    Ok(Json(ApiResponse::success(unit)))
}

/// Hold a unit (test drive, pending paperwork)
#[utoipa::path(
    post,
    path = "/api/v1/units/{id}/reserve",
    summary = "Reserve unit",
    params(
        ("id" = Uuid, Path, description = "Unit ID"),
        ("x-employee-id" = Uuid, Header, description = "Acting employee"),
    ),
    responses(
        (status = 200, description = "Unit reserved", body = ApiResponse<inventory_unit::Model>),
        (status = 404, description = "Unit not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit is not available", body = crate::errors::ErrorResponse),
    ),
    tag = "Units"
)]
pub async fn reserve_unit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<ApiResponse<inventory_unit::Model>>, ApiError> {
    let unit = state
        .services
        .inventory
        .reserve_unit(id, &actor.audit_name())
        .await?;
    Ok(Json(ApiResponse::success(unit)))
}

/// Drop a reservation
#[utoipa::path(
    post,
    path = "/api/v1/units/{id}/release",
    summary = "Release unit",
    params(
        ("id" = Uuid, Path, description = "Unit ID"),
        ("x-employee-id" = Uuid, Header, description = "Acting employee"),
    ),
    responses(
        (status = 200, description = "Unit available again", body = ApiResponse<inventory_unit::Model>),
        (status = 404, description = "Unit not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit is not reserved", body = crate::errors::ErrorResponse),
    ),
    tag = "Units"
)]
pub async fn release_unit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<ApiResponse<inventory_unit::Model>>, ApiError> {
    let unit = state
        .services
        .inventory
        .release_unit(id, &actor.audit_name())
        .await?;
    Ok(Json(ApiResponse::success(unit)))
}

/// Take a unit out of inventory for good
#[utoipa::path(
    post,
    path = "/api/v1/units/{id}/retire",
    summary = "Retire unit",
    params(
        ("id" = Uuid, Path, description = "Unit ID"),
        ("x-employee-id" = Uuid, Header, description = "Acting employee"),
    ),
    responses(
        (status = 200, description = "Unit retired", body = ApiResponse<inventory_unit::Model>),
        (status = 404, description = "Unit not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit is sold or already retired", body = crate::errors::ErrorResponse),
    ),
    tag = "Units"
)]
pub async fn retire_unit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<ApiResponse<inventory_unit::Model>>, ApiError> {
    let unit = state
        .services
        .inventory
        .retire_unit(id, &actor.audit_name())
        .await?;
    Ok(Json(ApiResponse::success(unit)))
}

/// Audit history of a unit
#[utoipa::path(
    get,
    path = "/api/v1/units/{id}/history",
    summary = "Unit history",
    params(("id" = Uuid, Path, description = "Unit ID")),
    responses(
        (status = 200, description = "History retrieved", body = ApiResponse<Vec<audit_entry::Model>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Units"
)]
pub async fn get_unit_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<audit_entry::Model>>>, ApiError> {
    // Deleted units keep their history, so no existence check here
    let history = state.services.audit.get_history(id).await?;
    Ok(Json(ApiResponse::success(history)))
}

/// Check one unit against its sale history
#[utoipa::path(
    post,
    path = "/api/v1/units/{id}/reconcile",
    summary = "Reconcile unit",
    description = "Releases a unit that is sold without a completed sale once the grace period has passed",
    params(("id" = Uuid, Path, description = "Unit ID")),
    responses(
        (status = 200, description = "Check completed", body = ApiResponse<ReconcileUnitResponse>),
        (status = 404, description = "Unit not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Units"
)]
pub async fn reconcile_unit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReconcileUnitResponse>>, ApiError> {
    let outcome = state.services.reconciliation.reconcile_unit(id).await?;
    Ok(Json(ApiResponse::success(ReconcileUnitResponse {
        unit_id: id,
        outcome,
    })))
}
