use crate::{
    entities::{audit_entry, sale, PaymentType, SaleStatus},
    errors::ApiError,
    handlers::common::{validate_input, Actor},
    services::sales::{NewSale, SaleChanges, SaleFilter},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Body of `POST /sales`. The selling employee is taken from the caller.
#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateSaleRequest {
    pub unit_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub corporate_client_id: Option<Uuid>,
    #[serde(default)]
    pub payment_type: PaymentType,
    /// Manager-granted percent on top of the buyer's own discount
    #[serde(default)]
    #[schema(value_type = String, example = "2.5")]
    pub additional_discount_percent: Decimal,
    #[validate(length(min = 1, max = 64))]
    pub contract_number: Option<String>,
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
}

impl CreateSaleRequest {
    fn into_new_sale(self, employee_id: Uuid) -> NewSale {
        NewSale {
            unit_id: self.unit_id,
            customer_id: self.customer_id,
            corporate_client_id: self.corporate_client_id,
            employee_id,
            payment_type: self.payment_type,
            additional_discount_percent: self.additional_discount_percent,
            contract_number: self.contract_number,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedSale {
    pub sale_id: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SaleListQuery {
    /// Only sales of this unit
    pub unit_id: Option<Uuid>,
    pub status: Option<SaleStatus>,
    /// Default 50, max 500
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub fn sales_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_sale).get(list_sales))
        .route("/:id", get(get_sale).put(update_sale).delete(delete_sale))
        .route("/:id/cancel", post(cancel_sale))
        .route("/:id/history", get(get_sale_history))
}

/// Record a sale
#[utoipa::path(
    post,
    path = "/api/v1/sales",
    summary = "Create sale",
    description = "Sell one unit to a customer or corporate client. The unit must be available or reserved.",
    request_body = CreateSaleRequest,
    params(
        ("x-employee-id" = Uuid, Header, description = "Selling employee"),
    ),
    responses(
        (status = 201, description = "Sale recorded", body = ApiResponse<CreatedSale>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unit or buyer not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit no longer available", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Sales"
)]
pub async fn create_sale(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateSaleRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedSale>>), ApiError> {
    validate_input(&request)?;

    let sale_id = state
        .services
        .sales
        .create_sale(request.into_new_sale(actor.employee_id()))
        .await?;

    info!(sale_id = %sale_id, employee_id = %actor.employee_id(), "Sale created via API");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreatedSale { sale_id })),
    ))
}

/// List sales
#[utoipa::path(
    get,
    path = "/api/v1/sales",
    summary = "List sales",
    description = "Sales newest first, optionally filtered by unit and status",
    params(SaleListQuery),
    responses(
        (status = 200, description = "Sales retrieved", body = ApiResponse<Vec<sale::Model>>),
        (status = 400, description = "Invalid query", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Sales"
)]
pub async fn list_sales(
    State(state): State<AppState>,
    Query(query): Query<SaleListQuery>,
) -> Result<Json<ApiResponse<Vec<sale::Model>>>, ApiError> {
    let filter = SaleFilter {
        unit_id: query.unit_id,
        status: query.status,
    };
    let sales = state
        .services
        .sales
        .list_sales(filter, query.limit, query.offset)
        .await?;
    Ok(Json(ApiResponse::success(sales)))
}

/// Get a sale by id
#[utoipa::path(
    get,
    path = "/api/v1/sales/{id}",
    summary = "Get sale",
    params(("id" = Uuid, Path, description = "Sale ID")),
    responses(
        (status = 200, description = "Sale found", body = ApiResponse<sale::Model>),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Sales"
)]
pub async fn get_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<sale::Model>>, ApiError> {
    let sale = state.services.sales.get_sale(id).await?;
    Ok(Json(ApiResponse::success(sale)))
}

/// Update non-price fields of a sale
#[utoipa::path(
    put,
    path = "/api/v1/sales/{id}",
    summary = "Update sale",
    description = "Change payment type, contract number or notes. Prices are fixed at sale time.",
    request_body = SaleChanges,
    params(
        ("id" = Uuid, Path, description = "Sale ID"),
        ("x-employee-id" = Uuid, Header, description = "Acting employee"),
    ),
    responses(
        (status = 200, description = "Sale updated", body = ApiResponse<sale::Model>),
        (status = 400, description = "Nothing to update or invalid value", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Sale is cancelled", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Sales"
)]
pub async fn update_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(changes): Json<SaleChanges>,
) -> Result<Json<ApiResponse<sale::Model>>, ApiError> {
    validate_input(&changes)?;
    let sale = state
        .services
        .sales
        .update_sale(id, changes, &actor.audit_name())
        .await?;
    Ok(Json(ApiResponse::success(sale)))
}

/// Cancel a sale and release its unit
#[utoipa::path(
    post,
    path = "/api/v1/sales/{id}/cancel",
    summary = "Cancel sale",
    params(
        ("id" = Uuid, Path, description = "Sale ID"),
        ("x-employee-id" = Uuid, Header, description = "Acting employee"),
    ),
    responses(
        (status = 204, description = "Sale cancelled"),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Sale already cancelled", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Sales"
)]
pub async fn cancel_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .sales
        .cancel_sale(id, &actor.audit_name())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a sale (cancels it; the record is kept)
#[utoipa::path(
    delete,
    path = "/api/v1/sales/{id}",
    summary = "Delete sale",
    params(
        ("id" = Uuid, Path, description = "Sale ID"),
        ("x-employee-id" = Uuid, Header, description = "Acting employee"),
    ),
    responses(
        (status = 204, description = "Sale cancelled"),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Sale already cancelled", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Sales"
)]
pub async fn delete_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .sales
        .delete_sale(id, &actor.audit_name())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Audit history of a sale
#[utoipa::path(
    get,
    path = "/api/v1/sales/{id}/history",
    summary = "Sale history",
    description = "Audit entries for the sale, newest first",
    params(("id" = Uuid, Path, description = "Sale ID")),
    responses(
        (status = 200, description = "History retrieved", body = ApiResponse<Vec<audit_entry::Model>>),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Sales"
)]
pub async fn get_sale_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<audit_entry::Model>>>, ApiError> {
    // 404 for unknown sales rather than an empty list
    state.services.sales.get_sale(id).await?;
    let history = state.services.sales.get_history(id).await?;
    Ok(Json(ApiResponse::success(history)))
}
