use crate::{
    errors::ApiError, services::reconciliation::ReconciliationReport, ApiResponse, AppState,
};
use axum::{extract::State, routing::post, Json, Router};
use tracing::info;

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/reconciliation", post(run_reconciliation))
}

/// Run one reconciliation pass now
#[utoipa::path(
    post,
    path = "/api/v1/admin/reconciliation",
    summary = "Run reconciliation",
    description = "Releases units left sold without a completed sale for longer than the grace period",
    responses(
        (status = 200, description = "Pass completed", body = ApiResponse<ReconciliationReport>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "Admin"
)]
pub async fn run_reconciliation(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ReconciliationReport>>, ApiError> {
    let report = state.services.reconciliation.reconcile_once().await?;
    info!(
        scanned = report.scanned,
        compensated = report.compensated,
        restored = report.restored,
        skipped = report.skipped,
        "Manual reconciliation pass finished"
    );
    Ok(Json(ApiResponse::success(report)))
}
