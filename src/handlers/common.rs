use crate::errors::ApiError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

/// Header carrying the authenticated employee. Authentication itself happens upstream.
pub const EMPLOYEE_ID_HEADER: &str = "x-employee-id";

pub const MAX_PER_PAGE: u64 = 100;

/// The employee performing a mutating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub Uuid);

impl Actor {
    pub fn employee_id(&self) -> Uuid {
        self.0
    }

    /// Form stored in the audit trail
    pub fn audit_name(&self) -> String {
        self.0.to_string()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(EMPLOYEE_ID_HEADER)
            .ok_or_else(|| ApiError::BadRequest {
                message: format!("{} header is required", EMPLOYEE_ID_HEADER),
            })?
            .to_str()
            .map_err(|_| ApiError::BadRequest {
                message: format!("{} header is not valid text", EMPLOYEE_ID_HEADER),
            })?;

        let employee_id = Uuid::parse_str(raw.trim()).map_err(|_| ApiError::BadRequest {
            message: format!("{} must be a UUID", EMPLOYEE_ID_HEADER),
        })?;

        if employee_id.is_nil() {
            return Err(ApiError::BadRequest {
                message: format!("{} must not be the nil UUID", EMPLOYEE_ID_HEADER),
            });
        }

        Ok(Actor(employee_id))
    }
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(format!("Validation failed: {}", e)))
}

/// Pagination parameters for list operations
#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationParams {
    /// Page number and page size forced into their valid ranges
    pub fn normalized(&self) -> (u64, u64) {
        (self.page.max(1), self.per_page.clamp(1, MAX_PER_PAGE))
    }
}

pub fn total_pages(total: u64, per_page: u64) -> u64 {
    if total == 0 || per_page == 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<Actor, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(EMPLOYEE_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn actor_is_read_from_header() {
        let id = Uuid::new_v4();
        let actor = extract(Some(&id.to_string())).await.unwrap();
        assert_eq!(actor.employee_id(), id);
        assert_eq!(actor.audit_name(), id.to_string());
    }

    #[tokio::test]
    async fn missing_or_malformed_actor_is_rejected() {
        assert!(matches!(extract(None).await, Err(ApiError::BadRequest { .. })));
        assert!(matches!(
            extract(Some("sales-desk")).await,
            Err(ApiError::BadRequest { .. })
        ));
        assert!(matches!(
            extract(Some("00000000-0000-0000-0000-000000000000")).await,
            Err(ApiError::BadRequest { .. })
        ));
    }

    #[test]
    fn pagination_is_clamped() {
        let params = PaginationParams {
            page: 0,
            per_page: 10_000,
        };
        assert_eq!(params.normalized(), (1, MAX_PER_PAGE));
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(41, 20), 3);
    }
}
