//! Actor context extractors.
//!
//! The authenticating front end terminates the session and forwards the
//! caller's identity in `X-Actor-Id` / `X-Actor-Role` headers. This service
//! trusts those headers; network policy keeps it unreachable except through
//! the front end.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

const ADMIN_ROLE: &str = "admin";

/// Identity of the caller, whatever their role.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub actor_id: String,
    pub role: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor_id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!(
                    "Missing X-Actor-Id header (required from the front end)"
                ))
            })?;

        let role = parts
            .headers
            .get(ACTOR_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!(
                    "Missing X-Actor-Role header (required from the front end)"
                ))
            })?;

        let span = tracing::Span::current();
        span.record("actor_id", actor_id);
        span.record("actor_role", role);

        Ok(ActorContext {
            actor_id: actor_id.to_string(),
            role: role.to_string(),
        })
    }
}

/// Actor context that additionally proves the caller is an administrator.
/// Handlers take this as an argument to gate the override and
/// reconciliation endpoints.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub actor_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let actor = ActorContext::from_request_parts(parts, state).await?;
        if actor.role != ADMIN_ROLE {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "administrator role required"
            )));
        }
        Ok(AdminContext {
            actor_id: actor.actor_id,
        })
    }
}
