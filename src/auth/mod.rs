//! Actor identity supplied by the upstream session layer.
//!
//! The session gateway in front of this service authenticates staff and
//! forwards who they are as plain headers. Requests without them are treated
//! as anonymous (self-service kiosks).

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ApiError, ServiceError};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// An authenticated staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub role: String,
}

/// Extracts the optional [`Actor`] from request headers.
///
/// A present but malformed `x-actor-id` is rejected rather than silently
/// downgraded to anonymous.
#[derive(Debug, Clone, Default)]
pub struct MaybeActor(pub Option<Actor>);

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw_id) = header_str(parts, ACTOR_ID_HEADER) else {
            return Ok(MaybeActor(None));
        };

        let id = Uuid::parse_str(raw_id).map_err(|_| {
            ServiceError::Unauthorized(format!("Malformed {} header", ACTOR_ID_HEADER))
        })?;

        let name = header_str(parts, ACTOR_NAME_HEADER)
            .unwrap_or("unknown")
            .to_string();
        let role = header_str(parts, ACTOR_ROLE_HEADER)
            .unwrap_or("cashier")
            .to_string();

        Ok(MaybeActor(Some(Actor { id, name, role })))
    }
}
