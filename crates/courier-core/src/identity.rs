//! Gateway-injected team identity extractor.

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;

use courier_domain::id::TeamId;

use crate::error::error_response;

pub const TEAM_ID_HEADER: &str = "x-courier-team-id";

/// Team identity injected by the gateway via `x-courier-team-id` after it has
/// authenticated the API key.
///
/// Returns 401 if the header is absent or not an integer.
#[derive(Debug, Clone, Copy)]
pub struct TeamHeaders {
    pub team_id: TeamId,
}

impl<S> FromRequestParts<S> for TeamHeaders
where
    S: Send + Sync,
{
    type Rejection = Response;

    // axum-core 0.5 defines this as `fn -> impl Future + Send`. Extract synchronously
    // and return a 'static async block so no borrow of `parts` is captured.
    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let team_id = parts
            .headers
            .get(TEAM_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<TeamId>().ok());

        async move {
            let team_id = team_id.ok_or_else(|| {
                error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "unauthorized")
            })?;
            Ok(Self { team_id })
        }
    }
}
