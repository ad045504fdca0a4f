//! Gateway identity headers for integration tests.
//!
//! Services behind the gateway receive `x-courier-team-id` once the API key
//! has been authenticated. Tests inject the header directly.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use courier_core::identity::TEAM_ID_HEADER;
use courier_domain::id::TeamId;

pub struct MockTeam {
    pub team_id: TeamId,
}

impl MockTeam {
    pub fn new(team_id: i64) -> Self {
        Self {
            team_id: TeamId(team_id),
        }
    }

    /// Headers as the gateway would inject them.
    pub fn headers(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(
            HeaderName::from_static(TEAM_ID_HEADER),
            HeaderValue::from_str(&self.team_id.to_string()).unwrap(),
        );
        map
    }
}
