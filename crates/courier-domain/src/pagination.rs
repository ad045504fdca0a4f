//! Pagination for list endpoints. Lists are returned newest first.

use serde::{Deserialize, Serialize};

/// Page selection shared by list endpoints.
///
/// - `limit`: 1–100, default 20
/// - `page`: ≥ 1, default 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_limit() -> u32 {
    20
}

fn default_page() -> u32 {
    1
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            page: default_page(),
        }
    }
}

impl PageRequest {
    pub fn new(limit: u32, page: u32) -> Self {
        Self { limit, page }.clamped()
    }

    /// Clamp `limit` to 1–100 and `page` to ≥ 1.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, 100),
            page: self.page.max(1),
        }
    }

    /// Rows to skip for this page, after clamping.
    pub fn offset(&self) -> u64 {
        let p = self.clamped();
        u64::from(p.page - 1) * u64::from(p.limit)
    }
}
