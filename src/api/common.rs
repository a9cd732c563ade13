//! Common API utilities and shared types

use serde::Deserialize;

use crate::models::{ListParams, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// `?page=&pageSize=` as sent by clients.
///
/// Kept signed and optional so out-of-range values are normalized rather
/// than rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageQuery {
    /// Page parameters for the plain list endpoints
    pub fn params(&self) -> ListParams {
        ListParams::normalize(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(0),
            DEFAULT_PAGE_SIZE,
            MAX_PAGE_SIZE,
        )
    }
}
