pub mod health;
pub mod inventory;
pub mod items;
pub mod orders;

use serde::Deserialize;
use utoipa::IntoParams;

/// Pagination query parameters shared by all list endpoints. Pages are
/// 1-based; out-of-range pages return empty data, not errors.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl ListParams {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self, default: u64) -> u64 {
        self.per_page.unwrap_or(default).clamp(1, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_clamp_to_sane_ranges() {
        let params = ListParams {
            page: Some(0),
            per_page: Some(10_000),
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.per_page(20), 100);

        let defaults = ListParams {
            page: None,
            per_page: None,
        };
        assert_eq!(defaults.page(), 1);
        assert_eq!(defaults.per_page(20), 20);
    }
}
