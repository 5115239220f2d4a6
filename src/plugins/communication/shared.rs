use serde::{Serialize, Deserialize};

use crate::plugins::communication::stories::service::PageRequest;

#[derive(Serialize, Deserialize, Debug)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
    pub has_more: bool,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>, window: PageRequest, total: i64) -> Self {
        let page_size = window.limit.max(1);
        let fetched = items.len() as i64;
        let has_more = i64::try_from(window.offset).map_or(false, |offset| offset.saturating_add(fetched) < total);
        let total_pages = if total == 0 { 0 } else { (total + i64::from(page_size) - 1) / i64::from(page_size) };
        ListResponse { items, page: window.page(), page_size, total, total_pages, has_more }
    }
}
