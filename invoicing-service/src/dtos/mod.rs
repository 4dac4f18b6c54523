//! Query-string DTOs for the list endpoints.
//!
//! Page fields are repeated per struct: `serde(flatten)` breaks numeric
//! parsing of url-encoded queries.

use crate::models::{ListClientsFilter, ListInvoicesFilter, PageRequest};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn into_request(self, default_per_page: u32) -> PageRequest {
        PageRequest::new(self.page, self.per_page, default_per_page)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListClientsQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListClientsQuery {
    pub fn into_filter(self, default_per_page: u32) -> ListClientsFilter {
        ListClientsFilter {
            search: self
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            page: PageRequest::new(self.page, self.per_page, default_per_page),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesQuery {
    pub client_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListInvoicesQuery {
    pub fn into_filter(self, default_per_page: u32) -> ListInvoicesFilter {
        ListInvoicesFilter {
            client_id: self.client_id,
            page: PageRequest::new(self.page, self.per_page, default_per_page),
        }
    }
}
