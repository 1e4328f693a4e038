//! Paginated list shape

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// One page of a list endpoint, as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// Builds a page, deriving the navigation fields
    pub fn new(items: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        let total_pages = if total == 0 || page_size == 0 {
            0
        } else {
            total.div_ceil(u64::from(page_size)) as u32
        };

        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    /// Wraps an unpaginated list as a single page
    pub fn single(items: Vec<T>) -> Self {
        let len = items.len();
        Self::new(items, len as u64, 1, len.max(1) as u32)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Paged(Page<T>),
    Plain(Vec<T>),
}

impl<T> Page<T>
where
    T: serde::de::DeserializeOwned,
{
    /// Decodes a list response; some endpoints answer with a bare array
    pub fn from_response(value: serde_json::Value) -> Result<Self, DomainError> {
        match serde_json::from_value(value) {
            Ok(ListResponse::Paged(page)) => Ok(page),
            Ok(ListResponse::Plain(items)) => Ok(Self::single(items)),
            Err(e) => Err(DomainError::decode(format!("Unexpected list response: {}", e))),
        }
    }
}
