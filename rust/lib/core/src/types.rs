use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// Parameters for paginated reads. `page` is 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: usize,

    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    25
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PageParams {
    /// Build validated params. Page 0 is treated as page 1; an empty page
    /// size is rejected, as is a page whose window end does not fit in an
    /// SQL integer.
    pub fn new(page: usize, per_page: usize) -> Result<Self, ServiceError> {
        if per_page == 0 {
            return Err(ServiceError::Validation("page size must be positive".into()));
        }
        let page = page.max(1);
        let end = page
            .checked_mul(per_page)
            .filter(|end| i64::try_from(*end).is_ok());
        if end.is_none() {
            return Err(ServiceError::Validation(format!("page {} is out of range", page)));
        }
        Ok(Self { page, per_page })
    }

    /// Number of rows to skip before this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// One window of an ordered result set.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    /// Total rows across all pages.
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub has_next: bool,
    pub has_prev: bool,
    pub next_page: Option<usize>,
    pub prev_page: Option<usize>,
}

impl<T: Serialize> Page<T> {
    /// Assemble a page from its rows and the total count of the result set.
    pub fn new(items: Vec<T>, params: PageParams, total: usize) -> Self {
        let has_next = total > params.page.saturating_mul(params.per_page);
        let has_prev = params.page > 1;
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
            has_next,
            has_prev,
            next_page: has_next.then(|| params.page + 1),
            prev_page: has_prev.then(|| params.page - 1),
        }
    }

    /// An empty first page.
    pub fn empty(params: PageParams) -> Self {
        Self::new(Vec::new(), params, 0)
    }

    pub fn map<U: Serialize>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            has_next: self.has_next,
            has_prev: self.has_prev,
            next_page: self.next_page,
            prev_page: self.prev_page,
        }
    }
}
