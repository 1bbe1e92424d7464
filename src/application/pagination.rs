//! Page-number pagination over lazily fetched, ordered sources.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::application::repos::RepoError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// An ordered sequence that can report its length and hand out windows of itself.
///
/// Implementations must be restartable: calling `fetch` twice with the same
/// window yields the same items as long as the underlying data is unchanged.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn total(&self) -> Result<u64, RepoError>;

    async fn fetch(&self, offset: u64, limit: u32) -> Result<Vec<T>, RepoError>;
}

/// A materialised snapshot is its own page source.
#[async_trait]
impl<T> PageSource<T> for Arc<[T]>
where
    T: Clone + Send + Sync,
{
    async fn total(&self) -> Result<u64, RepoError> {
        Ok(self.len() as u64)
    }

    async fn fetch(&self, offset: u64, limit: u32) -> Result<Vec<T>, RepoError> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.len());
        let end = start.saturating_add(limit as usize).min(self.len());
        Ok(self[start..end].to_vec())
    }
}

/// Raw page selector as it arrives in the `page` query parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageNumber(Option<String>);

impl PageNumber {
    pub fn new(raw: Option<String>) -> Self {
        Self(raw)
    }

    pub fn first() -> Self {
        Self(None)
    }

    /// Resolve against the number of available pages.
    ///
    /// Missing, non-numeric, zero and negative values select the first page;
    /// values past the end select the last page.
    pub fn resolve(&self, num_pages: u64) -> u64 {
        let requested = self
            .0
            .as_deref()
            .and_then(parse_page)
            .filter(|value| *value >= 1)
            .unwrap_or(1);
        requested.min(num_pages.max(1))
    }
}

/// A positive digit string too large for `u64` still means "past the end".
fn parse_page(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse::<u64>().unwrap_or(u64::MAX))
}

impl From<Option<&str>> for PageNumber {
    fn from(value: Option<&str>) -> Self {
        Self(value.map(str::to_string))
    }
}

/// One page of results plus navigation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total_count: u64,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn next_page_number(&self) -> Option<u64> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn previous_page_number(&self) -> Option<u64> {
        self.has_previous().then(|| self.number - 1)
    }

    /// 1-based index of the first item on this page, 0 for an empty page.
    pub fn start_index(&self) -> u64 {
        if self.total_count == 0 {
            0
        } else {
            (self.number - 1) * u64::from(self.page_size) + 1
        }
    }
}

/// Fixed-size page-number paginator.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    page_size: u32,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Paginator {
    /// A page size of zero is treated as one item per page.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn num_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.page_size)).max(1)
    }

    /// Serve the requested page, fetching only the items that belong to it.
    pub async fn paginate<T, S>(&self, source: &S, requested: &PageNumber) -> Result<Page<T>, RepoError>
    where
        S: PageSource<T> + ?Sized,
    {
        let total_count = source.total().await?;
        let num_pages = self.num_pages(total_count);
        let number = requested.resolve(num_pages);

        let items = if total_count == 0 {
            Vec::new()
        } else {
            let offset = (number - 1) * u64::from(self.page_size);
            source.fetch(offset, self.page_size).await?
        };

        Ok(Page {
            items,
            number,
            num_pages,
            total_count,
            page_size: self.page_size,
        })
    }
}
