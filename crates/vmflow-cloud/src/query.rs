//! Discovery filters and bounded listings

use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP: usize = 50;
pub const MAX_TOP: usize = 500;

/// Filters applied to a discovery listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// Case-insensitive substring of the item name
    pub search: Option<String>,
    pub min_cores: Option<u32>,
    pub max_cores: Option<u32>,
    pub min_memory_mb: Option<u64>,
    pub max_memory_mb: Option<u64>,
    /// Maximum items returned (default 50, at most 500)
    pub top: Option<usize>,
}

impl ListQuery {
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    /// Effective result bound
    pub fn limit(&self) -> usize {
        self.top.unwrap_or(DEFAULT_TOP).clamp(1, MAX_TOP)
    }

    fn has_capacity_filter(&self) -> bool {
        self.min_cores.is_some()
            || self.max_cores.is_some()
            || self.min_memory_mb.is_some()
            || self.max_memory_mb.is_some()
    }

    pub fn matches<T: Listable>(&self, item: &T) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_ascii_lowercase();
            if !item.name().to_ascii_lowercase().contains(&needle) {
                return false;
            }
        }
        if !self.has_capacity_filter() {
            return true;
        }

        // items without capacity data never satisfy a capacity filter
        let cores_ok = match item.cores() {
            Some(cores) => {
                self.min_cores.is_none_or(|min| cores >= min)
                    && self.max_cores.is_none_or(|max| cores <= max)
            }
            None => self.min_cores.is_none() && self.max_cores.is_none(),
        };
        let memory_ok = match item.memory_mb() {
            Some(memory) => {
                self.min_memory_mb.is_none_or(|min| memory >= min)
                    && self.max_memory_mb.is_none_or(|max| memory <= max)
            }
            None => self.min_memory_mb.is_none() && self.max_memory_mb.is_none(),
        };
        cores_ok && memory_ok
    }
}

/// Item that can be filtered and ordered in a [`Listing`]
pub trait Listable {
    fn name(&self) -> &str;

    fn cores(&self) -> Option<u32> {
        None
    }

    fn memory_mb(&self) -> Option<u64> {
        None
    }
}

impl Listable for String {
    fn name(&self) -> &str {
        self
    }
}

/// Filtered, sorted and truncated result set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    /// Items matching the filters before truncation
    pub total_matched: usize,
    pub returned: usize,
    pub has_more: bool,
}

impl<T: Listable> Listing<T> {
    /// Filter `items` by `query`, sort by name and keep the first `top`
    pub fn select(items: impl IntoIterator<Item = T>, query: &ListQuery) -> Self {
        let mut matched: Vec<T> = items.into_iter().filter(|i| query.matches(i)).collect();
        matched.sort_by(|a, b| a.name().cmp(b.name()));

        let total_matched = matched.len();
        matched.truncate(query.limit());
        let returned = matched.len();

        Self {
            items: matched,
            total_matched,
            returned,
            has_more: total_matched > returned,
        }
    }
}
