//! Client-side query cache.
//!
//! This module provides a read-through cache that:
//! - Stores one typed result per structural [`QueryKey`]
//! - De-duplicates concurrent fetches of the same key
//! - Serves stale data while refetching, and keeps it when a refetch fails
//! - Tags fetches with generations so late responses never overwrite newer state

mod data;
mod key;
mod state;
mod store;

pub use data::{Page, QueryData};
pub use key::{QueryKey, SearchText, TaskFilter, MIN_SEARCH_LEN};
pub use state::{QuerySnapshot, QueryStatus};
pub use store::{EntryUpdate, FetchResult, PendingFetch, QueryCache};
