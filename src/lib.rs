//! Project, task and time-tracking client core.
//!
//! Reads go through a keyed, de-duplicating [`cache::QueryCache`]. Writes go
//! through [`mutation::MutationCoordinator`], whose server-confirmed results
//! are reconciled into every cached view of the Day -> Event -> Log tree.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod mutation;
pub mod reconcile;
pub mod views;

pub use client::Tallybook;
pub use error::PmError;
