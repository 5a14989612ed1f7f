//! Backend-facing types: entities, payloads, the response envelope and the
//! gateway that moves them over the wire.

pub mod api_types;
pub mod client;
pub mod gateway;
pub mod payloads;
pub mod session;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use api_types::{ApiErrorItem, ApiResponse};
pub use client::HttpGateway;
pub use gateway::{ApiRequest, Entity, FetchGateway, Method, Routes};
pub use session::Session;
