//! Transport adapters for netctx propagation.
//!
//! - [`HarvestLayer`]: server middleware for axum and tonic. Rebuilds the
//!   [`RequestContext`](netctx_core::RequestContext) from incoming headers, stores it in the
//!   request extensions and keeps its deadline scope alive until the response is produced.
//! - [`PropagateLayer`]: client middleware. Writes the context found in the request extensions
//!   into outgoing headers and races the call against the context's deadline.
//! - [`http`] / [`grpc`]: helpers for each transport, behind features of the same name.
mod error;
pub use error::{ApiError, CallError};

mod headers;
pub use headers::{HeaderExtractor, HeaderInjector};

mod layer;
pub use layer::{HarvestLayer, HarvestService, PropagateLayer, PropagateService};

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "grpc")]
pub mod grpc;
