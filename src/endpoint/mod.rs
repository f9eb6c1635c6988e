//! Endpoint resolution and rotation.
//!
//! Connection strings, structured option objects, and lists of either are
//! resolved into an [`EndpointSet`]; an [`EndpointSelector`] then hands out
//! one endpoint per physical connection, round-robin.

mod config;
mod conn_string;
mod selector;
mod spec;

pub use config::{Credentials, EndpointConfig, EndpointSet};
pub use conn_string::{SUPPORTED_SCHEMES, parse_db_url, redact_url};
pub use selector::EndpointSelector;
pub use spec::{EndpointOptions, EndpointSpec, UrlList, resolve_endpoints};
