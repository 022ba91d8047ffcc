//! Map layer providers.
//!
//! This module covers how a layer's pixels are requested: the HTTP client
//! abstraction used by the fetch workers and the URL builders for the two
//! supported layer kinds (WMS GetMap requests and XYZ tile templates).
//!
//! The [`AsyncHttpClient`] trait allows dependency injection: production
//! code uses [`ReqwestClient`], tests use [`MockHttpClient`].

mod http;
mod wms;
mod xyz;

pub use http::{AsyncHttpClient, MockHttpClient, ReqwestClient};
pub use wms::WmsSource;
pub use xyz::XyzTemplate;

use thiserror::Error;

/// Errors from fetching layer resources.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The HTTP request failed (connection, timeout, protocol).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with a non-success status code.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The URL template could not be expanded.
    #[error("bad URL template: {0}")]
    BadTemplate(String),
}
