//! Wire-level HTTP plumbing for kairo.
//!
//! The core crate talks to the network exclusively through the [`Transport`]
//! trait defined here. A [`ReqwestTransport`] implementation is provided for
//! production use; tests drive the core with [`MockTransport`].

pub mod http;
pub mod transport;

pub use http::ReqwestTransport;
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, MockTransport, Transport, TransportError,
};
