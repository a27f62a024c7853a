//! An HTTP/2 protocol engine: frame codec, HPACK header compression and a
//! multiplexed connection with flow control, usable as client or server.

pub mod http;

pub type HttpClient = http::client::Client;
pub use http::http2::{Config, ConfigBuilder, Http2Conn};
pub use http::{Error, Method, Request, Response, Result};
