use super::{Method, Result};
use crate::http::url::Url;
use crate::http::utf8::UTF8;
use std::fmt::{Display, Formatter};

/// A request in the protocol-neutral model. On the client it is built with
/// the method constructors; on the server it is assembled from a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Display for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Request {{\nmethod: {},\nurl: {},\nheaders: {:#?},\nbody: {}\n}}",
            self.method,
            self.url,
            self.headers,
            self.body.as_deref().unwrap_or_default().utf8_lossy()
        )
    }
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self> {
        Ok(Self {
            method,
            url: Url::try_from(url)?,
            headers: Vec::new(),
            body: None,
        })
    }
    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::GET, url)
    }
    pub fn head(url: &str) -> Result<Self> {
        Self::new(Method::HEAD, url)
    }
    pub fn post(url: &str) -> Result<Self> {
        Self::new(Method::POST, url)
    }
    pub fn put(url: &str) -> Result<Self> {
        Self::new(Method::PUT, url)
    }
    pub fn patch(url: &str) -> Result<Self> {
        Self::new(Method::PATCH, url)
    }
    pub fn delete(url: &str) -> Result<Self> {
        Self::new(Method::DELETE, url)
    }
    pub fn options(url: &str) -> Result<Self> {
        Self::new(Method::OPTIONS, url)
    }
    pub fn connect(url: &str) -> Result<Self> {
        Self::new(Method::CONNECT, url)
    }

    pub fn query<T: AsRef<str>>(mut self, query: &[(T, T)]) -> Self {
        self.url.extend_query(query);

        self
    }

    pub fn insert_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.insert_header(name, value);

        self
    }

    pub fn headers(mut self, headers: &[(&str, &str)]) -> Self {
        headers
            .iter()
            .for_each(|(name, value)| self.insert_header(name, value));

        self
    }

    pub fn body_mut(&mut self, body: &[u8]) {
        self.body = Some(body.to_vec());
    }

    pub fn body(mut self, body: &[u8]) -> Self {
        self.body_mut(body);

        self
    }

    /// First value of a header, compared case-insensitively.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub mod headers {
    pub const HOST: &str = "host";
    pub const AUTHORIZATION: &str = "authorization";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const USER_AGENT: &str = "user-agent";
    pub const ACCEPT: &str = "accept";
    pub const CONNECTION: &str = "connection";
    pub const KEEP_ALIVE: &str = "keep-alive";
    pub const PROXY_CONNECTION: &str = "proxy-connection";
    pub const TRANSFER_ENCODING: &str = "transfer-encoding";
    pub const UPGRADE: &str = "upgrade";
    pub const TE: &str = "te";
    pub const TRAILER: &str = "trailer";
    pub mod values {
        pub const ALL: &str = "*/*";
        pub const JSON: &str = "application/json";
        pub const TEXT_PLAIN: &str = "text/plain";
        pub const TRAILERS: &str = "trailers";
    }
}
