use crate::http::utf8::{AMPERSAND, COLON, EQUALS, QMARK, SLASH};
use crate::http::{Error, Result};
use std::fmt::{Display, Formatter};

pub const HTTPS: &str = "https://";
pub const HTTP: &str = "http://";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Url {
    pub secure: bool,
    pub host: String,
    pub port: Option<u16>,
    pub resource: String,
    pub query: String,
}

impl Display for Url {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme(), self.host_header(), self.path())
    }
}

impl Url {
    /// A url made of the `:scheme`, `:authority` and `:path` of a received request.
    pub fn from_parts(scheme: &str, authority: &str, path: &str) -> Self {
        let (host, port) = split_port(authority);
        let (resource, query) = match path.split_once(QMARK as char) {
            Some((resource, query)) => (resource.to_string(), query.to_string()),
            None => (path.to_string(), String::new()),
        };

        Self {
            secure: scheme != "http",
            host: host.to_string(),
            port,
            resource,
            query,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self.secure {
            true => "https",
            false => "http",
        }
    }

    /// Address to connect to, with the scheme's default port filled in.
    pub fn authority(&self) -> String {
        let port = self.port.unwrap_or(match self.secure {
            true => 443,
            false => 80,
        });
        format!("{}:{port}", self.host)
    }

    /// Value for `:authority`; the port only appears when it was given.
    pub fn host_header(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }

    /// Value for `:path`.
    pub fn path(&self) -> String {
        let resource = match self.resource.is_empty() {
            true => "/",
            false => &self.resource,
        };
        match self.query.is_empty() {
            true => resource.to_string(),
            false => format!("{resource}?{}", self.query),
        }
    }

    pub fn extend_query<T: AsRef<str>>(&mut self, query: &[(T, T)]) {
        for (key, value) in query {
            if !self.query.is_empty() {
                self.query.push(AMPERSAND as char);
            }
            self.query.push_str(key.as_ref());
            self.query.push(EQUALS as char);
            self.query.push_str(value.as_ref());
        }
    }
}

fn split_port(authority: &str) -> (&str, Option<u16>) {
    match authority.rsplit_once(COLON as char) {
        Some((host, port)) if !port.contains(']') => {
            match port.parse::<u16>() {
                Ok(port) => (host, Some(port)),
                Err(_) => (authority, None),
            }
        }
        _ => (authority, None),
    }
}

impl TryFrom<&str> for Url {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        let (secure, rest) = match value {
            v if v.starts_with(HTTPS) => (true, &v[HTTPS.len()..]),
            v if v.starts_with(HTTP) => (false, &v[HTTP.len()..]),
            v => (true, v),
        };
        let end = rest
            .find(|c| c == SLASH as char || c == QMARK as char)
            .unwrap_or(rest.len());
        let (authority, path) = rest.split_at(end);
        if authority.is_empty() {
            return Err(Error::user(&format!("missing host in url {value}")));
        }
        let (host, port) = split_port(authority);
        if authority.contains(COLON as char) && port.is_none() && !authority.starts_with('[') {
            return Err(Error::user(&format!("invalid port in url {value}")));
        }
        let (resource, query) = match path.split_once(QMARK as char) {
            Some((resource, query)) => (resource.to_string(), query.to_string()),
            None => (path.to_string(), String::new()),
        };

        Ok(Self {
            secure,
            host: host.to_string(),
            port,
            resource,
            query,
        })
    }
}
