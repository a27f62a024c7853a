use crate::http::http2::{Config, Http2Conn};
use crate::http::transport;
use crate::http::{request::Request, Response, Result};
use tracing::debug;

/// Sends requests over one multiplexed connection, reconnecting when the
/// authority changes or the connection has died.
pub struct Client {
    config: Config,
    connection: Option<(String, Http2Conn)>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self::with_config(Config::client())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn execute(&mut self, request: Request) -> Result<Response> {
        let authority = request.url.authority();
        let reusable = matches!(
            &self.connection,
            Some((current, connection)) if *current == authority && connection.is_active()
        );
        if !reusable {
            if let Some((previous, mut connection)) = self.connection.take() {
                debug!(authority = previous, "replacing connection");
                let _ = connection.close();
                connection.join_threads();
            }
            let connection = self.connect(&request)?;
            self.connection = Some((authority.clone(), connection));
        }
        let timeout = self.config.request_timeout;
        match &self.connection {
            Some((_, connection)) => connection.request(request, timeout),
            None => Err(crate::http::Error::closed()),
        }
    }

    fn connect(&self, request: &Request) -> Result<Http2Conn> {
        let authority = request.url.authority();
        if request.url.secure {
            #[cfg(feature = "tls")]
            {
                let transport = transport::connect_tls(&authority, &request.url.host)?;
                return Http2Conn::client(transport, self.config.clone());
            }
            #[cfg(not(feature = "tls"))]
            return Err(crate::http::Error::user(
                "https requires the tls feature",
            ));
        }
        let transport = transport::connect_tcp(&authority)?;

        Http2Conn::client(transport, self.config.clone())
    }
}
