use crate::http::http2::settings::*;
use crate::http::{Error, Result};
use std::time::Duration;

pub const CLIENT_INITIAL_WINDOW_SIZE: u32 = 4_194_304;
pub const CLIENT_MAX_HEADER_LIST_SIZE: u32 = 10_485_760;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Settings advertised to the peer during the handshake.
    pub settings: StreamSettings,
    /// Connection-level receive window announced right after the preface.
    pub connection_window: u32,
    pub request_timeout: Duration,
    /// Escalate HPACK decode failures to a connection error.
    pub strict_hpack: bool,
    /// Run server handlers on their own thread.
    pub handler_threads: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: StreamSettings::default(),
            connection_window: MAX_WINDOW_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            strict_hpack: false,
            handler_threads: true,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Defaults used by the client: a large stream window and header list.
    pub fn client() -> Self {
        Self {
            settings: StreamSettings {
                initial_window_size: CLIENT_INITIAL_WINDOW_SIZE,
                max_header_list_size: CLIENT_MAX_HEADER_LIST_SIZE,
                ..StreamSettings::default()
            },
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    pub(crate) config: Config,
}

impl From<Config> for ConfigBuilder {
    fn from(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(mut self, settings: StreamSettings) -> Self {
        self.config.settings = settings;
        self
    }

    pub fn header_table_size(mut self, size: u32) -> Self {
        self.config.settings.header_table_size = size;
        self
    }

    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.config.settings.max_concurrent_streams = Some(max);
        self
    }

    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.config.settings.initial_window_size = size;
        self
    }

    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.settings.max_frame_size = size;
        self
    }

    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.config.settings.max_header_list_size = size;
        self
    }

    pub fn connection_window(mut self, size: u32) -> Self {
        self.config.connection_window = size;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn strict_hpack(mut self, strict: bool) -> Self {
        self.config.strict_hpack = strict;
        self
    }

    pub fn handler_threads(mut self, threads: bool) -> Self {
        self.config.handler_threads = threads;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config
            .settings
            .validate()
            .map_err(|e| Error::user(&format!("invalid configuration: {}", e.message())))?;
        if self.config.settings.enable_push {
            return Err(Error::user("server push is not supported"));
        }
        if !(DEFAULT_INITIAL_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&self.config.connection_window)
        {
            return Err(Error::user(
                "connection window must be between 65535 and 2^31-1",
            ));
        }

        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::ErrorKind;

    #[test]
    fn builder_sets_values() {
        let config = Config::builder()
            .initial_window_size(1 << 20)
            .max_frame_size(32_768)
            .max_concurrent_streams(8)
            .request_timeout(Duration::from_millis(250))
            .strict_hpack(true)
            .build()
            .unwrap();
        assert_eq!(config.settings.initial_window_size, 1 << 20);
        assert_eq!(config.settings.max_frame_size, 32_768);
        assert_eq!(config.settings.max_concurrent_streams, Some(8));
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert!(config.strict_hpack);
        assert!(config.handler_threads);
        assert_eq!(config.connection_window, MAX_WINDOW_SIZE);
    }

    #[test]
    fn builder_rejects_out_of_range_settings() {
        let err = Config::builder().max_frame_size(1024).build().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::User));
        let err = Config::builder()
            .initial_window_size(1 << 31)
            .build()
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::User));
        assert!(Config::builder().connection_window(100).build().is_err());
    }

    #[test]
    fn client_defaults() {
        let config = Config::client();
        assert_eq!(config.settings.initial_window_size, 4_194_304);
        assert_eq!(config.settings.max_header_list_size, 10_485_760);
        assert!(!config.settings.enable_push);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_round_trip() {
        let config = Config::client();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);

        let partial: Config = serde_json::from_str(r#"{"strict_hpack": true}"#).unwrap();
        assert!(partial.strict_hpack);
        assert_eq!(partial.settings, StreamSettings::default());
    }
}
