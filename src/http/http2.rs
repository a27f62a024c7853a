pub mod codec;
pub mod config;
pub mod conn;
pub(crate) mod dispatch;
pub mod flow;
pub mod frames;
pub mod hpack;
pub mod message;
pub mod settings;
pub mod stream;
pub(crate) mod writer;

pub use config::{Config, ConfigBuilder};
pub use conn::{ConnectionStatus, Handler, Http2Conn, Role, StreamHandle};
pub use frames::*;
pub use settings::StreamSettings;
pub use stream::{State, StreamEvent};
