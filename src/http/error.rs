use crate::http::http2::ErrorCode;
use std::any::Any;
use std::fmt::{Display, Formatter};
use std::string::FromUtf8Error;

#[derive(Debug)]
pub struct Error {
    pub(crate) kind: ErrorKind,
    pub(crate) message: String,
}

impl Error {
    pub fn new(message: &str, kind: ErrorKind) -> Self {
        Self {
            message: message.to_string(),
            kind,
        }
    }

    pub fn user(message: &str) -> Self {
        Self::new(message, ErrorKind::User)
    }

    pub fn connection(message: &str, payload: Option<Box<dyn Any + Send>>) -> Self {
        Self::new(message, ErrorKind::Connection(payload))
    }

    pub fn closed() -> Self {
        Self::connection("connection closed", None)
    }

    pub fn protocol(code: ErrorCode, message: &str) -> Self {
        Self::new(message, ErrorKind::Protocol(code))
    }

    pub fn frame_size(message: &str) -> Self {
        Self::protocol(ErrorCode::FrameSizeError, message)
    }

    pub fn stream(code: ErrorCode, message: &str) -> Self {
        Self::new(message, ErrorKind::Stream(code))
    }

    pub fn compression(message: &str) -> Self {
        Self::new(message, ErrorKind::Compression)
    }

    pub fn timeout(message: &str) -> Self {
        Self::new(message, ErrorKind::Timeout)
    }

    pub fn thread(message: &str, payload: Option<Box<dyn Any + Send>>) -> Self {
        Self::new(message, ErrorKind::Thread(payload))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP/2 error code carried by protocol, stream and compression errors.
    pub fn code(&self) -> Option<ErrorCode> {
        match &self.kind {
            ErrorKind::Protocol(code) | ErrorKind::Stream(code) => Some(*code),
            ErrorKind::Compression => Some(ErrorCode::CompressionError),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Connection(_))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error: {}\nKind: {:?}", self.message, self.kind)
    }
}

impl std::error::Error for Error {}

#[derive(Debug)]
pub enum ErrorKind {
    Thread(Option<Box<dyn Any + Send>>),
    User,
    Connection(Option<Box<dyn Any + Send>>),
    Protocol(ErrorCode),
    Stream(ErrorCode),
    Compression,
    Timeout,
}

pub trait SomeError {
    fn some_box(self) -> Option<Box<dyn Any + Send>>;
}

impl<T: 'static + Sized + Send> SomeError for T {
    fn some_box(self) -> Option<Box<dyn Any + Send>> {
        Some(Box::new(self))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::connection(&e.to_string(), e.some_box())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_: FromUtf8Error) -> Self {
        Self::compression("header field contained invalid utf-8")
    }
}
