pub mod continuation;
pub mod data;
pub mod go_away;
pub mod headers;
pub mod ping;
pub mod priority;
pub mod push_promise;
pub mod rst_stream;
pub mod settings;
pub mod window_update;
#[cfg(test)]
mod tests;

pub use continuation::Continuation;
pub use data::Data;
pub use go_away::GoAway;
pub use headers::Headers;
pub use ping::Ping;
pub use priority::Priority;
pub use push_promise::PushPromise;
pub use rst_stream::RstStream;
pub use settings::{Setting, Settings};
pub use window_update::WindowUpdate;

use crate::http::{Error, Result, Success};
use std::fmt::{Debug, Display, Formatter};

pub const HEADER_LEN: usize = 9;
pub const MAX_STREAM_ID: u32 = 0x7fff_ffff;
pub const MAX_PADDING: usize = u8::MAX as usize;

pub const END_STREAM: u8 = 0x1;
pub const ACK: u8 = 0x1;
pub const END_HEADERS: u8 = 0x4;
pub const PADDED: u8 = 0x8;
pub const PRIORITY: u8 = 0x20;
/// High bit of any 32-bit stream identifier field.
pub const RESERVED: u8 = 0x80;

pub(crate) const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

impl TryFrom<u8> for FrameKind {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        let result = match value {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => return Err(other),
        };
        Ok(result)
    }
}

impl Display for FrameKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Data => "DATA",
            Self::Headers => "HEADERS",
            Self::Priority => "PRIORITY",
            Self::RstStream => "RST_STREAM",
            Self::Settings => "SETTINGS",
            Self::PushPromise => "PUSH_PROMISE",
            Self::Ping => "PING",
            Self::GoAway => "GOAWAY",
            Self::WindowUpdate => "WINDOW_UPDATE",
            Self::Continuation => "CONTINUATION",
        };
        write!(f, "{kind}")
    }
}

impl FrameKind {
    /// Flags defined for this frame type, with their names.
    fn flag_names(self) -> &'static [(u8, &'static str)] {
        match self {
            Self::Data => &[(END_STREAM, "END_STREAM"), (PADDED, "PADDED")],
            Self::Headers => &[
                (END_STREAM, "END_STREAM"),
                (END_HEADERS, "END_HEADERS"),
                (PADDED, "PADDED"),
                (PRIORITY, "PRIORITY"),
            ],
            Self::PushPromise => &[(END_HEADERS, "END_HEADERS"), (PADDED, "PADDED")],
            Self::Continuation => &[(END_HEADERS, "END_HEADERS")],
            Self::Settings | Self::Ping => &[(ACK, "ACK")],
            _ => &[],
        }
    }
}

/// Error codes carried by RST_STREAM and GOAWAY (RFC 9113 §7).
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    pub fn to_be_bytes(self) -> [u8; 4] {
        (self as u32).to_be_bytes()
    }
}

/// Unknown codes are treated as INTERNAL_ERROR.
impl From<u32> for ErrorCode {
    fn from(value: u32) -> Self {
        match value {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            _ => Self::InternalError,
        }
    }
}

impl From<[u8; 4]> for ErrorCode {
    fn from(bytes: [u8; 4]) -> Self {
        Self::from(u32::from_be_bytes(bytes))
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NoError => "NO_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::FlowControlError => "FLOW_CONTROL_ERROR",
            Self::SettingsTimeout => "SETTINGS_TIMEOUT",
            Self::StreamClosed => "STREAM_CLOSED",
            Self::FrameSizeError => "FRAME_SIZE_ERROR",
            Self::RefusedStream => "REFUSED_STREAM",
            Self::Cancel => "CANCEL",
            Self::CompressionError => "COMPRESSION_ERROR",
            Self::ConnectError => "CONNECT_ERROR",
            Self::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            Self::InadequateSecurity => "INADEQUATE_SECURITY",
            Self::Http11Required => "HTTP_1_1_REQUIRED",
        };
        write!(f, "{name}")
    }
}

pub trait FramePayload: Sized + Into<Payload> {
    const KIND: FrameKind;

    fn parse(bytes: &[u8], flags: u8) -> Result<Self>;
    fn encode(self) -> Vec<u8>;

    /// Adjusts caller-supplied flags so they agree with the payload shape.
    fn flags(&self, flags: u8) -> u8 {
        flags
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Data(Data),
    Headers(Headers),
    Priority(Priority),
    RstStream(RstStream),
    Settings(Settings),
    PushPromise(PushPromise),
    Ping(Ping),
    GoAway(GoAway),
    WindowUpdate(WindowUpdate),
    Continuation(Continuation),
}

impl Payload {
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Data(_) => FrameKind::Data,
            Self::Headers(_) => FrameKind::Headers,
            Self::Priority(_) => FrameKind::Priority,
            Self::RstStream(_) => FrameKind::RstStream,
            Self::Settings(_) => FrameKind::Settings,
            Self::PushPromise(_) => FrameKind::PushPromise,
            Self::Ping(_) => FrameKind::Ping,
            Self::GoAway(_) => FrameKind::GoAway,
            Self::WindowUpdate(_) => FrameKind::WindowUpdate,
            Self::Continuation(_) => FrameKind::Continuation,
        }
    }

    fn parse(kind: FrameKind, bytes: &[u8], flags: u8) -> Result<Self> {
        let payload = match kind {
            FrameKind::Data => Data::parse(bytes, flags)?.into(),
            FrameKind::Headers => Headers::parse(bytes, flags)?.into(),
            FrameKind::Priority => Priority::parse(bytes, flags)?.into(),
            FrameKind::RstStream => RstStream::parse(bytes, flags)?.into(),
            FrameKind::Settings => Settings::parse(bytes, flags)?.into(),
            FrameKind::PushPromise => PushPromise::parse(bytes, flags)?.into(),
            FrameKind::Ping => Ping::parse(bytes, flags)?.into(),
            FrameKind::GoAway => GoAway::parse(bytes, flags)?.into(),
            FrameKind::WindowUpdate => WindowUpdate::parse(bytes, flags)?.into(),
            FrameKind::Continuation => Continuation::parse(bytes, flags)?.into(),
        };

        Ok(payload)
    }

    fn encode(self, flags: u8) -> (u8, Vec<u8>) {
        fn finish<P: FramePayload>(payload: P, flags: u8) -> (u8, Vec<u8>) {
            let flags = payload.flags(flags);
            (flags, payload.encode())
        }
        match self {
            Self::Data(p) => finish(p, flags),
            Self::Headers(p) => finish(p, flags),
            Self::Priority(p) => finish(p, flags),
            Self::RstStream(p) => finish(p, flags),
            Self::Settings(p) => finish(p, flags),
            Self::PushPromise(p) => finish(p, flags),
            Self::Ping(p) => finish(p, flags),
            Self::GoAway(p) => finish(p, flags),
            Self::WindowUpdate(p) => finish(p, flags),
            Self::Continuation(p) => finish(p, flags),
        }
    }
}

macro_rules! payload_from {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Payload {
                fn from(payload: $variant) -> Self {
                    Self::$variant(payload)
                }
            }
        )*
    };
}

payload_from!(
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation
);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Payload,
}

impl Frame {
    pub fn new<P: FramePayload>(stream_identifier: u32, flags: u8, payload: P) -> Self {
        let flags = payload.flags(flags);
        Self {
            header: FrameHeader::new(P::KIND, flags, stream_identifier),
            payload: payload.into(),
        }
    }

    /// Serializes the frame. The header length always matches the payload
    /// and the reserved bit of the stream id is cleared.
    pub fn encode(self) -> Vec<u8> {
        let (flags, payload) = self.payload.encode(self.header.flags);
        let header = FrameHeader {
            length: payload.len() as u32,
            kind: self.header.kind,
            flags,
            stream_identifier: self.header.stream_identifier & MAX_STREAM_ID,
        };
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend(header.to_bytes());
        bytes.extend(payload);

        bytes
    }

    /// Parses a payload whose header has already been read. Layout checks that
    /// depend only on the header happen before the payload is touched.
    pub fn parse(header: FrameHeader, bytes: &[u8]) -> Result<Self> {
        header.validate()?;
        let payload = Payload::parse(header.kind, bytes, header.flags)?;

        Ok(Self { header, payload })
    }

    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }

    pub fn id(&self) -> u32 {
        self.header.stream_identifier
    }

    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    pub fn is_stream_end(&self) -> bool {
        matches!(self.kind(), FrameKind::Data | FrameKind::Headers)
            && flag_is_present(END_STREAM, self.header.flags)
    }

    pub fn is_end_headers(&self) -> bool {
        matches!(
            self.kind(),
            FrameKind::Headers | FrameKind::PushPromise | FrameKind::Continuation
        ) && flag_is_present(END_HEADERS, self.header.flags)
    }

    pub fn is_ack(&self) -> bool {
        matches!(self.kind(), FrameKind::Settings | FrameKind::Ping)
            && flag_is_present(ACK, self.header.flags)
    }

    pub fn settings(items: Vec<Setting>) -> Self {
        Self::new(0, 0, Settings { items })
    }

    pub fn settings_ack() -> Self {
        Self::new(0, ACK, Settings::default())
    }

    pub fn ping(opaque_data: [u8; 8], ack: bool) -> Self {
        let flags = if ack { ACK } else { 0 };
        Self::new(0, flags, Ping { opaque_data })
    }

    pub fn window_update(stream_identifier: u32, window_size_increment: u32) -> Self {
        Self::new(
            stream_identifier,
            0,
            WindowUpdate {
                window_size_increment,
            },
        )
    }

    pub fn rst_stream(stream_identifier: u32, error_code: ErrorCode) -> Self {
        Self::new(stream_identifier, 0, RstStream { error_code })
    }

    pub fn go_away(last_stream_id: u32, error_code: ErrorCode, debug: &str) -> Self {
        Self::new(
            0,
            0,
            GoAway {
                last_stream_id,
                error_code,
                additional_debug_data: debug.as_bytes().to_vec(),
            },
        )
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.header)
    }
}

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq)]
pub struct FrameHeader {
    pub length: u32,
    pub kind: FrameKind,
    pub flags: u8,
    pub stream_identifier: u32,
}

impl Display for FrameHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let flags = self
            .kind
            .flag_names()
            .iter()
            .filter(|(flag, _)| flag_is_present(*flag, self.flags))
            .map(|(_, name)| *name)
            .collect::<Vec<&str>>()
            .join("|");
        write!(
            f,
            "FrameHeader {{ length: {}, kind: {}, flags: {}, stream_identifier: {} }}",
            self.length, self.kind, flags, self.stream_identifier
        )
    }
}

impl FrameHeader {
    pub fn new(kind: FrameKind, flags: u8, stream_identifier: u32) -> Self {
        Self {
            length: 0,
            kind,
            flags,
            stream_identifier,
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let length = self.length.to_be_bytes();
        let id = (self.stream_identifier & MAX_STREAM_ID).to_be_bytes();

        [
            length[1],
            length[2],
            length[3],
            self.kind as u8,
            self.flags,
            id[0],
            id[1],
            id[2],
            id[3],
        ]
    }

    /// Splits a raw header into its fields; the type byte is returned as is
    /// so the caller can skip unknown frame types.
    pub fn split(bytes: &[u8; HEADER_LEN]) -> (u32, u8, u8, u32) {
        (
            u32::from_be_bytes([0x00, bytes[0], bytes[1], bytes[2]]),
            bytes[3],
            bytes[4],
            u32::from_be_bytes([bytes[5] & !RESERVED, bytes[6], bytes[7], bytes[8]]),
        )
    }

    /// Stream id class and fixed-size payload checks.
    pub fn validate(&self) -> Success {
        let on_connection = self.stream_identifier == 0;
        let id_error = match self.kind {
            FrameKind::Data
            | FrameKind::Headers
            | FrameKind::Priority
            | FrameKind::RstStream
            | FrameKind::PushPromise
            | FrameKind::Continuation => on_connection,
            FrameKind::Settings | FrameKind::Ping | FrameKind::GoAway => !on_connection,
            FrameKind::WindowUpdate => false,
        };
        if id_error {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                &format!(
                    "{} frame on invalid stream {}",
                    self.kind, self.stream_identifier
                ),
            ));
        }
        let length = self.length as usize;
        let size_error = match self.kind {
            FrameKind::Ping => length != 8,
            FrameKind::Priority => length != 5,
            FrameKind::RstStream | FrameKind::WindowUpdate => length != 4,
            FrameKind::Settings if flag_is_present(ACK, self.flags) => length != 0,
            FrameKind::Settings => length % 6 != 0,
            FrameKind::GoAway => length < 8,
            _ => false,
        };
        if size_error {
            return Err(Error::frame_size(&format!(
                "{} frame with invalid length {length}",
                self.kind
            )));
        }

        Ok(())
    }
}

impl TryFrom<&[u8; HEADER_LEN]> for FrameHeader {
    type Error = Error;

    fn try_from(bytes: &[u8; HEADER_LEN]) -> std::result::Result<Self, Self::Error> {
        let (length, kind, flags, stream_identifier) = Self::split(bytes);
        let kind = FrameKind::try_from(kind).map_err(|k| {
            Error::protocol(ErrorCode::ProtocolError, &format!("unknown frame type {k}"))
        })?;

        Ok(Self {
            length,
            kind,
            flags,
            stream_identifier,
        })
    }
}

fn flag_is_present(flag: u8, delivered: u8) -> bool {
    delivered & flag != 0x00
}

/// Writes the pad-length byte when padding is present and returns the padding,
/// cut to the 255 bytes the pad-length byte can describe.
fn encode_padding(bytes: &mut Vec<u8>, padding: Option<Vec<u8>>) -> Vec<u8> {
    match padding {
        Some(mut padding) => {
            padding.truncate(MAX_PADDING);
            bytes.push(padding.len() as u8);
            padding
        }
        None => Vec::new(),
    }
}

/// Pad length as it will appear on the wire.
fn pad_length(padding: &Option<Vec<u8>>) -> Option<u8> {
    padding.as_ref().map(|p| p.len().min(MAX_PADDING) as u8)
}

/// Removes the pad-length byte and trailing padding of a PADDED frame.
fn split_padding(bytes: &[u8], flags: u8) -> Result<(&[u8], Option<Vec<u8>>)> {
    if !flag_is_present(PADDED, flags) {
        return Ok((bytes, None));
    }
    let (pad_length, rest) = bytes
        .split_first()
        .ok_or_else(|| Error::frame_size("padded frame without pad length"))?;
    let pad_length = *pad_length as usize;
    if pad_length > rest.len() {
        return Err(Error::protocol(
            ErrorCode::ProtocolError,
            "padding exceeds frame payload",
        ));
    }
    let (body, padding) = rest.split_at(rest.len() - pad_length);

    Ok((body, Some(padding.to_vec())))
}

fn read_stream_id(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes) & MAX_STREAM_ID
}

fn take_array<const N: usize>(bytes: &[u8], kind: FrameKind) -> Result<([u8; N], &[u8])> {
    if bytes.len() < N {
        return Err(Error::frame_size(&format!("truncated {kind} frame")));
    }
    let (head, rest) = bytes.split_at(N);
    let mut array = [0u8; N];
    array.copy_from_slice(head);

    Ok((array, rest))
}
