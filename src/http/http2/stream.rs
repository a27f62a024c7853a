use crate::http::http2::flow::Window;
use crate::http::http2::frames::ErrorCode;
use crate::http::http2::message::HeaderList;
use crate::http::{Error, Success};
use std::fmt::{Display, Formatter};
use std::sync::mpsc::Sender;

#[cfg(test)]
mod tests;

/// Stream states (RFC 9113 §5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            Self::Idle => "idle",
            Self::ReservedLocal => "reserved (local)",
            Self::ReservedRemote => "reserved (remote)",
            Self::Open => "open",
            Self::HalfClosedLocal => "half-closed (local)",
            Self::HalfClosedRemote => "half-closed (remote)",
            Self::Closed => "closed",
        };
        write!(f, "{state}")
    }
}

/// What a streaming handle observes as frames arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Headers(HeaderList),
    Data(Vec<u8>),
    End,
    Reset(ErrorCode),
}

#[derive(Debug)]
pub struct Stream {
    pub id: u32,
    pub state: State,
    pub send_window: Window,
    pub recv_window: Window,
    pub headers: HeaderList,
    pub body: Vec<u8>,
    /// Set in streaming mode; frames are forwarded instead of accumulated.
    pub(crate) sink: Option<Sender<StreamEvent>>,
}

impl Stream {
    pub fn new(id: u32, send_window: u32, recv_window: u32) -> Self {
        Self {
            id,
            state: State::Idle,
            send_window: Window::new(send_window),
            recv_window: Window::new(recv_window),
            headers: Vec::new(),
            body: Vec::new(),
            sink: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub fn is_streaming(&self) -> bool {
        self.sink.is_some()
    }

    /// The peer has sent END_STREAM or the stream is gone.
    pub fn is_remote_closed(&self) -> bool {
        matches!(self.state, State::HalfClosedRemote | State::Closed)
    }

    pub fn is_local_closed(&self) -> bool {
        matches!(self.state, State::HalfClosedLocal | State::Closed)
    }

    fn closed_error(&self, action: &str) -> Error {
        Error::stream(
            ErrorCode::StreamClosed,
            &format!("cannot {action} on stream {} in state {}", self.id, self.state),
        )
    }

    fn emit(&self, event: StreamEvent) {
        if let Some(sink) = &self.sink {
            let _ = sink.send(event);
        }
    }

    /// Records a HEADERS frame leaving this endpoint.
    pub fn send_headers(&mut self, end_stream: bool) -> Success {
        self.state = match self.state {
            State::Idle => State::Open,
            State::ReservedLocal => State::HalfClosedRemote,
            State::Open | State::HalfClosedRemote => self.state,
            _ => return Err(self.closed_error("send headers")),
        };
        if end_stream {
            self.send_end_stream();
        }

        Ok(())
    }

    pub fn send_end_stream(&mut self) {
        self.state = match self.state {
            State::Open => State::HalfClosedLocal,
            State::HalfClosedRemote => State::Closed,
            state => state,
        };
    }

    /// Applies a decoded header block. Blocks after the first (trailers) are
    /// appended to the same list.
    pub fn recv_headers(&mut self, fields: HeaderList, end_stream: bool) -> Success {
        self.state = match self.state {
            State::Idle => State::Open,
            State::ReservedRemote => State::HalfClosedLocal,
            State::Open | State::HalfClosedLocal => self.state,
            _ => return Err(self.closed_error("receive headers")),
        };
        match self.is_streaming() {
            true => self.emit(StreamEvent::Headers(fields)),
            false => self.headers.extend(fields),
        }
        if end_stream {
            self.recv_end_stream();
        }

        Ok(())
    }

    pub fn recv_data(&mut self, data: Vec<u8>, end_stream: bool) -> Success {
        if !matches!(self.state, State::Open | State::HalfClosedLocal) {
            return Err(self.closed_error("receive data"));
        }
        match self.is_streaming() {
            true if !data.is_empty() => self.emit(StreamEvent::Data(data)),
            true => {}
            false => self.body.extend(data),
        }
        if end_stream {
            self.recv_end_stream();
        }

        Ok(())
    }

    /// Marks the remote side finished. Returns `true` only on the transition,
    /// so a repeated END_STREAM is a no-op.
    pub fn recv_end_stream(&mut self) -> bool {
        let next = match self.state {
            State::Open => State::HalfClosedRemote,
            State::HalfClosedLocal => State::Closed,
            _ => return false,
        };
        self.state = next;
        self.emit(StreamEvent::End);

        true
    }

    /// RST_STREAM in either direction closes the stream from any state.
    pub fn reset(&mut self, code: ErrorCode) {
        self.state = State::Closed;
        self.emit(StreamEvent::Reset(code));
    }

    /// Takes the accumulated header list and body.
    pub fn take_message(&mut self) -> (HeaderList, Vec<u8>) {
        (
            std::mem::take(&mut self.headers),
            std::mem::take(&mut self.body),
        )
    }
}

impl Display for Stream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stream {{ id: {}, state: {}, send_window: {}, recv_window: {} }}",
            self.id,
            self.state,
            self.send_window.available(),
            self.recv_window.available()
        )
    }
}
