use crate::http::http2::codec::FrameCodec;
use crate::http::http2::frames::*;
use crate::http::http2::hpack::{Decoder, Encoder};
use crate::http::http2::{Config, Handler, Http2Conn};
use crate::http::transport::{Shutdown, Transport};
use crate::http::Result;
use std::collections::VecDeque;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// One direction of an in-memory connection.
#[derive(Default)]
struct Pipe {
    buffer: Mutex<(VecDeque<u8>, bool)>,
    ready: Condvar,
}

impl Pipe {
    fn close(&self) {
        let mut state = self.buffer.lock().unwrap();
        state.1 = true;
        self.ready.notify_all();
    }
}

pub(crate) struct PipeReader(Arc<Pipe>);
pub(crate) struct PipeWriter(Arc<Pipe>);

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.0.buffer.lock().unwrap();
        while state.0.is_empty() && !state.1 {
            state = self.0.ready.wait(state).unwrap();
        }
        let n = buf.len().min(state.0.len());
        for (slot, byte) in buf.iter_mut().zip(state.0.drain(..n)) {
            *slot = byte;
        }

        Ok(n)
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.0.buffer.lock().unwrap();
        if state.1 {
            return Err(std::io::Error::new(ErrorKind::BrokenPipe, "pipe closed"));
        }
        state.0.extend(buf);
        self.0.ready.notify_all();

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct PipeCloser(Arc<Pipe>, Arc<Pipe>);

impl Shutdown for PipeCloser {
    fn shutdown(&self) {
        self.0.close();
        self.1.close();
    }
}

/// One end of an in-memory full-duplex byte stream.
pub(crate) struct MemoryTransport {
    incoming: Arc<Pipe>,
    outgoing: Arc<Pipe>,
}

impl MemoryTransport {
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Pipe::default());
        let b = Arc::new(Pipe::default());
        (
            Self {
                incoming: a.clone(),
                outgoing: b.clone(),
            },
            Self {
                incoming: b,
                outgoing: a,
            },
        )
    }
}

impl Transport for MemoryTransport {
    type Reader = PipeReader;
    type Writer = PipeWriter;

    fn split(self) -> Result<(PipeReader, PipeWriter, Box<dyn Shutdown>)> {
        let closer = PipeCloser(self.incoming.clone(), self.outgoing.clone());

        Ok((
            PipeReader(self.incoming),
            PipeWriter(self.outgoing),
            Box::new(closer),
        ))
    }
}

/// A hand-driven peer that reads and writes frames directly, with its own
/// HPACK tables.
pub(crate) struct RawPeer {
    reader: BufReader<PipeReader>,
    writer: PipeWriter,
    closer: Box<dyn Shutdown>,
    pub codec: FrameCodec,
    pub encoder: Encoder,
    pub decoder: Decoder,
}

impl RawPeer {
    pub fn new(transport: MemoryTransport) -> Self {
        let (reader, writer, closer) = transport.split().unwrap();
        Self {
            reader: BufReader::new(reader),
            writer,
            closer,
            codec: FrameCodec::new(crate::http::http2::settings::MAX_MAX_FRAME_SIZE),
            encoder: Encoder::default(),
            decoder: Decoder::default(),
        }
    }

    pub fn send(&mut self, frame: Frame) {
        FrameCodec::write_frame(&mut self.writer, frame).unwrap();
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).unwrap();
    }

    pub fn send_preface(&mut self) {
        FrameCodec::write_preface(&mut self.writer).unwrap();
    }

    pub fn expect_preface(&mut self) {
        FrameCodec::expect_preface(&mut self.reader).unwrap();
    }

    /// Next known frame, panicking on a read error.
    pub fn recv(&mut self) -> Frame {
        loop {
            if let Some(frame) = self.codec.read_frame(&mut self.reader).unwrap() {
                return frame;
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.codec.read_frame(&mut self.reader)? {
                return Ok(frame);
            }
        }
    }

    /// Skips frames until one of `kind` arrives.
    pub fn recv_kind(&mut self, kind: FrameKind) -> Frame {
        loop {
            let frame = self.recv();
            if frame.kind() == kind {
                return frame;
            }
        }
    }

    pub fn send_headers(&mut self, stream_id: u32, fields: &[(&str, &str)], end_stream: bool) {
        let block = self.encoder.encode(fields.iter().copied());
        let flags = END_HEADERS | if end_stream { END_STREAM } else { 0 };
        self.send(Frame::new(stream_id, flags, Headers::new(block)));
    }

    pub fn send_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool) {
        let flags = if end_stream { END_STREAM } else { 0 };
        self.send(Frame::new(stream_id, flags, Data::new(data.to_vec())));
    }

    /// Decodes the header block of a HEADERS frame through this peer's table.
    pub fn decode(&mut self, frame: &Frame) -> Vec<(String, String)> {
        match &frame.payload {
            Payload::Headers(headers) => self.decoder.decode(&headers.header_block).unwrap(),
            other => panic!("expected HEADERS, got {}", other.kind()),
        }
    }

    /// Server half of the handshake: preface in, SETTINGS out, both ACKs.
    pub fn accept(&mut self, settings: Vec<Setting>) -> Vec<Setting> {
        self.expect_preface();
        let client_settings = match self.recv().payload {
            Payload::Settings(settings) => settings.items,
            other => panic!("expected SETTINGS, got {}", other.kind()),
        };
        self.send(Frame::settings(settings));
        self.send(Frame::settings_ack());

        client_settings
    }

    /// Client half of the handshake.
    pub fn connect(&mut self, settings: Vec<Setting>) {
        self.send_preface();
        self.send(Frame::settings(settings));
    }

    pub fn shutdown(&self) {
        self.closer.shutdown();
    }
}

/// A client connection whose peer is scripted by hand.
pub(crate) fn client_with_raw_peer(config: Config, settings: Vec<Setting>) -> (Http2Conn, RawPeer) {
    let (near, far) = MemoryTransport::pair();
    let mut peer = RawPeer::new(far);
    let server = thread::spawn(move || {
        peer.accept(settings);
        peer
    });
    let conn = Http2Conn::client(near, config).unwrap();
    let mut peer = server.join().unwrap();
    // the client's ACK of our SETTINGS
    let ack = peer.recv_kind(FrameKind::Settings);
    assert!(ack.is_ack());

    (conn, peer)
}

/// A client and server connected in memory.
pub(crate) fn connected_pair<H: Handler>(
    client: Config,
    server: Config,
    handler: H,
) -> (Http2Conn, Http2Conn) {
    let (near, far) = MemoryTransport::pair();
    let server = thread::spawn(move || Http2Conn::server(far, server, handler).unwrap());
    let client = Http2Conn::client(near, client).unwrap();
    let server = server.join().unwrap();

    (client, server)
}

/// Polls `condition` until it holds or a second passes.
pub(crate) fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }

    false
}
