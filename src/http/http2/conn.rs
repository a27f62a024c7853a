use crate::http::http2::codec::FrameCodec;
use crate::http::http2::config::Config;
use crate::http::http2::dispatch::Dispatcher;
use crate::http::http2::flow::Window;
use crate::http::http2::frames::*;
use crate::http::http2::message::{self, HeaderList};
use crate::http::http2::settings::{StreamSettings, DEFAULT_INITIAL_WINDOW_SIZE};
use crate::http::http2::stream::{Stream, StreamEvent};
use crate::http::http2::writer::{Outbound, Writer};
use crate::http::transport::{Shutdown, Transport};
use crate::http::{Error, Request, Response, Result, Success};
use std::collections::{HashMap, VecDeque};
use std::io::{BufReader, BufWriter, Read, Write};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub(crate) fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_locked<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_locked<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Tells the peer why the handshake failed before the transport is dropped.
fn refuse<W: Write>(writer: &mut W, error: Error) -> Error {
    let code = error.code().unwrap_or(ErrorCode::ProtocolError);
    warn!(error = %code, message = error.message(), "handshake failed");
    let _ = FrameCodec::write_frame(writer, Frame::go_away(0, code, error.message()));
    let _ = writer.flush();
    error
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Whether streams with this id are opened by this endpoint.
    pub fn is_local(self, stream_id: u32) -> bool {
        match self {
            Self::Client => stream_id % 2 == 1,
            Self::Server => stream_id % 2 == 0,
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ConnectionStatus {
    ACTIVE,
    /// GOAWAY was sent or received; no new streams.
    CLOSING,
    DEAD,
}

/// Receives every completed inbound request on a server connection.
pub trait Handler: Send + Sync + 'static {
    fn on_request(&self, request: Request, stream: &StreamHandle) -> Response;
}

impl<F> Handler for F
where
    F: Fn(Request, &StreamHandle) -> Response + Send + Sync + 'static,
{
    fn on_request(&self, request: Request, stream: &StreamHandle) -> Response {
        self(request, stream)
    }
}

#[derive(Debug)]
pub(crate) struct StreamTable {
    pub streams: HashMap<u32, Stream>,
    pub next_local_id: u32,
    pub last_peer_id: u32,
    pub send_window: Window,
    pub recv_window: Window,
}

impl StreamTable {
    fn new(role: Role, connection_window: u32) -> Self {
        Self {
            streams: HashMap::new(),
            next_local_id: match role {
                Role::Client => 1,
                Role::Server => 2,
            },
            last_peer_id: 0,
            send_window: Window::new(DEFAULT_INITIAL_WINDOW_SIZE),
            recv_window: Window::new(connection_window),
        }
    }

    /// Open streams initiated by `role`'s side.
    pub fn open_streams(&self, role: Role, local: bool) -> usize {
        self.streams
            .keys()
            .filter(|id| role.is_local(**id) == local)
            .count()
    }
}

/// Settings in effect for each side, plus ours that await an ACK.
#[derive(Debug)]
pub(crate) struct Negotiated {
    pub local: StreamSettings,
    pub advertised: StreamSettings,
    pub pending: VecDeque<Vec<Setting>>,
    pub peer: StreamSettings,
}

/// State shared by the connection handle, its reader and its writer.
pub(crate) struct Shared {
    pub role: Role,
    pub config: Config,
    pub status: Mutex<ConnectionStatus>,
    pub outbound: Mutex<Option<Sender<Outbound>>>,
    pub table: RwLock<StreamTable>,
    pub pending: RwLock<HashMap<u32, Sender<Result<Response>>>>,
    pub settings: RwLock<Negotiated>,
    pub pings: Mutex<HashMap<[u8; 8], Sender<Instant>>>,
    pub handler: Option<Arc<dyn Handler>>,
    pub closer: Box<dyn Shutdown>,
}

impl Shared {
    pub fn status(&self) -> ConnectionStatus {
        *locked(&self.status)
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        let mut current = locked(&self.status);
        if *current != ConnectionStatus::DEAD {
            *current = status;
        }
    }

    pub fn enqueue(&self, item: Outbound) -> Success {
        match locked(&self.outbound).as_ref() {
            Some(outbound) => outbound.send(item).map_err(|_| Error::closed()),
            None => Err(Error::closed()),
        }
    }

    pub fn send_frame(&self, frame: Frame) -> Success {
        self.enqueue(Outbound::Frame(frame))
    }

    /// Resolves the pending request for `stream_id`, if it is still waiting.
    pub fn complete(&self, stream_id: u32, result: Result<Response>) -> bool {
        let responder = write_locked(&self.pending).remove(&stream_id);
        match responder {
            Some(responder) => {
                let _ = responder.send(result);
                true
            }
            None => false,
        }
    }

    /// Resets a stream from this side: RST_STREAM goes out, the stream is
    /// forgotten and whoever waits on it gets `error`.
    pub fn reset_stream(&self, stream_id: u32, error: Error) {
        let code = error.code().unwrap_or(ErrorCode::InternalError);
        warn!(stream_id, error = %code, message = error.message(), "resetting stream");
        if let Some(mut stream) = write_locked(&self.table).streams.remove(&stream_id) {
            stream.reset(code);
        }
        let _ = self.send_frame(Frame::rst_stream(stream_id, code));
        self.complete(stream_id, Err(error));
    }

    /// Enqueues a response: leading headers, body, then trailers.
    pub fn send_response(&self, stream_id: u32, response: &Response) -> Success {
        let (leading, trailers) = message::response_headers(response);
        let has_body = !response.body.is_empty();
        let has_trailers = !trailers.is_empty();
        self.enqueue(Outbound::Headers {
            stream_id,
            fields: leading,
            end_stream: !has_body && !has_trailers,
        })?;
        if has_body {
            self.enqueue(Outbound::Data {
                stream_id,
                data: response.body.clone(),
                end_stream: !has_trailers,
            })?;
        }
        if has_trailers {
            self.enqueue(Outbound::Headers {
                stream_id,
                fields: trailers,
                end_stream: true,
            })?;
        }

        Ok(())
    }

    /// Fails everything that still waits on this connection and stops the writer.
    pub fn teardown(&self, reason: &str) {
        *locked(&self.status) = ConnectionStatus::DEAD;
        let outbound = locked(&self.outbound).take();
        let pending: Vec<_> = write_locked(&self.pending).drain().collect();
        for (_, responder) in pending {
            let _ = responder.send(Err(Error::connection(
                &format!("connection closed: {reason}"),
                None,
            )));
        }
        write_locked(&self.table).streams.clear();
        locked(&self.pings).clear();
        if let Some(outbound) = outbound {
            let _ = outbound.send(Outbound::Shutdown);
        }
        info!(role = ?self.role, reason, "connection closed");
    }
}

/// A multiplexed HTTP/2 connection. Frames are read on one thread and written
/// on another; any number of callers may issue requests concurrently.
pub struct Http2Conn {
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Http2Conn {
    /// Runs the client side of the handshake and starts the connection.
    pub fn client<T: Transport>(transport: T, config: Config) -> Result<Self> {
        let secure = transport.is_secure();
        let (reader, writer, closer) = transport.split()?;
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);
        let advertised = config.settings.to_items();
        FrameCodec::write_preface(&mut writer)?;
        FrameCodec::write_frame(&mut writer, Frame::settings(advertised.clone()))?;
        let increment = config
            .connection_window
            .saturating_sub(DEFAULT_INITIAL_WINDOW_SIZE);
        if increment > 0 {
            FrameCodec::write_frame(&mut writer, Frame::window_update(0, increment))?;
        }
        writer.flush()?;

        let mut negotiated = Negotiated {
            local: StreamSettings::default(),
            advertised: config.settings,
            pending: VecDeque::from([advertised]),
            peer: StreamSettings::protocol_defaults(),
        };
        let codec = FrameCodec::default();
        loop {
            let frame = codec
                .read_frame(&mut reader)?
                .ok_or_else(|| Error::protocol(ErrorCode::ProtocolError, "expected SETTINGS"))?;
            let (ack, kind) = (frame.is_ack(), frame.kind());
            match frame.payload {
                Payload::Settings(_) if ack => {
                    if let Some(items) = negotiated.pending.pop_front() {
                        negotiated.local.apply(&items)?;
                    }
                }
                Payload::Settings(settings) => {
                    negotiated
                        .peer
                        .apply(&settings.items)
                        .map_err(|e| refuse(&mut writer, e))?;
                    break;
                }
                _ => {
                    return Err(refuse(
                        &mut writer,
                        Error::protocol(
                            ErrorCode::ProtocolError,
                            &format!("expected SETTINGS, received {kind}"),
                        ),
                    ))
                }
            }
        }
        FrameCodec::write_frame(&mut writer, Frame::settings_ack())?;
        writer.flush()?;
        info!(secure, peer = ?negotiated.peer, "client handshake complete");

        Ok(Self::start(
            Role::Client,
            config,
            negotiated,
            None,
            (reader, writer, closer),
        ))
    }

    /// Runs the server side of the handshake; `handler` answers every
    /// completed inbound stream.
    pub fn server<T: Transport, H: Handler>(transport: T, config: Config, handler: H) -> Result<Self> {
        let (reader, writer, closer) = transport.split()?;
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);
        FrameCodec::expect_preface(&mut reader)?;
        let frame = FrameCodec::default().read_frame(&mut reader)?;
        let items = match frame.map(|f| (f.is_ack(), f.payload)) {
            Some((false, Payload::Settings(settings))) => settings.items,
            _ => {
                return Err(refuse(
                    &mut writer,
                    Error::protocol(
                        ErrorCode::ProtocolError,
                        "preface was not followed by SETTINGS",
                    ),
                ))
            }
        };
        let mut peer = StreamSettings::protocol_defaults();
        peer.apply(&items).map_err(|e| refuse(&mut writer, e))?;
        let advertised = config.settings.to_items();
        FrameCodec::write_frame(&mut writer, Frame::settings(advertised.clone()))?;
        FrameCodec::write_frame(&mut writer, Frame::settings_ack())?;
        let increment = config
            .connection_window
            .saturating_sub(DEFAULT_INITIAL_WINDOW_SIZE);
        if increment > 0 {
            FrameCodec::write_frame(&mut writer, Frame::window_update(0, increment))?;
        }
        writer.flush()?;
        info!(peer = ?peer, "server handshake complete");

        let negotiated = Negotiated {
            local: StreamSettings::default(),
            advertised: config.settings,
            pending: VecDeque::from([advertised]),
            peer,
        };

        let handler: Arc<dyn Handler> = Arc::new(handler);

        Ok(Self::start(
            Role::Server,
            config,
            negotiated,
            Some(handler),
            (reader, writer, closer),
        ))
    }

    fn start<R, W>(
        role: Role,
        config: Config,
        negotiated: Negotiated,
        handler: Option<Arc<dyn Handler>>,
        (reader, writer, closer): (BufReader<R>, BufWriter<W>, Box<dyn Shutdown>),
    ) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (outbound, queue) = channel();
        let peer = negotiated.peer;
        let local = negotiated.local;
        let shared = Arc::new(Shared {
            role,
            table: RwLock::new(StreamTable::new(role, config.connection_window)),
            config,
            status: Mutex::new(ConnectionStatus::ACTIVE),
            outbound: Mutex::new(Some(outbound)),
            pending: RwLock::new(HashMap::new()),
            settings: RwLock::new(negotiated),
            pings: Mutex::new(HashMap::new()),
            handler,
            closer,
        });
        let writer = Writer::new(shared.clone(), writer, &peer);
        let writer = thread::spawn(move || writer.run(queue));
        let dispatcher = Dispatcher::new(shared.clone(), reader, &local);
        let reader = thread::spawn(move || dispatcher.run());

        Self {
            shared,
            reader: Some(reader),
            writer: Some(writer),
        }
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    pub fn is_active(&self) -> bool {
        self.status() == ConnectionStatus::ACTIVE
    }

    pub fn is_dead(&self) -> bool {
        self.status() == ConnectionStatus::DEAD
    }

    /// Settings the peer advertised.
    pub fn peer_settings(&self) -> StreamSettings {
        read_locked(&self.shared.settings).peer
    }

    /// Our settings the peer has acknowledged.
    pub fn local_settings(&self) -> StreamSettings {
        read_locked(&self.shared.settings).local
    }

    pub fn peer_settings_acked(&self) -> bool {
        read_locked(&self.shared.settings).pending.is_empty()
    }

    /// Remaining connection-level send window.
    pub fn send_window(&self) -> i64 {
        read_locked(&self.shared.table).send_window.available()
    }

    pub fn open_streams(&self) -> usize {
        read_locked(&self.shared.table).streams.len()
    }

    /// Sends a request and waits for the complete response. On timeout the
    /// stream is abandoned locally; nothing is sent to the peer.
    pub fn request(&self, request: Request, timeout: Duration) -> Result<Response> {
        let (responder, response) = channel();
        let stream_id = self.start_stream(request, Some(responder), None, true)?;
        match response.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let abandoned = write_locked(&self.shared.pending).remove(&stream_id);
                match abandoned {
                    Some(_) => {
                        write_locked(&self.shared.table).streams.remove(&stream_id);
                        warn!(stream_id, ?timeout, "request timed out");
                        Err(Error::timeout(&format!(
                            "no response on stream {stream_id} within {timeout:?}"
                        )))
                    }
                    // the response won the race
                    None => response.recv().unwrap_or_else(|_| Err(Error::closed())),
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::closed()),
        }
    }

    /// Opens a stream in streaming mode. The request headers and any body are
    /// sent without END_STREAM; finish with [`StreamHandle::end_stream`].
    pub fn open_stream(&self, request: Request) -> Result<StreamHandle> {
        let (sink, events) = channel();
        let stream_id = self.start_stream(request, None, Some(sink), false)?;

        Ok(StreamHandle {
            id: stream_id,
            conn: Arc::downgrade(&self.shared),
            events: Some(events),
        })
    }

    fn start_stream(
        &self,
        request: Request,
        responder: Option<Sender<Result<Response>>>,
        sink: Option<Sender<StreamEvent>>,
        end_stream: bool,
    ) -> Result<u32> {
        let shared = &self.shared;
        if shared.role == Role::Server {
            return Err(Error::user("requests can only be sent on a client connection"));
        }
        match shared.status() {
            ConnectionStatus::ACTIVE => {}
            ConnectionStatus::CLOSING => {
                return Err(Error::stream(
                    ErrorCode::RefusedStream,
                    "connection is going away",
                ))
            }
            ConnectionStatus::DEAD => return Err(Error::closed()),
        }
        let fields = message::request_headers(&request);
        let body = request.body.unwrap_or_default();
        let (local, peer) = {
            let settings = read_locked(&shared.settings);
            (settings.local, settings.peer)
        };

        let mut guard = write_locked(&shared.table);
        let table = &mut *guard;
        if let Some(max) = peer.max_concurrent_streams {
            if table.open_streams(shared.role, true) >= max as usize {
                return Err(Error::stream(
                    ErrorCode::RefusedStream,
                    &format!("peer allows {max} concurrent streams"),
                ));
            }
        }
        let stream_id = table.next_local_id;
        if stream_id > MAX_STREAM_ID {
            return Err(Error::stream(
                ErrorCode::RefusedStream,
                "stream identifiers exhausted",
            ));
        }
        table.next_local_id += 2;
        let mut stream = Stream::new(
            stream_id,
            peer.initial_window_size,
            local.initial_window_size,
        );
        stream.sink = sink;
        table.streams.insert(stream_id, stream);
        if let Some(responder) = responder {
            write_locked(&shared.pending).insert(stream_id, responder);
        }
        // still under the table lock so stream ids go out in order
        let has_body = !body.is_empty();
        let sent = shared
            .enqueue(Outbound::Headers {
                stream_id,
                fields,
                end_stream: end_stream && !has_body,
            })
            .and_then(|_| match has_body {
                true => shared.enqueue(Outbound::Data {
                    stream_id,
                    data: body,
                    end_stream,
                }),
                false => Ok(()),
            });
        if let Err(e) = sent {
            table.streams.remove(&stream_id);
            write_locked(&shared.pending).remove(&stream_id);
            return Err(e);
        }
        debug!(stream_id, "stream opened");

        Ok(stream_id)
    }

    /// Sends a PING and returns the round-trip time.
    pub fn ping(&self, timeout: Duration) -> Result<Duration> {
        let opaque_data: [u8; 8] = rand::random();
        let (tx, rx) = channel();
        locked(&self.shared.pings).insert(opaque_data, tx);
        let sent_at = Instant::now();
        if let Err(e) = self.shared.send_frame(Frame::ping(opaque_data, false)) {
            locked(&self.shared.pings).remove(&opaque_data);
            return Err(e);
        }
        match rx.recv_timeout(timeout) {
            Ok(received_at) => Ok(received_at.duration_since(sent_at)),
            Err(RecvTimeoutError::Timeout) => {
                locked(&self.shared.pings).remove(&opaque_data);
                Err(Error::timeout("no PING acknowledgement"))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::closed()),
        }
    }

    /// Advertises new settings. They take effect, including the receive
    /// window change for open streams, once the peer acknowledges them.
    pub fn update_settings(&self, items: Vec<Setting>) -> Success {
        items
            .iter()
            .try_for_each(StreamSettings::check)
            .map_err(|e| Error::user(e.message()))?;
        if items
            .iter()
            .any(|s| s.identifier == settings::SETTINGS_ENABLE_PUSH && s.value != 0)
        {
            return Err(Error::user("server push is not supported"));
        }
        let mut negotiated = write_locked(&self.shared.settings);
        self.shared.send_frame(Frame::settings(items.clone()))?;
        negotiated.advertised.apply(&items)?;
        negotiated.pending.push_back(items);

        Ok(())
    }

    /// Sends GOAWAY(NO_ERROR), drains the outbound queue and shuts the
    /// transport down.
    pub fn close(&self) -> Success {
        let outbound = locked(&self.shared.outbound).take();
        let Some(outbound) = outbound else {
            return Ok(());
        };
        self.shared.set_status(ConnectionStatus::CLOSING);
        let last_peer_id = read_locked(&self.shared.table).last_peer_id;
        info!(last_peer_id, "closing connection");
        let _ = outbound.send(Outbound::Frame(Frame::go_away(
            last_peer_id,
            ErrorCode::NoError,
            "",
        )));
        outbound
            .send(Outbound::Shutdown)
            .map_err(|_| Error::closed())
    }

    /// Waits for the reader and writer threads to finish.
    pub fn join_threads(&mut self) {
        for handle in [self.writer.take(), self.reader.take()].into_iter().flatten() {
            let _ = handle.join();
        }
    }
}

impl Drop for Http2Conn {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// A handle on one stream. Client handles from [`Http2Conn::open_stream`]
/// also receive the stream's events; handles passed to a server [`Handler`]
/// only send.
pub struct StreamHandle {
    id: u32,
    conn: Weak<Shared>,
    events: Option<Receiver<StreamEvent>>,
}

impl StreamHandle {
    pub(crate) fn sender(id: u32, conn: Weak<Shared>) -> Self {
        Self {
            id,
            conn,
            events: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    fn shared(&self) -> Result<Arc<Shared>> {
        self.conn.upgrade().ok_or_else(Error::closed)
    }

    pub fn send_headers(&self, fields: HeaderList, end_stream: bool) -> Success {
        self.shared()?.enqueue(Outbound::Headers {
            stream_id: self.id,
            fields,
            end_stream,
        })
    }

    pub fn send_data(&self, data: &[u8], end_stream: bool) -> Success {
        self.shared()?.enqueue(Outbound::Data {
            stream_id: self.id,
            data: data.to_vec(),
            end_stream,
        })
    }

    pub fn end_stream(&self) -> Success {
        self.send_data(&[], true)
    }

    pub fn reset(&self, code: ErrorCode) -> Success {
        self.shared()?
            .reset_stream(self.id, Error::stream(code, "stream reset locally"));

        Ok(())
    }

    fn events(&self) -> Result<&Receiver<StreamEvent>> {
        self.events
            .as_ref()
            .ok_or_else(|| Error::user("stream handle does not receive events"))
    }

    pub fn recv(&self) -> Result<StreamEvent> {
        self.events()?.recv().map_err(|_| Error::closed())
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<StreamEvent> {
        match self.events()?.recv_timeout(timeout) {
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => Err(Error::timeout("no stream event")),
            Err(RecvTimeoutError::Disconnected) => Err(Error::closed()),
        }
    }
}
