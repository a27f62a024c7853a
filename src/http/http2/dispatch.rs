//! The frame-processing task. One thread reads frames in arrival order,
//! owns the HPACK decoder and applies every frame to the shared state.

use crate::http::http2::codec::FrameCodec;
use crate::http::http2::conn::{
    locked, read_locked, write_locked, ConnectionStatus, Role, Shared, StreamHandle, StreamTable,
};
use crate::http::http2::frames::*;
use crate::http::http2::hpack::Decoder;
use crate::http::http2::message::{self, HeaderList};
use crate::http::http2::settings::StreamSettings;
use crate::http::http2::stream::Stream;
use crate::http::http2::writer::Outbound;
use crate::http::{Error, Success};
use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// A header block spread over HEADERS/PUSH_PROMISE and CONTINUATION frames.
struct HeaderBlock {
    stream_id: u32,
    fragments: Vec<u8>,
    end_stream: bool,
    promise: bool,
}

/// What to do with a stream once the table lock is released.
enum Completion {
    None,
    Reset(u32, Error),
    Finished(u32, HeaderList, Vec<u8>),
}

pub(crate) struct Dispatcher<R: Read> {
    shared: Arc<Shared>,
    reader: R,
    codec: FrameCodec,
    decoder: Decoder,
    block: Option<HeaderBlock>,
}

impl<R: Read> Dispatcher<R> {
    pub fn new(shared: Arc<Shared>, reader: R, local: &StreamSettings) -> Self {
        let mut decoder = Decoder::new(local.header_table_size as usize);
        decoder.set_max_list_size(local.max_header_list_size as usize);
        Self {
            shared,
            reader,
            codec: FrameCodec::new(local.max_frame_size),
            decoder,
            block: None,
        }
    }

    pub fn run(mut self) {
        let error = loop {
            let result = match self.codec.read_frame(&mut self.reader) {
                Ok(Some(frame)) => self.handle(frame),
                Ok(None) if self.block.is_some() => Err(Error::protocol(
                    ErrorCode::ProtocolError,
                    "unknown frame inside a header block",
                )),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                break e;
            }
        };
        self.fail(error);
    }

    /// Reports a connection error to the peer, when there is one to report,
    /// and tears the connection down.
    fn fail(&self, error: Error) {
        let code = match error.kind() {
            crate::http::error::ErrorKind::Connection(_) => None,
            _ => Some(error.code().unwrap_or(ErrorCode::InternalError)),
        };
        match code {
            Some(code) => {
                let last_peer_id = read_locked(&self.shared.table).last_peer_id;
                error!(error = %code, message = error.message(), "connection error");
                let _ = self.shared.send_frame(Frame::go_away(
                    last_peer_id,
                    code,
                    error.message(),
                ));
            }
            None => debug!(message = error.message(), "transport closed"),
        }
        self.shared.teardown(error.message());
    }

    fn handle(&mut self, frame: Frame) -> Success {
        let Frame { header, payload } = frame;
        let stream_id = header.stream_identifier;
        let end_headers = frame_flag(header, END_HEADERS);
        let end_stream = frame_flag(header, END_STREAM);
        let ack = frame_flag(header, ACK);
        if let Some(block) = &self.block {
            if header.kind != FrameKind::Continuation || stream_id != block.stream_id {
                return Err(Error::protocol(
                    ErrorCode::ProtocolError,
                    &format!(
                        "expected CONTINUATION on stream {}, received {}",
                        block.stream_id, header
                    ),
                ));
            }
        }
        match payload {
            Payload::Data(data) => self.on_data(header, data, end_stream),
            Payload::Headers(headers) => self.on_block(
                HeaderBlock {
                    stream_id,
                    fragments: headers.header_block,
                    end_stream,
                    promise: false,
                },
                end_headers,
            ),
            Payload::PushPromise(promise) => self.on_block(
                HeaderBlock {
                    stream_id,
                    fragments: promise.header_block,
                    end_stream: false,
                    promise: true,
                },
                end_headers,
            ),
            Payload::Continuation(continuation) => {
                let Some(mut block) = self.block.take() else {
                    return Err(Error::protocol(
                        ErrorCode::ProtocolError,
                        &format!("CONTINUATION without a header block on stream {stream_id}"),
                    ));
                };
                block.fragments.extend(continuation.header_block);
                self.on_block(block, end_headers)
            }
            Payload::Priority(priority) => {
                trace!(stream_id, ?priority, "ignoring priority");
                Ok(())
            }
            Payload::RstStream(rst) => {
                self.on_reset(stream_id, rst.error_code);
                Ok(())
            }
            Payload::Settings(settings) => self.on_settings(ack, settings.items),
            Payload::Ping(ping) => self.on_ping(ack, ping.opaque_data),
            Payload::GoAway(go_away) => {
                self.on_go_away(go_away);
                Ok(())
            }
            Payload::WindowUpdate(update) => {
                self.on_window_update(stream_id, update.window_size_increment)
            }
        }
    }

    fn on_block(&mut self, block: HeaderBlock, end_headers: bool) -> Success {
        if !end_headers {
            // an unfinished block cannot be skipped without losing the table state
            if block.fragments.len() > self.decoder.max_list_size() {
                return Err(Error::protocol(
                    ErrorCode::CompressionError,
                    &format!(
                        "header block on stream {} grew past {} bytes",
                        block.stream_id,
                        self.decoder.max_list_size()
                    ),
                ));
            }
            self.block = Some(block);
            return Ok(());
        }
        // always decode so the receive table stays in step with the peer
        let decoded = self.decoder.decode(&block.fragments);
        if block.promise {
            return Err(Error::protocol(
                ErrorCode::ProtocolError,
                "PUSH_PROMISE received with push disabled",
            ));
        }
        match decoded {
            Ok(fields) => self.on_headers(block.stream_id, fields, block.end_stream),
            Err(e) if self.shared.config.strict_hpack => Err(Error::protocol(
                e.code().unwrap_or(ErrorCode::CompressionError),
                e.message(),
            )),
            Err(e) => {
                warn!(
                    stream_id = block.stream_id,
                    error = e.message(),
                    "header block failed to decode"
                );
                let error = match e.code() {
                    Some(ErrorCode::CompressionError) => Error::compression(&format!(
                        "could not decode header block: {}",
                        e.message()
                    )),
                    _ => e,
                };
                self.shared.reset_stream(block.stream_id, error);
                Ok(())
            }
        }
    }

    fn on_headers(&mut self, stream_id: u32, fields: HeaderList, end_stream: bool) -> Success {
        let role = self.shared.role;
        let (local, peer) = {
            let settings = read_locked(&self.shared.settings);
            (settings.local, settings.peer)
        };
        let completion = {
            let mut guard = write_locked(&self.shared.table);
            let table = &mut *guard;
            if !table.streams.contains_key(&stream_id) {
                let may_open = role == Role::Server
                    && !role.is_local(stream_id)
                    && stream_id > table.last_peer_id;
                if !may_open {
                    drop(guard);
                    warn!(stream_id, "HEADERS on an unknown stream");
                    self.shared.reset_stream(
                        stream_id,
                        Error::stream(ErrorCode::StreamClosed, "unknown stream"),
                    );
                    return Ok(());
                }
                table.last_peer_id = stream_id;
                let refused = self.shared.status() != ConnectionStatus::ACTIVE
                    || local.max_concurrent_streams.is_some_and(|max| {
                        table.open_streams(role, false) >= max as usize
                    });
                if refused {
                    drop(guard);
                    self.shared.reset_stream(
                        stream_id,
                        Error::stream(ErrorCode::RefusedStream, "too many streams"),
                    );
                    return Ok(());
                }
                debug!(stream_id, "stream opened by peer");
                table.streams.insert(
                    stream_id,
                    Stream::new(stream_id, peer.initial_window_size, local.initial_window_size),
                );
            }
            match table.streams.get_mut(&stream_id) {
                Some(stream) => match stream.recv_headers(fields, end_stream) {
                    Err(e) => Completion::Reset(stream_id, e),
                    Ok(_) => Self::completion(table, stream_id),
                },
                None => Completion::None,
            }
        };

        self.complete(completion);
        Ok(())
    }

    fn on_data(&mut self, header: FrameHeader, data: Data, end_stream: bool) -> Success {
        let stream_id = header.stream_identifier;
        // the whole frame counts, padding included
        let length = header.length;
        let target = self.shared.config.connection_window;
        let local = read_locked(&self.shared.settings).local;
        let mut updates = Vec::new();
        let completion = {
            let mut guard = write_locked(&self.shared.table);
            let table = &mut *guard;
            table.recv_window.consume(length)?;
            if let Some(increment) = table.recv_window.replenish(target) {
                updates.push(Frame::window_update(0, increment));
            }
            match table.streams.get_mut(&stream_id) {
                None => Completion::Reset(
                    stream_id,
                    Error::stream(ErrorCode::StreamClosed, "DATA on an unknown stream"),
                ),
                Some(stream) => match stream.recv_window.consume(length) {
                    Err(e) => Completion::Reset(
                        stream_id,
                        Error::stream(ErrorCode::FlowControlError, e.message()),
                    ),
                    Ok(_) => match stream.recv_data(data.data, end_stream) {
                        Err(e) => Completion::Reset(stream_id, e),
                        Ok(_) => {
                            if !stream.is_remote_closed() {
                                if let Some(increment) =
                                    stream.recv_window.replenish(local.initial_window_size)
                                {
                                    updates.push(Frame::window_update(stream_id, increment));
                                }
                            }
                            Self::completion(table, stream_id)
                        }
                    },
                },
            }
        };
        for update in updates {
            debug!(stream_id = update.id(), "replenishing receive window");
            self.shared.send_frame(update)?;
        }

        self.complete(completion);
        Ok(())
    }

    /// Decides what happens to a stream after a frame was applied; closed
    /// streams leave the table here.
    fn completion(table: &mut StreamTable, stream_id: u32) -> Completion {
        let Some(stream) = table.streams.get_mut(&stream_id) else {
            return Completion::None;
        };
        if !stream.is_remote_closed() {
            return Completion::None;
        }
        let finished = match stream.is_streaming() {
            true => Completion::None,
            false => {
                let (headers, body) = stream.take_message();
                Completion::Finished(stream_id, headers, body)
            }
        };
        if stream.is_closed() {
            table.streams.remove(&stream_id);
        }

        finished
    }

    fn complete(&self, completion: Completion) {
        match completion {
            Completion::None => {}
            Completion::Reset(stream_id, error) => self.shared.reset_stream(stream_id, error),
            Completion::Finished(stream_id, headers, body) => match self.shared.role {
                Role::Client => {
                    let response = message::into_response(headers, body);
                    if !self.shared.complete(stream_id, response) {
                        warn!(stream_id, "discarding late response");
                    }
                }
                Role::Server => self.serve(stream_id, headers, body),
            },
        }
    }

    /// Hands a completed inbound request to the handler and queues its response.
    fn serve(&self, stream_id: u32, headers: HeaderList, body: Vec<u8>) {
        let request = match message::into_request(headers, body) {
            Ok(request) => request,
            Err(e) => return self.shared.reset_stream(stream_id, e),
        };
        let Some(handler) = self.shared.handler.clone() else {
            return self.shared.reset_stream(
                stream_id,
                Error::stream(ErrorCode::RefusedStream, "no handler installed"),
            );
        };
        debug!(stream_id, method = %request.method, path = %request.url.path(), "serving request");
        let shared = self.shared.clone();
        let run = move || {
            let stream = StreamHandle::sender(stream_id, Arc::downgrade(&shared));
            match catch_unwind(AssertUnwindSafe(|| handler.on_request(request, &stream))) {
                Ok(response) => {
                    if let Err(e) = shared.send_response(stream_id, &response) {
                        debug!(stream_id, error = e.message(), "response not sent");
                    }
                }
                Err(_) => shared.reset_stream(
                    stream_id,
                    Error::stream(ErrorCode::InternalError, "handler panicked"),
                ),
            }
        };
        match self.shared.config.handler_threads {
            true => {
                std::thread::spawn(run);
            }
            false => run(),
        }
    }

    fn on_reset(&self, stream_id: u32, code: ErrorCode) {
        let removed = write_locked(&self.shared.table).streams.remove(&stream_id);
        let Some(mut stream) = removed else {
            debug!(stream_id, error = %code, "RST_STREAM for an unknown stream");
            return;
        };
        info!(stream_id, error = %code, "stream reset by peer");
        stream.reset(code);
        self.shared.complete(
            stream_id,
            Err(Error::stream(code, &format!("stream reset by peer: {code}"))),
        );
    }

    fn on_settings(&mut self, ack: bool, items: Vec<Setting>) -> Success {
        let mut settings = write_locked(&self.shared.settings);
        if ack {
            let Some(items) = settings.pending.pop_front() else {
                warn!("unsolicited SETTINGS acknowledgement");
                return Ok(());
            };
            let delta = settings.local.apply(&items)?;
            let local = settings.local;
            drop(settings);
            if delta != 0 {
                for stream in write_locked(&self.shared.table).streams.values_mut() {
                    let _ = stream.recv_window.adjust(delta);
                }
            }
            self.decoder
                .set_max_size_limit(local.header_table_size as usize);
            self.decoder
                .set_max_list_size(local.max_header_list_size as usize);
            self.codec.set_max_frame_size(local.max_frame_size);
            debug!(?local, "settings acknowledged");
            return Ok(());
        }

        let table_size = settings.peer.header_table_size;
        let delta = settings.peer.apply(&items)?;
        let peer = settings.peer;
        if delta != 0 {
            let mut table = write_locked(&self.shared.table);
            for stream in table.streams.values_mut() {
                stream.send_window.adjust(delta)?;
            }
        }
        drop(settings);
        debug!(?peer, delta, "peer settings applied");
        if peer.header_table_size != table_size {
            self.shared
                .enqueue(Outbound::TableSize(peer.header_table_size as usize))?;
        }
        self.shared.send_frame(Frame::settings_ack())?;
        self.shared.enqueue(Outbound::WindowOpened)
    }

    fn on_ping(&self, ack: bool, opaque_data: [u8; 8]) -> Success {
        if !ack {
            return self.shared.send_frame(Frame::ping(opaque_data, true));
        }
        match locked(&self.shared.pings).remove(&opaque_data) {
            Some(waiter) => {
                let _ = waiter.send(Instant::now());
            }
            None => debug!(?opaque_data, "unexpected PING acknowledgement"),
        }

        Ok(())
    }

    /// Refuses streams the peer will not process; the rest finish normally.
    fn on_go_away(&self, go_away: GoAway) {
        let last_stream_id = go_away.last_stream_id;
        match go_away.error_code {
            ErrorCode::NoError => info!(last_stream_id, "peer is going away"),
            code => warn!(
                last_stream_id,
                error = %code,
                debug = %go_away.debug_message(),
                "peer is going away"
            ),
        }
        self.shared.set_status(ConnectionStatus::CLOSING);
        let role = self.shared.role;
        let refused: Vec<Stream> = {
            let mut table = write_locked(&self.shared.table);
            let ids: Vec<u32> = table
                .streams
                .keys()
                .copied()
                .filter(|id| role.is_local(*id) && *id > last_stream_id)
                .collect();
            ids.iter()
                .filter_map(|id| table.streams.remove(id))
                .collect()
        };
        for mut stream in refused {
            stream.reset(ErrorCode::RefusedStream);
            self.shared.complete(
                stream.id,
                Err(Error::stream(
                    ErrorCode::RefusedStream,
                    "stream was not processed before GOAWAY",
                )),
            );
        }
    }

    fn on_window_update(&self, stream_id: u32, increment: u32) -> Success {
        if stream_id == 0 {
            if increment == 0 {
                return Err(Error::protocol(
                    ErrorCode::ProtocolError,
                    "connection WINDOW_UPDATE with zero increment",
                ));
            }
            write_locked(&self.shared.table).send_window.credit(increment)?;
            return self.shared.enqueue(Outbound::WindowOpened);
        }
        let credited = {
            let mut table = write_locked(&self.shared.table);
            match table.streams.get_mut(&stream_id) {
                None => None,
                Some(_) if increment == 0 => Some(Err(Error::stream(
                    ErrorCode::ProtocolError,
                    "WINDOW_UPDATE with zero increment",
                ))),
                Some(stream) => Some(stream.send_window.credit(increment).map_err(|e| {
                    Error::stream(ErrorCode::FlowControlError, e.message())
                })),
            }
        };
        match credited {
            None => {
                trace!(stream_id, "WINDOW_UPDATE for an unknown stream");
                Ok(())
            }
            Some(Err(e)) => {
                self.shared.reset_stream(stream_id, e);
                Ok(())
            }
            Some(Ok(())) => self.shared.enqueue(Outbound::WindowOpened),
        }
    }
}

fn frame_flag(header: FrameHeader, flag: u8) -> bool {
    header.flags & flag != 0
}
