//! The outbound queue. One thread owns the write half of the transport and
//! the HPACK encoder, so frames never interleave and header blocks are
//! compressed in exactly the order they hit the wire.

use crate::http::http2::codec::FrameCodec;
use crate::http::http2::conn::{read_locked, write_locked, Shared};
use crate::http::http2::frames::*;
use crate::http::http2::hpack::Encoder;
use crate::http::http2::message::HeaderList;
use crate::http::http2::settings::{StreamSettings, DEFAULT_HEADER_TABLE_SIZE};
use crate::http::Success;
use std::collections::{BTreeMap, VecDeque};
use std::io::{BufWriter, Write};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use tracing::{debug, error, trace};

#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(Frame),
    Headers {
        stream_id: u32,
        fields: HeaderList,
        end_stream: bool,
    },
    Data {
        stream_id: u32,
        data: Vec<u8>,
        end_stream: bool,
    },
    /// The peer changed SETTINGS_HEADER_TABLE_SIZE.
    TableSize(usize),
    /// A send window grew; retry parked data.
    WindowOpened,
    Shutdown,
}

pub(crate) struct Writer<W: Write> {
    shared: Arc<Shared>,
    sink: BufWriter<W>,
    encoder: Encoder,
    /// Per-stream messages waiting for send window, oldest first.
    parked: BTreeMap<u32, VecDeque<Outbound>>,
}

impl<W: Write> Writer<W> {
    pub fn new(shared: Arc<Shared>, sink: BufWriter<W>, peer: &StreamSettings) -> Self {
        let mut encoder = Encoder::default();
        if peer.header_table_size < DEFAULT_HEADER_TABLE_SIZE {
            encoder.set_max_size(peer.header_table_size as usize);
        }

        Self {
            shared,
            sink,
            encoder,
            parked: BTreeMap::new(),
        }
    }

    pub fn run(mut self, queue: Receiver<Outbound>) {
        loop {
            let item = match queue.try_recv() {
                Ok(item) => item,
                Err(TryRecvError::Empty) => {
                    if let Err(e) = self.sink.flush() {
                        error!(error = %e, "flush failed");
                        break;
                    }
                    match queue.recv() {
                        Ok(item) => item,
                        Err(_) => break,
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            };
            match self.handle(item) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!(error = e.message(), "write failed");
                    break;
                }
            }
        }
        let _ = self.sink.flush();
        self.shared.closer.shutdown();
        debug!(parked = self.parked.len(), "writer stopped");
    }

    /// Returns `false` once the writer should stop.
    fn handle(&mut self, item: Outbound) -> crate::http::Result<bool> {
        match item {
            Outbound::Frame(frame) => FrameCodec::write_frame(&mut self.sink, frame)?,
            Outbound::Headers { stream_id, .. } | Outbound::Data { stream_id, .. }
                if self.parked.contains_key(&stream_id) =>
            {
                self.park(stream_id, item);
            }
            Outbound::Headers {
                stream_id,
                fields,
                end_stream,
            } => self.write_headers(stream_id, fields, end_stream)?,
            Outbound::Data {
                stream_id,
                data,
                end_stream,
            } => {
                if let Some(rest) = self.write_data(stream_id, data, end_stream)? {
                    self.park(stream_id, rest);
                }
            }
            Outbound::TableSize(size) => {
                debug!(size, "resizing send table");
                self.encoder.set_max_size(size.min(DEFAULT_HEADER_TABLE_SIZE as usize));
            }
            Outbound::WindowOpened => self.resume()?,
            Outbound::Shutdown => return Ok(false),
        }

        Ok(true)
    }

    fn park(&mut self, stream_id: u32, item: Outbound) {
        trace!(stream_id, "parking until the send window opens");
        self.parked.entry(stream_id).or_default().push_back(item);
    }

    /// Retries parked messages stream by stream, stopping at the first one
    /// that still cannot go out.
    fn resume(&mut self) -> Success {
        let stream_ids: Vec<u32> = self.parked.keys().copied().collect();
        for stream_id in stream_ids {
            while let Some(item) = self
                .parked
                .get_mut(&stream_id)
                .and_then(|queue| queue.pop_front())
            {
                let blocked = match item {
                    Outbound::Headers {
                        fields, end_stream, ..
                    } => {
                        self.write_headers(stream_id, fields, end_stream)?;
                        None
                    }
                    Outbound::Data {
                        data, end_stream, ..
                    } => self.write_data(stream_id, data, end_stream)?,
                    _ => None,
                };
                if let Some(rest) = blocked {
                    if let Some(queue) = self.parked.get_mut(&stream_id) {
                        queue.push_front(rest);
                    }
                    break;
                }
            }
            if self.parked.get(&stream_id).is_some_and(VecDeque::is_empty) {
                self.parked.remove(&stream_id);
            }
        }

        Ok(())
    }

    fn peer_max_frame_size(&self) -> usize {
        read_locked(&self.shared.settings).peer.max_frame_size as usize
    }

    /// Applies the state transition, then compresses and writes the block,
    /// split into CONTINUATION frames when it exceeds the peer's frame size.
    fn write_headers(&mut self, stream_id: u32, fields: HeaderList, end_stream: bool) -> Success {
        let max_frame_size = self.peer_max_frame_size();
        {
            let mut table = write_locked(&self.shared.table);
            let Some(stream) = table.streams.get_mut(&stream_id) else {
                debug!(stream_id, "dropping headers for a closed stream");
                return Ok(());
            };
            if let Err(e) = stream.send_headers(end_stream) {
                debug!(stream_id, error = e.message(), "dropping headers");
                return Ok(());
            }
            if stream.is_closed() {
                table.streams.remove(&stream_id);
            }
        }
        let block = self
            .encoder
            .encode(fields.iter().map(|(n, v)| (n.as_str(), v.as_str())));
        let mut fragments: Vec<&[u8]> = block.chunks(max_frame_size).collect();
        if fragments.is_empty() {
            fragments.push(&[]);
        }
        let last = fragments.len() - 1;
        for (i, fragment) in fragments.into_iter().enumerate() {
            let flags = if i == last { END_HEADERS } else { 0 };
            let frame = match i {
                0 => {
                    let flags = if end_stream { flags | END_STREAM } else { flags };
                    Frame::new(stream_id, flags, Headers::new(fragment.to_vec()))
                }
                _ => Frame::new(
                    stream_id,
                    flags,
                    Continuation {
                        header_block: fragment.to_vec(),
                    },
                ),
            };
            FrameCodec::write_frame(&mut self.sink, frame)?;
        }

        Ok(())
    }

    /// Sends as much of `data` as both send windows allow, chunked to the
    /// peer's frame size. Returns what is left when a window runs out.
    fn write_data(
        &mut self,
        stream_id: u32,
        mut data: Vec<u8>,
        end_stream: bool,
    ) -> crate::http::Result<Option<Outbound>> {
        let max_frame_size = self.peer_max_frame_size();
        loop {
            let (frame, done) = {
                let mut guard = write_locked(&self.shared.table);
                let table = &mut *guard;
                let Some(stream) = table.streams.get_mut(&stream_id) else {
                    debug!(stream_id, "dropping data for a closed stream");
                    return Ok(None);
                };
                let size = data
                    .len()
                    .min(max_frame_size)
                    .min(stream.send_window.sendable())
                    .min(table.send_window.sendable());
                if size == 0 && !data.is_empty() {
                    return Ok(Some(Outbound::Data {
                        stream_id,
                        data,
                        end_stream,
                    }));
                }
                let rest = data.split_off(size);
                let done = rest.is_empty();
                let chunk = std::mem::replace(&mut data, rest);
                stream.send_window.debit(size);
                table.send_window.debit(size);
                let flags = match done && end_stream {
                    true => {
                        stream.send_end_stream();
                        END_STREAM
                    }
                    false => 0,
                };
                if stream.is_closed() {
                    table.streams.remove(&stream_id);
                }
                (Frame::new(stream_id, flags, Data::new(chunk)), done)
            };
            FrameCodec::write_frame(&mut self.sink, frame)?;
            if done {
                return Ok(None);
            }
        }
    }
}
