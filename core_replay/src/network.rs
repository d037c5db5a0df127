use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use replay_runtime::TurnBatch;
use tracing::{debug, warn};

use crate::command_log::{CommandLog, ExtractMode};
use crate::error::TransportError;
use crate::replay::Replay;

/// "Send to every peer" plus a connection count.
pub trait Transport {
    fn connection_count(&self) -> usize;

    fn send_turn(&mut self, batch: &TurnBatch) -> Result<(), TransportError>;
}

/// In-process transport: one unbounded channel per connected peer.
#[derive(Debug, Clone, Default)]
pub struct ChannelTransport {
    peers: Vec<Sender<TurnBatch>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel to a new peer and return its receiving end.
    pub fn connect(&mut self) -> ChannelInbox {
        let (sender, receiver) = unbounded();
        self.peers.push(sender);
        ChannelInbox { receiver }
    }
}

impl Transport for ChannelTransport {
    fn connection_count(&self) -> usize {
        self.peers.len()
    }

    fn send_turn(&mut self, batch: &TurnBatch) -> Result<(), TransportError> {
        self.peers.retain(|peer| match peer.send(batch.clone()) {
            Ok(()) => true,
            Err(err) => {
                warn!(target: "replay::network", error = %err, "dropping disconnected peer");
                false
            }
        });
        if self.peers.is_empty() {
            warn!(target: "replay::network", "every peer has disconnected");
        }
        Ok(())
    }
}

/// Receiving end of a [`ChannelTransport`] connection.
#[derive(Debug, Clone)]
pub struct ChannelInbox {
    receiver: Receiver<TurnBatch>,
}

impl ChannelInbox {
    pub fn try_recv(&self) -> Result<Option<TurnBatch>, TransportError> {
        match self.receiver.try_recv() {
            Ok(batch) => Ok(Some(batch)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    /// Queue every delivered batch for replay. Received commands are marked
    /// sent so they are never forwarded again.
    ///
    /// Fails only when the sender is gone and nothing was left to read.
    pub fn drain_into(&self, log: &mut CommandLog) -> Result<usize, TransportError> {
        let mut received = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(batch) => {
                    debug!(target: "replay::network", commands = batch.len(), "received turn");
                    received += log.ingest(batch.commands, true);
                }
                Err(TryRecvError::Empty) => return Ok(received),
                Err(TryRecvError::Disconnected) if received > 0 => return Ok(received),
                Err(TryRecvError::Disconnected) => return Err(TransportError::Disconnected),
            }
        }
    }
}

/// Broadcast transport over byte streams using length-prefixed frames.
/// Streams that fail a write are dropped.
#[derive(Debug, Default)]
pub struct FramedTransport<W: Write> {
    streams: Vec<W>,
}

impl<W: Write> FramedTransport<W> {
    pub fn new(streams: Vec<W>) -> Self {
        Self { streams }
    }

    pub fn add_stream(&mut self, stream: W) {
        self.streams.push(stream);
    }

    pub fn into_streams(self) -> Vec<W> {
        self.streams
    }
}

impl<W: Write> Transport for FramedTransport<W> {
    fn connection_count(&self) -> usize {
        self.streams.len()
    }

    fn send_turn(&mut self, batch: &TurnBatch) -> Result<(), TransportError> {
        let payload = batch.encode_to_vec()?;
        self.streams
            .retain_mut(|stream| match write_payload(stream, &payload) {
                Ok(()) => true,
                Err(err) => {
                    warn!(target: "replay::network", error = %err, "dropping peer stream");
                    false
                }
            });
        Ok(())
    }
}

/// Largest frame body [`read_frame`] accepts.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Write one batch as a `u32` little-endian length followed by its bincode body.
pub fn write_frame<W: Write>(stream: &mut W, batch: &TurnBatch) -> Result<(), TransportError> {
    let payload = batch.encode_to_vec()?;
    write_payload(stream, &payload)?;
    Ok(())
}

pub fn read_frame<R: Read>(stream: &mut R) -> Result<TurnBatch, TransportError> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(TurnBatch::decode(&payload)?)
}

fn write_payload<W: Write>(stream: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u32;
    let mut buffer = Vec::with_capacity(4 + payload.len());
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(payload);
    stream.write_all(&buffer)
}

/// Ship every unsent command, stamping it sent, so a freshly recorded
/// choice answer reaches peers behind the actions it depends on.
pub fn send_user_choice<T>(log: &mut CommandLog, transport: &mut T) -> Result<(), TransportError>
where
    T: Transport + ?Sized,
{
    if transport.connection_count() == 0 {
        return Ok(());
    }
    let commands = log.extract_range(0, log.len(), ExtractMode::Pending);
    if commands.is_empty() {
        return Ok(());
    }
    debug!(target: "replay::network", commands = commands.len(), "sending user choice");
    transport.send_turn(&TurnBatch::new(commands))
}

/// Ships commands recorded after a checkpoint to peers.
///
/// Dropping the sender performs a final best-effort [`flush_all`].
///
/// [`flush_all`]: NetworkSyncSender::flush_all
pub struct NetworkSyncSender<'a, T: Transport + ?Sized> {
    replay: &'a mut Replay,
    transport: &'a mut T,
    upto: usize,
}

impl<'a, T: Transport + ?Sized> NetworkSyncSender<'a, T> {
    pub fn new(replay: &'a mut Replay, transport: &'a mut T) -> Self {
        let upto = replay.log().len();
        Self {
            replay,
            transport,
            upto,
        }
    }

    pub fn checkpoint(&self) -> usize {
        self.upto
    }

    /// Ship non-undoable commands (chat, labels) right away. The checkpoint
    /// stays put so undoable actions can still be rolled back.
    pub fn flush_non_undoable(&mut self) -> Result<(), TransportError> {
        if self.transport.connection_count() == 0 {
            return Ok(());
        }
        let end = self.replay.log().len();
        let start = self.upto.min(end);
        let commands = self
            .replay
            .log_mut()
            .extract_range(start, end, ExtractMode::NonUndoable);
        if commands.is_empty() {
            return Ok(());
        }
        debug!(target: "replay::network", commands = commands.len(), "flushing non-undoable commands");
        self.transport.send_turn(&TurnBatch::new(commands))
    }

    /// Ship every unsent command since the checkpoint and advance it.
    pub fn flush_all(&mut self) -> Result<(), TransportError> {
        if self.transport.connection_count() == 0 {
            return Ok(());
        }
        let end = self.replay.log().len();
        let start = self.upto.min(end);
        let commands = self
            .replay
            .log_mut()
            .extract_range(start, end, ExtractMode::All);
        if !commands.is_empty() {
            debug!(target: "replay::network", commands = commands.len(), "flushing turn");
            self.transport.send_turn(&TurnBatch::new(commands))?;
        }
        self.upto = end;
        Ok(())
    }
}

impl<T: Transport + ?Sized> Deref for NetworkSyncSender<'_, T> {
    type Target = Replay;

    fn deref(&self) -> &Replay {
        self.replay
    }
}

impl<T: Transport + ?Sized> DerefMut for NetworkSyncSender<'_, T> {
    fn deref_mut(&mut self) -> &mut Replay {
        self.replay
    }
}

impl<T: Transport + ?Sized> Drop for NetworkSyncSender<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.flush_all() {
            debug!(target: "replay::network", error = %err, "final flush failed");
        }
    }
}
