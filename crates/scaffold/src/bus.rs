//! Bus engine -- chunked register transfers over a [`Transport`].
//!
//! The engine turns addressed read/write requests into one or more datagrams
//! of at most [`MAX_CHUNK`] bytes and checks the board's acknowledgment
//! counts. It has two acknowledgment modes:
//!
//! - **Immediate** (no lazy section open): every write chunk waits for its
//!   one-byte acknowledgment before the next chunk is sent. Reads are legal.
//! - **Batching** (lazy depth > 0): write acknowledgments are not read;
//!   their expected sizes are queued and checked, in issue order, when the
//!   outermost lazy section closes. Reads are refused, since a read response
//!   would otherwise be interleaved with pending write acknowledgments.
//!
//! Batching removes one serial round trip per write at the cost of failure
//! attribution: a short acknowledgment anywhere in the batch surfaces only
//! at flush time, and only the *last* mismatch observed while draining is
//! reported. Callers that need to know exactly which write failed must not
//! batch.
//!
//! Register caches updated by a batched write are provisional: the engine
//! clears them again when the batch fails or is abandoned.
//!
//! The link is a point-to-point ordered byte stream without request
//! identifiers, so all traffic on one engine must be serialized. The engine
//! holds an async mutex around the transport for the duration of each
//! transfer; interleaving whole transfers from several tasks is still the
//! caller's problem.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use scaffold_core::error::{Error, PartialTransfer, Result};
use scaffold_core::transport::Transport;

use crate::datagram::{self, Poll, MAX_CHUNK};

/// How long a single `receive` waits when no response timeout is
/// configured. The engine keeps waiting after each slice.
const IDLE_SLICE: Duration = Duration::from_millis(100);

/// Engine shared by every register, the signal matrix and the timeout
/// controller of one session.
pub type SharedBus = Arc<BusEngine>;

/// Cached value of one register.
pub(crate) type CacheSlot = Arc<Mutex<Option<u64>>>;

fn clear_slots(slots: Vec<CacheSlot>) {
    for slot in slots {
        *slot.lock() = None;
    }
}

#[derive(Debug, Default)]
struct LazyState {
    depth: usize,
    /// Expected acknowledgment sizes of writes issued while batching.
    pending: VecDeque<usize>,
    /// Acknowledgments of a batch whose guard was dropped without
    /// `finish`. Drained before the next datagram goes out.
    stale: VecDeque<usize>,
    /// Caches written while batching, cleared if the batch fails.
    provisional: Vec<CacheSlot>,
}

/// Low-level protocol engine owning the transport to one board.
pub struct BusEngine {
    link: tokio::sync::Mutex<Option<Box<dyn Transport>>>,
    connected: AtomicBool,
    lazy: Mutex<LazyState>,
    response_timeout: Option<Duration>,
}

impl BusEngine {
    /// Create an engine with no transport attached.
    ///
    /// `response_timeout` bounds how long the engine waits for the board to
    /// start answering. `None` waits indefinitely: the board always answers
    /// eventually, either fully or with a short acknowledgment once its own
    /// polling timeout expires.
    ///
    /// With `Some(d)`, an answer that does not arrive in time fails with
    /// [`Error::Timeout`] and the engine marks itself disconnected: a late
    /// answer would otherwise be taken as the response to the next request.
    /// Attach a transport again (and check the version) to resume.
    pub fn new(response_timeout: Option<Duration>) -> Self {
        BusEngine {
            link: tokio::sync::Mutex::new(None),
            connected: AtomicBool::new(false),
            lazy: Mutex::new(LazyState::default()),
            response_timeout,
        }
    }

    /// Bind a transport, closing any previously attached one.
    ///
    /// Acknowledgments still queued for the previous link are discarded.
    pub async fn attach(&self, transport: Box<dyn Transport>) {
        let mut link = self.link.lock().await;
        if let Some(mut old) = link.replace(transport) {
            if let Err(e) = old.close().await {
                warn!(error = %e, "failed to close previous transport");
            }
        }
        let provisional = {
            let mut lazy = self.lazy.lock();
            lazy.pending.clear();
            lazy.stale.clear();
            std::mem::take(&mut lazy.provisional)
        };
        clear_slots(provisional);
        self.connected.store(true, Ordering::SeqCst);
        debug!("transport attached");
    }

    /// Close and unbind the transport. Does nothing when not connected.
    pub async fn close(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        self.connected.store(false, Ordering::SeqCst);
        match link.take() {
            Some(mut transport) => {
                debug!("closing transport");
                transport.close().await
            }
            None => Ok(()),
        }
    }

    /// Whether a transport is attached and the link is in step with it.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Current lazy-section nesting depth.
    pub fn lazy_depth(&self) -> usize {
        self.lazy.lock().depth
    }

    /// Number of write acknowledgments waiting for the outermost lazy
    /// section to close.
    pub fn pending_acks(&self) -> usize {
        self.lazy.lock().pending.len()
    }

    /// Write `data` to `address`, split into chunks of at most 255 bytes.
    ///
    /// Every chunk targets the same address; the board streams them into
    /// the register (typically a FIFO). Outside a lazy section each chunk's
    /// acknowledgment is checked before the next one is sent, and a short
    /// acknowledgment fails with [`Error::ProtocolTimeout`] carrying the
    /// total number of bytes accepted so far.
    pub async fn write(&self, address: u16, data: &[u8], poll: Option<&Poll>) -> Result<()> {
        self.write_inner(address, data, poll, None).await
    }

    /// Like [`write`](Self::write), but when batching, `slot` is cleared
    /// again if the batch fails.
    pub(crate) async fn write_cached(
        &self,
        address: u16,
        data: &[u8],
        poll: Option<&Poll>,
        slot: &CacheSlot,
    ) -> Result<()> {
        self.write_inner(address, data, poll, Some(slot)).await
    }

    async fn write_inner(
        &self,
        address: u16,
        data: &[u8],
        poll: Option<&Poll>,
        slot: Option<&CacheSlot>,
    ) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("empty write".into()));
        }

        let mut link = self.link.lock().await;
        let transport = self.transport(&mut link)?;
        self.drain_stale(transport).await?;

        let mut offset = 0;
        for chunk in data.chunks(MAX_CHUNK) {
            let request = datagram::encode_write(address, chunk, poll)?;
            trace!(address, size = chunk.len(), polled = poll.is_some(), "write chunk");
            transport.send(&request).await?;

            let deferred = {
                let mut lazy = self.lazy.lock();
                if lazy.depth > 0 {
                    lazy.pending.push_back(chunk.len());
                    if let Some(slot) = slot {
                        lazy.provisional.push(slot.clone());
                    }
                    true
                } else {
                    false
                }
            };

            if !deferred {
                let ack = self.receive_ack(transport).await?;
                if ack != chunk.len() {
                    debug!(address, expected = chunk.len(), ack, "short write acknowledgment");
                    return Err(Error::ProtocolTimeout(PartialTransfer::Write {
                        written: offset + ack,
                    }));
                }
            }
            offset += chunk.len();
        }
        Ok(())
    }

    /// Read `size` bytes from `address`.
    ///
    /// Refused with [`Error::Usage`] inside a lazy section. A short
    /// acknowledgment fails immediately with [`Error::ProtocolTimeout`]
    /// carrying every byte received so far; no further chunk is requested.
    pub async fn read(&self, address: u16, size: usize, poll: Option<&Poll>) -> Result<Vec<u8>> {
        if size == 0 {
            return Err(Error::InvalidArgument("zero-length read".into()));
        }

        let mut link = self.link.lock().await;
        let transport = self.transport(&mut link)?;
        let batching = self.lazy.lock().depth > 0;
        if batching {
            return Err(Error::Usage(
                "read operations are not allowed inside a lazy section".into(),
            ));
        }
        self.drain_stale(transport).await?;

        let mut result = Vec::with_capacity(size);
        let mut remaining = size;
        while remaining > 0 {
            let chunk = remaining.min(MAX_CHUNK);
            let request = datagram::encode_read(address, chunk, poll)?;
            trace!(address, size = chunk, polled = poll.is_some(), "read chunk");
            transport.send(&request).await?;

            let raw = self.receive_exact(transport, chunk + 1).await?;
            let response = datagram::decode_read(&raw, chunk)?;
            result.extend_from_slice(response.data);
            if !response.is_complete(chunk) {
                debug!(address, expected = chunk, ack = response.ack, "short read acknowledgment");
                return Err(Error::ProtocolTimeout(PartialTransfer::Read { data: result }));
            }
            remaining -= chunk;
        }
        Ok(result)
    }

    /// Configure the board's polling timeout, in device units.
    ///
    /// Zero disables the timeout. The board sends no response.
    pub async fn set_timeout(&self, units: u32) -> Result<()> {
        let mut link = self.link.lock().await;
        let transport = self.transport(&mut link)?;
        self.drain_stale(transport).await?;
        debug!(units, "setting polling timeout");
        transport.send(&datagram::encode_set_timeout(units)).await
    }

    /// Open a lazy section, or nest one level deeper.
    pub fn lazy_start(&self) {
        let mut lazy = self.lazy.lock();
        lazy.depth += 1;
        trace!(depth = lazy.depth, "lazy section opened");
    }

    /// Close the innermost lazy section.
    ///
    /// When the outermost section closes, one acknowledgment byte is read
    /// for every write issued during the batch, in issue order, and all of
    /// them are drained even after a mismatch. If any acknowledgment was
    /// short, the error built from the *last* mismatch is returned, and
    /// every register cache written during the batch is dropped. The queue
    /// is cleared either way.
    pub async fn lazy_end(&self) -> Result<()> {
        let (expected, provisional) = {
            let mut lazy = self.lazy.lock();
            if lazy.depth == 0 {
                return Err(Error::Usage("no lazy section started".into()));
            }
            lazy.depth -= 1;
            trace!(depth = lazy.depth, "lazy section closed");
            if lazy.depth > 0 {
                return Ok(());
            }
            (
                std::mem::take(&mut lazy.pending),
                std::mem::take(&mut lazy.provisional),
            )
        };
        if expected.is_empty() {
            return Ok(());
        }

        let result = self.check_batch(expected).await;
        if result.is_err() {
            debug!(count = provisional.len(), "dropping caches written by failed batch");
            clear_slots(provisional);
        }
        result
    }

    async fn check_batch(&self, expected: VecDeque<usize>) -> Result<()> {
        let mut link = self.link.lock().await;
        let transport = self.transport(&mut link)?;
        self.drain_stale(transport).await?;

        debug!(count = expected.len(), "checking batched write acknowledgments");
        let mut last_mismatch = None;
        let mut expected = expected.into_iter();
        while let Some(size) = expected.next() {
            let ack = match self.receive_ack(transport).await {
                Ok(ack) => ack,
                Err(e) => {
                    self.lazy.lock().stale.extend(expected);
                    return Err(e);
                }
            };
            if ack != size {
                debug!(expected = size, ack, "short batched write acknowledgment");
                last_mismatch = Some(ack);
            }
        }

        match last_mismatch {
            Some(ack) => Err(Error::ProtocolTimeout(PartialTransfer::Write { written: ack })),
            None => Ok(()),
        }
    }

    /// Open a lazy section closed by [`LazySection::finish`].
    ///
    /// Dropping the guard without finishing still closes the section; the
    /// acknowledgments it leaves behind are then consumed, and only logged,
    /// by the next bus operation. Register caches written in an abandoned
    /// batch are dropped.
    pub fn lazy_section(&self) -> LazySection<'_> {
        self.lazy_start();
        LazySection {
            bus: self,
            open: true,
        }
    }

    fn abandon_lazy(&self) {
        let provisional = {
            let mut lazy = self.lazy.lock();
            lazy.depth = lazy.depth.saturating_sub(1);
            if lazy.depth > 0 {
                return;
            }
            if !lazy.pending.is_empty() {
                let pending = std::mem::take(&mut lazy.pending);
                warn!(
                    count = pending.len(),
                    "lazy section dropped without finish, deferring acknowledgment check"
                );
                lazy.stale.extend(pending);
            }
            std::mem::take(&mut lazy.provisional)
        };
        // Nothing will confirm these writes any more.
        clear_slots(provisional);
    }

    fn transport<'l>(
        &self,
        link: &'l mut Option<Box<dyn Transport>>,
    ) -> Result<&'l mut (dyn Transport + 'static)> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        link.as_deref_mut().ok_or(Error::NotConnected)
    }

    async fn drain_stale(&self, transport: &mut dyn Transport) -> Result<()> {
        let stale = std::mem::take(&mut self.lazy.lock().stale);
        for expected in stale {
            let ack = self.receive_ack(transport).await?;
            if ack != expected {
                warn!(expected, ack, "short acknowledgment from abandoned lazy section");
            }
        }
        Ok(())
    }

    async fn receive_ack(&self, transport: &mut dyn Transport) -> Result<usize> {
        let raw = self.receive_exact(transport, 1).await?;
        Ok(raw.first().copied().unwrap_or_default() as usize)
    }

    async fn receive_exact(&self, transport: &mut dyn Transport, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let wait = self.response_timeout.unwrap_or(IDLE_SLICE);
            match transport.receive(&mut buf[filled..], wait).await {
                Ok(count) => filled += count,
                Err(Error::Timeout) if self.response_timeout.is_none() => continue,
                Err(Error::Timeout) => {
                    warn!(
                        expected = n,
                        received = filled,
                        "board did not answer, link out of step"
                    );
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(Error::Timeout);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(buf)
    }
}

/// Guard for a lazy section. See [`BusEngine::lazy_section`].
#[must_use = "a lazy section should be closed with `finish().await`"]
pub struct LazySection<'a> {
    bus: &'a BusEngine,
    open: bool,
}

impl LazySection<'_> {
    /// Close the section, checking batched acknowledgments if it is the
    /// outermost one.
    pub async fn finish(mut self) -> Result<()> {
        self.open = false;
        self.bus.lazy_end().await
    }
}

impl Drop for LazySection<'_> {
    fn drop(&mut self) {
        if self.open {
            self.bus.abandon_lazy();
        }
    }
}
