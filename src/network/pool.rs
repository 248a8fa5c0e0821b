//! Socket pool: idle authenticated workers, scoped checkout, eviction.
//!
//! The pool is the only shared mutable state in the crate. It is
//! guarded by a plain mutex whose critical sections are push/pop only —
//! no I/O ever happens under the lock. A worker is handed to exactly
//! one caller at a time; nested use within that caller bumps the
//! reentrancy depth instead of touching the pool.
//!
//! Checkout is an RAII guard. Completing an exchange returns the worker
//! to the pool; every other exit path — errors included — closes and
//! drops it, so a socket in an unknown read state can never be reused.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Decoder;

use crate::codec::EcCodec;
use crate::error::EcError;
use crate::packet::Packet;
use crate::state::WorkerPhase;

// ── SocketWorker ─────────────────────────────────────────────────

/// One TCP connection to the daemon, its read buffer, and its
/// lifecycle state.
#[derive(Debug)]
pub(crate) struct SocketWorker {
    stream: TcpStream,
    buf: BytesMut,
    pub(crate) phase: WorkerPhase,
}

impl SocketWorker {
    pub(crate) fn new(stream: TcpStream, phase: WorkerPhase) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(4096),
            phase,
        }
    }

    /// Write a full frame, bounded by the I/O timeout.
    pub(crate) async fn send_bytes(
        &mut self,
        bytes: &[u8],
        io_timeout: Duration,
    ) -> Result<(), EcError> {
        timeout(io_timeout, self.stream.write_all(bytes))
            .await
            .map_err(|_| EcError::ConnectionFailed("daemon did not accept the request in time"))?
            .map_err(EcError::Io)
    }

    /// Read exactly one framed packet.
    ///
    /// Each read attempt is bounded by `per_read`; progress resets the
    /// clock, so a slow but live daemon keeps accumulating. Silence
    /// longer than `per_read` fails the call, and a zero-byte read
    /// mid-message means the peer closed the socket.
    pub(crate) async fn read_packet(&mut self, per_read: Duration) -> Result<Packet, EcError> {
        let mut codec = EcCodec;
        loop {
            if let Some(packet) = codec.decode(&mut self.buf)? {
                return Ok(packet);
            }
            let n = timeout(per_read, self.stream.read_buf(&mut self.buf))
                .await
                .map_err(|_| EcError::ConnectionFailed("daemon did not respond in time"))?
                .map_err(EcError::Io)?;
            if n == 0 {
                return Err(EcError::ConnectionClosed);
            }
        }
    }
}

// ── SocketPool ───────────────────────────────────────────────────

/// The set of idle, already-authenticated workers available for reuse.
#[derive(Debug, Default)]
pub(crate) struct SocketPool {
    idle: Mutex<VecDeque<SocketWorker>>,
}

impl SocketPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pop one idle worker, if any.
    pub(crate) fn pop(&self) -> Option<SocketWorker> {
        self.idle.lock().expect("socket pool lock poisoned").pop_front()
    }

    /// Return an idle worker for reuse.
    pub(crate) fn push(&self, worker: SocketWorker) {
        debug_assert!(worker.phase.is_ready());
        self.idle
            .lock()
            .expect("socket pool lock poisoned")
            .push_back(worker);
    }

    /// Number of idle workers.
    pub(crate) fn len(&self) -> usize {
        self.idle.lock().expect("socket pool lock poisoned").len()
    }
}

// ── WorkerGuard ──────────────────────────────────────────────────

/// Exclusive checkout of one worker.
///
/// [`WorkerGuard::complete`] is the single clean exit: it releases the
/// checkout and pools the worker. Dropping the guard any other way
/// closes the worker instead — a socket that may still carry half a
/// response must never be reused.
pub(crate) struct WorkerGuard<'a> {
    pool: &'a SocketPool,
    worker: Option<SocketWorker>,
}

impl<'a> WorkerGuard<'a> {
    pub(crate) fn new(pool: &'a SocketPool, mut worker: SocketWorker) -> Result<Self, EcError> {
        worker.phase.check_out()?;
        Ok(Self {
            pool,
            worker: Some(worker),
        })
    }

    /// Nested scoped use of the checked-out worker: bumps the depth
    /// counter, released when the scope drops.
    pub(crate) fn scope(&mut self) -> Result<WorkerScope<'_>, EcError> {
        let worker = self.worker.as_mut().expect("guard already completed");
        worker.phase.check_out()?;
        Ok(WorkerScope { worker })
    }

    /// Clean exit: release the checkout and return the worker to the
    /// pool.
    pub(crate) fn complete(mut self) -> Result<(), EcError> {
        let mut worker = self.worker.take().expect("guard already completed");
        worker.phase.release()?;
        self.pool.push(worker);
        Ok(())
    }
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.phase.close();
            tracing::debug!(phase = %worker.phase, "evicting socket worker");
            // Dropping the worker closes its socket.
        }
    }
}

/// Depth-counted scope over an already checked-out worker.
pub(crate) struct WorkerScope<'a> {
    worker: &'a mut SocketWorker,
}

impl Deref for WorkerScope<'_> {
    type Target = SocketWorker;

    fn deref(&self) -> &SocketWorker {
        self.worker
    }
}

impl DerefMut for WorkerScope<'_> {
    fn deref_mut(&mut self) -> &mut SocketWorker {
        self.worker
    }
}

impl Drop for WorkerScope<'_> {
    fn drop(&mut self) {
        // Depth bookkeeping only; the guard owns pool/close decisions.
        let _ = self.worker.phase.release();
    }
}
