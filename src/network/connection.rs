//! Connection engine: login handshake and pooled request/response.
//!
//! A [`Connection`] is cheap to create and connects lazily: the first
//! exchange (or the first one to find the pool empty) opens a TCP
//! stream, runs the login handshake — salted if the daemon demands it —
//! and the authenticated worker is reused for later exchanges.
//!
//! Concurrency model: any number of tasks may call
//! [`Connection::communicate`] at once. Each call uses one worker
//! exclusively for exactly one request/response pair (strict
//! half-duplex); ordering across workers is not defined. A call makes
//! exactly one attempt — retry policy belongs to the caller.

use std::io;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::codes::OpCode;
use crate::config::ConnectionConfig;
use crate::error::EcError;
use crate::network::pool::{SocketPool, SocketWorker, WorkerGuard};
use crate::packet::{self, HEADER_SIZE, Packet, PacketFlags};
use crate::state::WorkerPhase;
use crate::tagmap::{TagMap, Value};

/// Salted-login challenge: lowercase hex of the password digest,
/// concatenated with the lowercase hex digest of the salt rendered as
/// bare uppercase hex.
pub fn salted_challenge(password: &str, salt: u64) -> String {
    let pass_hex = hex::encode(packet::md5_digest(password.as_bytes()));
    let salt_hex = hex::encode(packet::md5_digest(format!("{salt:X}").as_bytes()));
    format!("{pass_hex}{salt_hex}")
}

/// Remote-control handle for a running daemon.
#[derive(Debug)]
pub struct Connection {
    config: ConnectionConfig,
    pool: SocketPool,
}

impl Connection {
    /// Create a handle. No I/O happens until the first exchange.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: SocketPool::new(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Number of idle, authenticated workers currently pooled.
    pub fn idle_workers(&self) -> usize {
        self.pool.len()
    }

    // ── Handshake ────────────────────────────────────────────────

    /// Open a TCP stream and authenticate it.
    async fn build_worker(&self) -> Result<SocketWorker, EcError> {
        let config = &self.config;
        let addr = format!("{}:{}", config.host, config.port);

        let mut phase = WorkerPhase::default();
        phase.begin_connect()?;

        let connected = timeout(config.connect_timeout(), TcpStream::connect(addr.as_str())).await;
        let stream = match connected {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(EcError::ConnectFailed { addr, source }),
            Err(_) => {
                return Err(EcError::ConnectFailed {
                    addr,
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                });
            }
        };

        let mut worker = SocketWorker::new(stream, phase);
        worker.phase.begin_auth()?;

        let login = packet::login_request(
            &config.client_name,
            &config.client_version,
            &config.password,
        );
        worker
            .send_bytes(&login.to_bytes()?, config.read_timeout())
            .await?;
        let mut reply = worker.read_packet(config.read_timeout()).await?;

        if reply.opcode == OpCode::AuthSalt {
            let tags = TagMap::from_tags(&reply.tags);
            let salt = tags
                .get("passwd_salt")
                .and_then(Value::as_uint)
                .ok_or(EcError::AuthenticationFailed("salt response carried no salt"))?;
            let challenge = salted_challenge(&config.password, salt);
            worker
                .send_bytes(&packet::salted_auth(&challenge).to_bytes()?, config.read_timeout())
                .await?;
            reply = worker.read_packet(config.read_timeout()).await?;
        }

        if reply.opcode != OpCode::AuthOk {
            return Err(EcError::AuthenticationFailed("daemon rejected the login"));
        }
        worker.phase.complete_auth()?;
        tracing::debug!(host = %config.host, port = config.port, "EC client authenticated");
        Ok(worker)
    }

    /// Check out a pooled worker, or build and authenticate a fresh
    /// one. Never performs I/O while the pool lock is held.
    async fn acquire(&self) -> Result<WorkerGuard<'_>, EcError> {
        let worker = match self.pool.pop() {
            Some(worker) => worker,
            None => self.build_worker().await?,
        };
        WorkerGuard::new(&self.pool, worker)
    }

    // ── Exchanges ────────────────────────────────────────────────

    async fn send_on(
        &self,
        guard: &mut WorkerGuard<'_>,
        request: &Packet,
    ) -> Result<(), EcError> {
        let bytes = request.to_bytes()?;
        let mut scope = guard.scope()?;
        scope.send_bytes(&bytes, self.config.read_timeout()).await
    }

    async fn recv_on(&self, guard: &mut WorkerGuard<'_>) -> Result<Packet, EcError> {
        let mut scope = guard.scope()?;
        scope.read_packet(self.config.read_timeout()).await
    }

    /// Send one framed packet on some pooled worker.
    pub async fn send(&self, request: &Packet) -> Result<(), EcError> {
        let mut guard = self.acquire().await?;
        match self.send_on(&mut guard, request).await {
            Ok(()) => guard.complete(),
            Err(e) => Err(e),
        }
    }

    /// Read one framed response from some pooled worker.
    pub async fn recv(&self) -> Result<(OpCode, TagMap), EcError> {
        let mut guard = self.acquire().await?;
        match self.recv_on(&mut guard).await {
            Ok(reply) => {
                guard.complete()?;
                Ok((reply.opcode, TagMap::from_tags(&reply.tags)))
            }
            Err(e) => Err(e),
        }
    }

    /// One request/response exchange on a single worker.
    ///
    /// On success the worker returns to the pool; on any error it is
    /// closed and dropped. If the daemon answers with the generic
    /// failure opcode and `raise_on_fail` is set, the error names the
    /// request's own opcode — the failure response carries none.
    pub async fn communicate(
        &self,
        request: Packet,
        raise_on_fail: bool,
    ) -> Result<(OpCode, TagMap), EcError> {
        let mut guard = self.acquire().await?;
        match self.exchange(&mut guard, &request, raise_on_fail).await {
            Ok(result) => {
                guard.complete()?;
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }

    async fn exchange(
        &self,
        guard: &mut WorkerGuard<'_>,
        request: &Packet,
        raise_on_fail: bool,
    ) -> Result<(OpCode, TagMap), EcError> {
        if self.config.log_outgoing {
            // Decode our own frame so the log shows what actually hits
            // the wire, compression and all.
            let bytes = request.to_bytes()?;
            let flags = PacketFlags::from_bits_truncate(u32::from_be_bytes(
                bytes[0..4].try_into().expect("header slice"),
            ));
            let echoed = Packet::parse(flags, &bytes[HEADER_SIZE..])?;
            tracing::trace!(opcode = %echoed.opcode, tags = echoed.tags.len(), "sending packet");
        }

        self.send_on(guard, request).await?;
        let reply = self.recv_on(guard).await?;

        if reply.opcode == OpCode::Failed && raise_on_fail {
            return Err(EcError::OperationFailed(request.opcode));
        }
        Ok((reply.opcode, TagMap::from_tags(&reply.tags)))
    }
}
