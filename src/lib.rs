//! # ec-remote
//!
//! Client library for the EC remote-control protocol: drive a running
//! download daemon over TCP — authenticate, send a typed request, get a
//! typed, possibly nested, response.
//!
//! This crate contains:
//! - **VarNum codec**: compact self-delimiting integers (`varnum`)
//! - **Tag codec**: typed, recursively nested wire values (`Tag`, `TagValue`)
//! - **Result model**: queryable decoded responses (`TagMap`, `PrefixView`)
//! - **Packet framer**: header, flags, zlib compression (`Packet`, `EcCodec`)
//! - **Connection engine**: salted-MD5 login handshake and a pool of
//!   authenticated, reusable sockets (`Connection`)
//! - **Operations**: thin daemon commands over `communicate` (status,
//!   search, transfers, servers)
//! - **Error**: `EcError` — typed, `thiserror`-based error hierarchy
//!
//! ```no_run
//! use ec_remote::{Connection, ConnectionConfig};
//!
//! # async fn demo() -> Result<(), ec_remote::EcError> {
//! let mut config = ConnectionConfig::default();
//! config.password = "secret".into();
//! let daemon = Connection::new(config);
//!
//! let stats = daemon.status().await?;
//! if let Some(speed) = stats.get("stats_dl_speed") {
//!     println!("downloading at {:?} B/s", speed.as_uint());
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod codes;
pub mod config;
pub mod error;
pub mod network;
pub mod packet;
pub mod state;
pub mod tag;
pub mod tagmap;
pub mod varnum;

mod ops;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{EcCodec, MAX_BODY_SIZE};
pub use codes::{ConnState, OpCode, SearchScope};
pub use config::ConnectionConfig;
pub use error::EcError;
pub use network::{Connection, salted_challenge};
pub use packet::{COMPRESSION_THRESHOLD, HEADER_SIZE, Packet, PacketFlags};
pub use state::WorkerPhase;
pub use tag::{NumberingMode, Tag, TagType, TagValue};
pub use tagmap::{PrefixView, TagKey, TagMap, Value};
