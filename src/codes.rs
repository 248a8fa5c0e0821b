//! Protocol vocabulary: opcodes, tag ids, and related constants.
//!
//! These values are a fixed external vocabulary shared with the daemon.
//! The codec never interprets them — it only moves them — but the
//! operation layer and the display-name table consult them.

use std::fmt;

use bitflags::bitflags;

use crate::error::EcError;

/// Protocol revision sent in the login request.
pub const PROTOCOL_VERSION: u64 = 0x0204;

// ── OpCode ───────────────────────────────────────────────────────

/// All operations understood by the EC protocol.
///
/// Organized by category:
/// - `0x01..0x09` — session control and generic response markers
/// - `0x0A..0x14` — status, queues, shared files
/// - `0x15..0x1A` — search
/// - `0x1B..0x21` — server list management
/// - `0x22..0x2D` — logs and server info
/// - `0x2E..0x36` — preferences, categories, statistics
/// - `0x37..0x3E` — network control and salted auth
/// - `0x3F..0x44` — transfer (partfile) control
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // ── Session / generic (0x01..) ───────────────────────────────
    /// Empty acknowledgement; carries no tags by definition.
    Noop = 0x01,
    /// Login request (client name, version, password digest).
    AuthReq = 0x02,
    /// Login rejected.
    AuthFail = 0x03,
    /// Login accepted.
    AuthOk = 0x04,
    /// Generic failure marker for the preceding request.
    Failed = 0x05,
    /// Response carrying a list of message strings.
    Strings = 0x06,
    /// Response carrying miscellaneous tagged data.
    MiscData = 0x07,
    /// Ask the daemon to shut down (no response).
    Shutdown = 0x08,
    /// Submit a download link.
    AddLink = 0x09,

    // ── Status and queues (0x0A..) ───────────────────────────────
    StatReq = 0x0A,
    GetConnstate = 0x0B,
    Stats = 0x0C,
    GetDloadQueue = 0x0D,
    DloadQueue = 0x0E,
    GetUloadQueue = 0x0F,
    UloadQueue = 0x10,
    GetSharedFiles = 0x11,
    SharedFiles = 0x12,
    SharedfilesReload = 0x13,
    RenameFile = 0x14,

    // ── Search (0x15..) ──────────────────────────────────────────
    SearchStart = 0x15,
    SearchStop = 0x16,
    SearchResults = 0x17,
    SearchProgress = 0x18,
    DownloadSearchResult = 0x19,
    IpfilterReload = 0x1A,

    // ── Servers (0x1B..) ─────────────────────────────────────────
    GetServerList = 0x1B,
    ServerList = 0x1C,
    ServerDisconnect = 0x1D,
    ServerConnect = 0x1E,
    ServerRemove = 0x1F,
    ServerAdd = 0x20,
    ServerUpdateFromUrl = 0x21,

    // ── Logs and server info (0x22..) ────────────────────────────
    AddLogline = 0x22,
    AddDebugLogline = 0x23,
    GetLog = 0x24,
    GetDebugLog = 0x25,
    GetServerinfo = 0x26,
    Log = 0x27,
    DebugLog = 0x28,
    Serverinfo = 0x29,
    ResetLog = 0x2A,
    ResetDebugLog = 0x2B,
    ClearServerinfo = 0x2C,
    GetLastLogEntry = 0x2D,

    // ── Preferences, categories, statistics (0x2E..) ─────────────
    GetPreferences = 0x2E,
    SetPreferences = 0x2F,
    CreateCategory = 0x30,
    UpdateCategory = 0x31,
    DeleteCategory = 0x32,
    GetStatsGraphs = 0x33,
    StatsGraphs = 0x34,
    GetStatsTree = 0x35,
    StatsTree = 0x36,

    // ── Network control and salted auth (0x37..) ─────────────────
    KadStart = 0x37,
    KadStop = 0x38,
    Connect = 0x39,
    Disconnect = 0x3A,
    KadUpdateFromUrl = 0x3B,
    KadBootstrapFromIp = 0x3C,
    /// The daemon demands salted authentication; carries the salt.
    AuthSalt = 0x3D,
    /// Second-stage login carrying the salted password digest.
    AuthPasswd = 0x3E,

    // ── Transfers (0x3F..) ───────────────────────────────────────
    PartfilePause = 0x3F,
    PartfileResume = 0x40,
    PartfileStop = 0x41,
    PartfilePrioSet = 0x42,
    PartfileDelete = 0x43,
    PartfileSetCat = 0x44,
}

impl TryFrom<u8> for OpCode {
    type Error = EcError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use OpCode::*;
        Ok(match value {
            0x01 => Noop,
            0x02 => AuthReq,
            0x03 => AuthFail,
            0x04 => AuthOk,
            0x05 => Failed,
            0x06 => Strings,
            0x07 => MiscData,
            0x08 => Shutdown,
            0x09 => AddLink,
            0x0A => StatReq,
            0x0B => GetConnstate,
            0x0C => Stats,
            0x0D => GetDloadQueue,
            0x0E => DloadQueue,
            0x0F => GetUloadQueue,
            0x10 => UloadQueue,
            0x11 => GetSharedFiles,
            0x12 => SharedFiles,
            0x13 => SharedfilesReload,
            0x14 => RenameFile,
            0x15 => SearchStart,
            0x16 => SearchStop,
            0x17 => SearchResults,
            0x18 => SearchProgress,
            0x19 => DownloadSearchResult,
            0x1A => IpfilterReload,
            0x1B => GetServerList,
            0x1C => ServerList,
            0x1D => ServerDisconnect,
            0x1E => ServerConnect,
            0x1F => ServerRemove,
            0x20 => ServerAdd,
            0x21 => ServerUpdateFromUrl,
            0x22 => AddLogline,
            0x23 => AddDebugLogline,
            0x24 => GetLog,
            0x25 => GetDebugLog,
            0x26 => GetServerinfo,
            0x27 => Log,
            0x28 => DebugLog,
            0x29 => Serverinfo,
            0x2A => ResetLog,
            0x2B => ResetDebugLog,
            0x2C => ClearServerinfo,
            0x2D => GetLastLogEntry,
            0x2E => GetPreferences,
            0x2F => SetPreferences,
            0x30 => CreateCategory,
            0x31 => UpdateCategory,
            0x32 => DeleteCategory,
            0x33 => GetStatsGraphs,
            0x34 => StatsGraphs,
            0x35 => GetStatsTree,
            0x36 => StatsTree,
            0x37 => KadStart,
            0x38 => KadStop,
            0x39 => Connect,
            0x3A => Disconnect,
            0x3B => KadUpdateFromUrl,
            0x3C => KadBootstrapFromIp,
            0x3D => AuthSalt,
            0x3E => AuthPasswd,
            0x3F => PartfilePause,
            0x40 => PartfileResume,
            0x41 => PartfileStop,
            0x42 => PartfilePrioSet,
            0x43 => PartfileDelete,
            0x44 => PartfileSetCat,
            other => return Err(EcError::UnknownOpcode(other)),
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Tag ids ──────────────────────────────────────────────────────

/// Numeric tag ids. The top bit of the id is reserved on the wire for
/// the has-children flag, so ids stay below `0x8000`.
pub mod tag_id {
    pub const STRING: u16 = 0x0000;
    pub const PASSWD_HASH: u16 = 0x0001;
    pub const PROTOCOL_VERSION: u16 = 0x0002;
    pub const VERSION_ID: u16 = 0x0003;
    pub const DETAIL_LEVEL: u16 = 0x0004;
    pub const CONNSTATE: u16 = 0x0005;
    pub const ED2K_ID: u16 = 0x0006;
    pub const LOG_TO_STATUS: u16 = 0x0007;
    pub const BOOTSTRAP_IP: u16 = 0x0008;
    pub const BOOTSTRAP_PORT: u16 = 0x0009;
    pub const CLIENT_ID: u16 = 0x000A;
    pub const PASSWD_SALT: u16 = 0x000B;

    pub const CLIENT_NAME: u16 = 0x0100;
    pub const CLIENT_VERSION: u16 = 0x0101;
    pub const CLIENT_MOD: u16 = 0x0102;

    pub const STATS_UL_SPEED: u16 = 0x0200;
    pub const STATS_DL_SPEED: u16 = 0x0201;
    pub const STATS_UL_SPEED_LIMIT: u16 = 0x0202;
    pub const STATS_DL_SPEED_LIMIT: u16 = 0x0203;
    pub const STATS_UP_OVERHEAD: u16 = 0x0204;
    pub const STATS_DOWN_OVERHEAD: u16 = 0x0205;
    pub const STATS_TOTAL_SRC_COUNT: u16 = 0x0206;
    pub const STATS_BANNED_COUNT: u16 = 0x0207;
    pub const STATS_UL_QUEUE_LEN: u16 = 0x0208;
    pub const STATS_ED2K_USERS: u16 = 0x0209;
    pub const STATS_KAD_USERS: u16 = 0x020A;
    pub const STATS_ED2K_FILES: u16 = 0x020B;
    pub const STATS_KAD_FILES: u16 = 0x020C;

    pub const PARTFILE: u16 = 0x0300;
    pub const PARTFILE_NAME: u16 = 0x0301;
    pub const PARTFILE_PARTMETID: u16 = 0x0302;
    pub const PARTFILE_SIZE_FULL: u16 = 0x0303;
    pub const PARTFILE_SIZE_XFER: u16 = 0x0304;
    pub const PARTFILE_SIZE_DONE: u16 = 0x0305;
    pub const PARTFILE_SPEED: u16 = 0x0306;
    pub const PARTFILE_STATUS: u16 = 0x0307;
    pub const PARTFILE_PRIO: u16 = 0x0308;
    pub const PARTFILE_SOURCE_COUNT: u16 = 0x0309;
    pub const PARTFILE_SOURCE_COUNT_XFER: u16 = 0x030A;
    pub const PARTFILE_HASH: u16 = 0x030B;
    pub const PARTFILE_ED2K_LINK: u16 = 0x030C;
    pub const PARTFILE_CAT: u16 = 0x030D;

    pub const KNOWNFILE: u16 = 0x0400;
    pub const KNOWNFILE_XFERRED: u16 = 0x0401;
    pub const KNOWNFILE_XFERRED_ALL: u16 = 0x0402;
    pub const KNOWNFILE_REQ_COUNT: u16 = 0x0403;
    pub const KNOWNFILE_REQ_COUNT_ALL: u16 = 0x0404;
    pub const KNOWNFILE_ACCEPT_COUNT: u16 = 0x0405;
    pub const KNOWNFILE_ACCEPT_COUNT_ALL: u16 = 0x0406;
    pub const KNOWNFILE_AICH_MASTERHASH: u16 = 0x0407;

    pub const SERVER: u16 = 0x0500;
    pub const SERVER_NAME: u16 = 0x0501;
    pub const SERVER_DESC: u16 = 0x0502;
    pub const SERVER_ADDRESS: u16 = 0x0503;
    pub const SERVER_PING: u16 = 0x0504;
    pub const SERVER_USERS: u16 = 0x0505;
    pub const SERVER_FILES: u16 = 0x0506;

    pub const SEARCHFILE: u16 = 0x0700;
    pub const SEARCH_TYPE: u16 = 0x0701;
    pub const SEARCH_NAME: u16 = 0x0702;
    pub const SEARCH_MIN_SIZE: u16 = 0x0703;
    pub const SEARCH_MAX_SIZE: u16 = 0x0704;
    pub const SEARCH_FILE_TYPE: u16 = 0x0705;
    pub const SEARCH_EXTENSION: u16 = 0x0706;
    pub const SEARCH_AVAILABILITY: u16 = 0x0707;
    pub const SEARCH_STATUS: u16 = 0x0708;

    pub const SERVERS_UPDATE_URL: u16 = 0x0800;
    pub const KADEMLIA_UPDATE_URL: u16 = 0x0801;
    pub const DIRECTORIES_INCOMING: u16 = 0x0802;
}

/// Display name for a tag id, if it has one.
///
/// Responses are keyed by these names where available; ids outside the
/// table stay numeric.
pub fn tag_name(id: u16) -> Option<&'static str> {
    use tag_id::*;
    Some(match id {
        STRING => "string",
        PASSWD_HASH => "passwd_hash",
        PROTOCOL_VERSION => "protocol_version",
        VERSION_ID => "version_id",
        DETAIL_LEVEL => "detail_level",
        CONNSTATE => "connstate",
        ED2K_ID => "ed2k_id",
        LOG_TO_STATUS => "log_to_status",
        BOOTSTRAP_IP => "bootstrap_ip",
        BOOTSTRAP_PORT => "bootstrap_port",
        CLIENT_ID => "client_id",
        PASSWD_SALT => "passwd_salt",
        CLIENT_NAME => "client_name",
        CLIENT_VERSION => "client_version",
        CLIENT_MOD => "client_mod",
        STATS_UL_SPEED => "stats_ul_speed",
        STATS_DL_SPEED => "stats_dl_speed",
        STATS_UL_SPEED_LIMIT => "stats_ul_speed_limit",
        STATS_DL_SPEED_LIMIT => "stats_dl_speed_limit",
        STATS_UP_OVERHEAD => "stats_up_overhead",
        STATS_DOWN_OVERHEAD => "stats_down_overhead",
        STATS_TOTAL_SRC_COUNT => "stats_total_src_count",
        STATS_BANNED_COUNT => "stats_banned_count",
        STATS_UL_QUEUE_LEN => "stats_ul_queue_len",
        STATS_ED2K_USERS => "stats_ed2k_users",
        STATS_KAD_USERS => "stats_kad_users",
        STATS_ED2K_FILES => "stats_ed2k_files",
        STATS_KAD_FILES => "stats_kad_files",
        PARTFILE => "partfile",
        PARTFILE_NAME => "partfile_name",
        PARTFILE_PARTMETID => "partfile_partmetid",
        PARTFILE_SIZE_FULL => "partfile_size_full",
        PARTFILE_SIZE_XFER => "partfile_size_xfer",
        PARTFILE_SIZE_DONE => "partfile_size_done",
        PARTFILE_SPEED => "partfile_speed",
        PARTFILE_STATUS => "partfile_status",
        PARTFILE_PRIO => "partfile_prio",
        PARTFILE_SOURCE_COUNT => "partfile_source_count",
        PARTFILE_SOURCE_COUNT_XFER => "partfile_source_count_xfer",
        PARTFILE_HASH => "partfile_hash",
        PARTFILE_ED2K_LINK => "partfile_ed2k_link",
        PARTFILE_CAT => "partfile_cat",
        KNOWNFILE => "knownfile",
        KNOWNFILE_XFERRED => "knownfile_xferred",
        KNOWNFILE_XFERRED_ALL => "knownfile_xferred_all",
        KNOWNFILE_REQ_COUNT => "knownfile_req_count",
        KNOWNFILE_REQ_COUNT_ALL => "knownfile_req_count_all",
        KNOWNFILE_ACCEPT_COUNT => "knownfile_accept_count",
        KNOWNFILE_ACCEPT_COUNT_ALL => "knownfile_accept_count_all",
        KNOWNFILE_AICH_MASTERHASH => "knownfile_aich_masterhash",
        SERVER => "server",
        SERVER_NAME => "server_name",
        SERVER_DESC => "server_desc",
        SERVER_ADDRESS => "server_address",
        SERVER_PING => "server_ping",
        SERVER_USERS => "server_users",
        SERVER_FILES => "server_files",
        SEARCHFILE => "searchfile",
        SEARCH_TYPE => "search_type",
        SEARCH_NAME => "search_name",
        SEARCH_MIN_SIZE => "search_min_size",
        SEARCH_MAX_SIZE => "search_max_size",
        SEARCH_FILE_TYPE => "search_file_type",
        SEARCH_EXTENSION => "search_extension",
        SEARCH_AVAILABILITY => "search_availability",
        SEARCH_STATUS => "search_status",
        SERVERS_UPDATE_URL => "servers_update_url",
        KADEMLIA_UPDATE_URL => "kademlia_update_url",
        DIRECTORIES_INCOMING => "directories_incoming",
        _ => return None,
    })
}

// ── Detail levels ────────────────────────────────────────────────

/// Requested level of detail for status-style queries.
pub mod detail {
    pub const CMD: u64 = 0x00;
    pub const WEB: u64 = 0x01;
    pub const FULL: u64 = 0x02;
}

// ── Search scope ─────────────────────────────────────────────────

/// Scope of a search request.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Query only the connected server.
    Local = 0x00,
    /// Query every server in the server list.
    Global = 0x01,
    /// Search the kademlia network.
    Kad = 0x02,
}

// ── Connection-state bits ────────────────────────────────────────

bitflags! {
    /// Bitfield carried by the `connstate` tag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConnState: u32 {
        const CONNECTED_ED2K = 0x01;
        const CONNECTING_ED2K = 0x02;
        const CONNECTED_KAD = 0x04;
        const KAD_FIREWALLED = 0x08;
        const KAD_RUNNING = 0x10;
    }
}

impl ConnState {
    /// Human-readable eD2k status string.
    pub fn ed2k_status(&self) -> &'static str {
        if self.contains(ConnState::CONNECTED_ED2K) {
            "connected"
        } else if self.contains(ConnState::CONNECTING_ED2K) {
            "connecting"
        } else {
            "not connected"
        }
    }

    /// Human-readable kademlia status string.
    pub fn kad_status(&self) -> &'static str {
        if !self.contains(ConnState::KAD_RUNNING) {
            "not running"
        } else if self.contains(ConnState::CONNECTED_KAD) {
            if self.contains(ConnState::KAD_FIREWALLED) {
                "firewalled"
            } else {
                "connected"
            }
        } else {
            "not connected"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_roundtrip() {
        for raw in 0x01u8..=0x44 {
            let op = OpCode::try_from(raw).unwrap();
            assert_eq!(op as u8, raw);
        }
    }

    #[test]
    fn opcode_invalid() {
        assert!(OpCode::try_from(0x00).is_err());
        assert!(OpCode::try_from(0x45).is_err());
        assert!(OpCode::try_from(0xFF).is_err());
    }

    #[test]
    fn opcode_display() {
        assert_eq!(OpCode::PartfileDelete.to_string(), "PartfileDelete");
        assert_eq!(OpCode::AuthSalt.to_string(), "AuthSalt");
    }

    #[test]
    fn tag_names_resolve() {
        assert_eq!(tag_name(tag_id::PASSWD_SALT), Some("passwd_salt"));
        assert_eq!(tag_name(tag_id::STATS_UL_SPEED), Some("stats_ul_speed"));
        assert_eq!(tag_name(tag_id::PARTFILE), Some("partfile"));
        assert_eq!(tag_name(0x7ABC), None);
    }

    #[test]
    fn connstate_interpretation() {
        let s = ConnState::CONNECTED_ED2K | ConnState::KAD_RUNNING | ConnState::CONNECTED_KAD;
        assert_eq!(s.ed2k_status(), "connected");
        assert_eq!(s.kad_status(), "connected");

        let s = ConnState::CONNECTING_ED2K;
        assert_eq!(s.ed2k_status(), "connecting");
        assert_eq!(s.kad_status(), "not running");

        let s = ConnState::KAD_RUNNING
            | ConnState::CONNECTED_KAD
            | ConnState::KAD_FIREWALLED;
        assert_eq!(s.kad_status(), "firewalled");
    }
}
