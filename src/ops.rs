//! High-level daemon operations.
//!
//! Thin callers over [`Connection::communicate`]: each builds a
//! request, hands it to the core, and interprets a known response
//! shape. No pool or socket state leaks in here.

use crate::codes::{ConnState, OpCode, SearchScope, detail, tag_id};
use crate::error::EcError;
use crate::network::Connection;
use crate::packet::Packet;
use crate::tag::{Tag, TagValue};
use crate::tagmap::{TagMap, Value};

/// Every `string` tag value of a response, in wire order.
fn collect_strings(tags: &TagMap) -> Vec<String> {
    tags.get("string")
        .map(|value| {
            value
                .items()
                .filter_map(Value::as_text)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Entries of a repeated group tag (`partfile`, `knownfile`, …).
fn collect_group(tags: &TagMap, group: &str) -> Vec<Value> {
    tags.get(group)
        .map(|value| value.items().cloned().collect())
        .unwrap_or_default()
}

/// The 16-byte hash of a transfer entry: the group tag's own payload,
/// or its `partfile_hash` child for daemons that nest it.
fn entry_hash(entry: &Value) -> Option<[u8; 16]> {
    let (value, children) = entry.as_node()?;
    value
        .as_hash()
        .copied()
        .or_else(|| children.get("partfile_hash").and_then(Value::as_hash).copied())
}

impl Connection {
    // ── Status ───────────────────────────────────────────────────

    /// Full statistics snapshot (speeds, limits, queue and network
    /// counters, nested connection state).
    pub async fn status(&self) -> Result<TagMap, EcError> {
        let (_, tags) = self
            .communicate(Packet::new(OpCode::StatReq, Vec::new()), true)
            .await?;
        Ok(tags)
    }

    /// Statistics at command-line detail level.
    pub async fn status_brief(&self) -> Result<TagMap, EcError> {
        let request = Packet::new(
            OpCode::StatReq,
            vec![Tag::uint(tag_id::DETAIL_LEVEL, detail::CMD)],
        );
        let (_, tags) = self.communicate(request, true).await?;
        Ok(tags)
    }

    /// Network connection state: the decoded state bits plus the
    /// detail subtree (server address, ids, firewall status).
    pub async fn connection_state(&self) -> Result<(ConnState, TagMap), EcError> {
        let request = Packet::new(
            OpCode::GetConnstate,
            vec![Tag::uint(tag_id::DETAIL_LEVEL, detail::CMD)],
        );
        let (_, tags) = self.communicate(request, true).await?;
        match tags.get("connstate") {
            Some(Value::Node { value, children }) => {
                let bits = value
                    .as_uint()
                    .ok_or(EcError::MalformedPacket("connstate payload is not numeric"))?;
                Ok((ConnState::from_bits_truncate(bits as u32), children.clone()))
            }
            Some(Value::UInt(bits)) => {
                Ok((ConnState::from_bits_truncate(*bits as u32), TagMap::new()))
            }
            _ => Err(EcError::MalformedPacket("response carried no connstate")),
        }
    }

    // ── Links and search ─────────────────────────────────────────

    /// Submit a download link. Returns whether the daemon accepted it.
    pub async fn add_link(&self, link: &str) -> Result<bool, EcError> {
        let request = Packet::new(OpCode::AddLink, vec![Tag::text(tag_id::STRING, link)]);
        let (opcode, _) = self.communicate(request, false).await?;
        Ok(opcode == OpCode::Noop)
    }

    /// Start a search. The response carries a `search_status` the
    /// daemon updates as results come in.
    pub async fn search(&self, scope: SearchScope, keywords: &str) -> Result<TagMap, EcError> {
        let request = Packet::new(
            OpCode::SearchStart,
            vec![Tag::with_children(
                tag_id::SEARCH_TYPE,
                TagValue::UInt(scope as u64),
                vec![Tag::text(tag_id::SEARCH_NAME, keywords)],
            )],
        );
        let (_, tags) = self.communicate(request, true).await?;
        Ok(tags)
    }

    /// Results of the last search, one entry per found file.
    pub async fn search_results(&self) -> Result<Vec<Value>, EcError> {
        let (_, tags) = self
            .communicate(Packet::new(OpCode::SearchResults, Vec::new()), true)
            .await?;
        Ok(collect_group(&tags, "searchfile"))
    }

    pub async fn search_progress(&self) -> Result<TagMap, EcError> {
        let (_, tags) = self
            .communicate(Packet::new(OpCode::SearchProgress, Vec::new()), true)
            .await?;
        Ok(tags)
    }

    // ── Queues and shared files ──────────────────────────────────

    /// Download queue, one entry per transfer in progress.
    pub async fn downloads(&self) -> Result<Vec<Value>, EcError> {
        let (_, tags) = self
            .communicate(Packet::new(OpCode::GetDloadQueue, Vec::new()), false)
            .await?;
        Ok(collect_group(&tags, "partfile"))
    }

    /// Upload queue.
    pub async fn uploads(&self) -> Result<Vec<Value>, EcError> {
        let (_, tags) = self
            .communicate(Packet::new(OpCode::GetUloadQueue, Vec::new()), false)
            .await?;
        Ok(collect_group(&tags, "partfile"))
    }

    /// Shared-file list.
    pub async fn shared_files(&self) -> Result<Vec<Value>, EcError> {
        let (_, tags) = self
            .communicate(Packet::new(OpCode::GetSharedFiles, Vec::new()), false)
            .await?;
        Ok(collect_group(&tags, "knownfile"))
    }

    /// Rescan the shared-file directories.
    pub async fn reload_shared(&self) -> Result<(), EcError> {
        self.communicate(Packet::new(OpCode::SharedfilesReload, Vec::new()), true)
            .await
            .map(|_| ())
    }

    /// Reload the IP filter.
    pub async fn reload_ipfilter(&self) -> Result<(), EcError> {
        self.communicate(Packet::new(OpCode::IpfilterReload, Vec::new()), true)
            .await
            .map(|_| ())
    }

    // ── Transfer control ─────────────────────────────────────────

    async fn partfile_op(&self, opcode: OpCode, hashes: &[[u8; 16]]) -> Result<(), EcError> {
        let tags = hashes
            .iter()
            .map(|&hash| Tag::hash(tag_id::PARTFILE, hash))
            .collect();
        self.communicate(Packet::new(opcode, tags), true)
            .await
            .map(|_| ())
    }

    pub async fn pause(&self, hash: [u8; 16]) -> Result<(), EcError> {
        self.partfile_op(OpCode::PartfilePause, &[hash]).await
    }

    pub async fn resume(&self, hash: [u8; 16]) -> Result<(), EcError> {
        self.partfile_op(OpCode::PartfileResume, &[hash]).await
    }

    pub async fn stop(&self, hash: [u8; 16]) -> Result<(), EcError> {
        self.partfile_op(OpCode::PartfileStop, &[hash]).await
    }

    /// Remove a transfer. Returns whether the daemon dropped it.
    pub async fn delete(&self, hash: [u8; 16]) -> Result<bool, EcError> {
        let request = Packet::new(
            OpCode::PartfileDelete,
            vec![Tag::hash(tag_id::PARTFILE, hash)],
        );
        let (opcode, _) = self.communicate(request, false).await?;
        Ok(opcode == OpCode::Noop)
    }

    /// Pause every transfer in the download queue with one request.
    pub async fn pause_all(&self) -> Result<(), EcError> {
        let hashes: Vec<[u8; 16]> =
            self.downloads().await?.iter().filter_map(entry_hash).collect();
        if hashes.is_empty() {
            return Ok(());
        }
        self.partfile_op(OpCode::PartfilePause, &hashes).await
    }

    /// Resume every transfer in the download queue with one request.
    pub async fn resume_all(&self) -> Result<(), EcError> {
        let hashes: Vec<[u8; 16]> =
            self.downloads().await?.iter().filter_map(entry_hash).collect();
        if hashes.is_empty() {
            return Ok(());
        }
        self.partfile_op(OpCode::PartfileResume, &hashes).await
    }

    // ── Networks and servers ─────────────────────────────────────

    /// Connect to every enabled network. Returns success plus the
    /// daemon's progress messages.
    pub async fn connect_networks(&self) -> Result<(bool, Vec<String>), EcError> {
        let (opcode, tags) = self
            .communicate(Packet::new(OpCode::Connect, Vec::new()), false)
            .await?;
        Ok((opcode != OpCode::Failed, collect_strings(&tags)))
    }

    /// Disconnect from all networks.
    pub async fn disconnect_networks(&self) -> Result<(bool, Vec<String>), EcError> {
        let (opcode, tags) = self
            .communicate(Packet::new(OpCode::Disconnect, Vec::new()), true)
            .await?;
        Ok((opcode == OpCode::Strings, collect_strings(&tags)))
    }

    pub async fn connect_ed2k(&self) -> Result<(), EcError> {
        self.communicate(Packet::new(OpCode::ServerConnect, Vec::new()), true)
            .await
            .map(|_| ())
    }

    pub async fn disconnect_ed2k(&self) -> Result<(), EcError> {
        self.communicate(Packet::new(OpCode::ServerDisconnect, Vec::new()), true)
            .await
            .map(|_| ())
    }

    pub async fn connect_kad(&self) -> Result<(), EcError> {
        self.communicate(Packet::new(OpCode::KadStart, Vec::new()), true)
            .await
            .map(|_| ())
    }

    pub async fn disconnect_kad(&self) -> Result<(), EcError> {
        self.communicate(Packet::new(OpCode::KadStop, Vec::new()), true)
            .await
            .map(|_| ())
    }

    /// Known eD2k servers.
    pub async fn server_list(&self) -> Result<Vec<Value>, EcError> {
        let (_, tags) = self
            .communicate(Packet::new(OpCode::GetServerList, Vec::new()), false)
            .await?;
        Ok(collect_group(&tags, "server"))
    }

    /// Fetch fresh server/node lists from the given URLs.
    pub async fn update_servers(
        &self,
        ed2k_url: Option<&str>,
        kad_url: Option<&str>,
    ) -> Result<(), EcError> {
        if let Some(url) = ed2k_url {
            let request = Packet::new(
                OpCode::ServerUpdateFromUrl,
                vec![Tag::text(tag_id::SERVERS_UPDATE_URL, url)],
            );
            self.communicate(request, true).await?;
        }
        if let Some(url) = kad_url {
            let request = Packet::new(
                OpCode::KadUpdateFromUrl,
                vec![Tag::text(tag_id::KADEMLIA_UPDATE_URL, url)],
            );
            self.communicate(request, true).await?;
        }
        Ok(())
    }

    // ── Preferences and shutdown ─────────────────────────────────

    /// Point the daemon's incoming directory somewhere else.
    pub async fn set_incoming_directory(&self, path: &str) -> Result<(), EcError> {
        let request = Packet::new(
            OpCode::SetPreferences,
            vec![Tag::text(tag_id::DIRECTORIES_INCOMING, path)],
        );
        self.communicate(request, true).await.map(|_| ())
    }

    /// Ask the daemon to shut down. Send-only: the daemon does not
    /// answer this one.
    pub async fn shutdown(&self) -> Result<(), EcError> {
        self.send(&Packet::new(OpCode::Shutdown, Vec::new())).await
    }
}
