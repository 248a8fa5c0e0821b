//! Decoded-response model.
//!
//! A response body is a flat list of tags; [`TagMap::from_tags`]
//! assembles it into a queryable structure: ids are resolved to display
//! names where the vocabulary knows them, child-bearing tags become
//! nested maps, and duplicate names at one level collect into an
//! ordered list. [`PrefixView`] projects a family of sibling keys that
//! share a name prefix (`stats_ul_speed`, `stats_dl_speed`, … under
//! `stats`) without copying anything out of the owning map.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddrV4;

use crate::codes::tag_name;
use crate::tag::{Tag, TagValue};

// ── Keys ─────────────────────────────────────────────────────────

/// Key of a decoded entry: the display name when the vocabulary knows
/// the id, the raw numeric id otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKey {
    Name(Cow<'static, str>),
    Id(u16),
}

impl TagKey {
    fn resolve(id: u16) -> TagKey {
        match tag_name(id) {
            Some(name) => TagKey::Name(Cow::Borrowed(name)),
            None => TagKey::Id(id),
        }
    }

    /// The name, if this key has one.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            TagKey::Name(name) => Some(name),
            TagKey::Id(_) => None,
        }
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagKey::Name(name) => f.write_str(name),
            TagKey::Id(id) => write!(f, "{id}"),
        }
    }
}

// ── Values ───────────────────────────────────────────────────────

/// A decoded value: one of the scalar payload kinds, a subtree for a
/// tag that carried children, or an encounter-ordered collection built
/// from duplicate keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    UInt(u64),
    Text(String),
    Hash16([u8; 16]),
    Ipv4(SocketAddrV4),
    Bytes(Vec<u8>),
    /// A tag that carried children: its own payload plus the subtree.
    Node { value: Box<Value>, children: TagMap },
    /// Collection of values that shared a key at the same level.
    Many(Vec<Value>),
}

impl Value {
    fn from_tag(tag: &Tag) -> Value {
        let scalar = Value::from_scalar(&tag.value);
        if tag.children.is_empty() {
            scalar
        } else {
            Value::Node {
                value: Box::new(scalar),
                children: TagMap::from_tags(&tag.children),
            }
        }
    }

    fn from_scalar(value: &TagValue) -> Value {
        match value {
            TagValue::UInt(v) => Value::UInt(*v),
            TagValue::Text(s) => Value::Text(s.clone()),
            TagValue::Hash16(h) => Value::Hash16(*h),
            TagValue::Ipv4(a) => Value::Ipv4(*a),
            TagValue::Bytes(b) => Value::Bytes(b.clone()),
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&[u8; 16]> {
        match self {
            Value::Hash16(h) => Some(h),
            _ => None,
        }
    }

    /// The payload and subtree of a child-bearing tag.
    pub fn as_node(&self) -> Option<(&Value, &TagMap)> {
        match self {
            Value::Node { value, children } => Some((value, children)),
            _ => None,
        }
    }

    /// Iterate the value as a collection: a `Many` yields its elements,
    /// anything else yields itself once.
    pub fn items(&self) -> std::slice::Iter<'_, Value> {
        match self {
            Value::Many(values) => values.iter(),
            other => std::slice::from_ref(other).iter(),
        }
    }
}

// ── TagMap ───────────────────────────────────────────────────────

/// Order-preserving map of decoded response entries.
///
/// Lookups are linear; responses are small and encounter order is part
/// of the contract (duplicate handling, string lists).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMap {
    entries: Vec<(TagKey, Value)>,
    /// Positive "some key starts with this" results, retired when a
    /// matching key is removed.
    prefix_hints: HashSet<String>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a decoded tag list.
    ///
    /// Duplicate resolved keys at one level collect into a
    /// [`Value::Many`] preserving encounter order.
    pub fn from_tags(tags: &[Tag]) -> TagMap {
        let mut map = TagMap::new();
        for tag in tags {
            map.push(TagKey::resolve(tag.id), Value::from_tag(tag));
        }
        map
    }

    fn push(&mut self, key: TagKey, value: Value) {
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(index) => match &mut self.entries[index].1 {
                Value::Many(existing) => existing.push(value),
                existing => {
                    let prior = std::mem::replace(existing, Value::UInt(0));
                    *existing = Value::Many(vec![prior, value]);
                }
            },
            None => self.entries.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TagKey, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &TagKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Whether any key resolved to a display name. A map of purely
    /// numeric keys is the degraded form: name lookups and prefix views
    /// have nothing to bind to.
    pub fn has_names(&self) -> bool {
        self.entries.iter().any(|(k, _)| matches!(k, TagKey::Name(_)))
    }

    /// Look up by display name. Duplicates were already collected, so a
    /// name maps to at most one entry.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_name() == Some(name))
            .map(|(_, v)| v)
    }

    /// Look up by raw numeric id (keys the vocabulary did not resolve).
    pub fn get_id(&self, id: u16) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, TagKey::Id(i) if *i == id))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace a named entry.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self
            .entries
            .iter()
            .position(|(k, _)| k.as_name() == Some(name.as_str()))
        {
            Some(index) => self.entries[index].1 = value,
            None => self.entries.push((TagKey::Name(Cow::Owned(name)), value)),
        }
    }

    /// Remove a named entry, retiring every cached prefix hint the key
    /// falls under.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self
            .entries
            .iter()
            .position(|(k, _)| k.as_name() == Some(name))?;
        let (_, value) = self.entries.remove(index);
        self.prefix_hints.retain(|p| !name.starts_with(p.as_str()));
        Some(value)
    }

    /// Whether any key starts with `prefix` plus the separator.
    /// Positive answers are cached; removal retires the cache.
    pub fn has_prefix(&mut self, prefix: &str) -> bool {
        let wanted = format!("{prefix}_");
        if self.prefix_hints.contains(&wanted) {
            return true;
        }
        let found = self.entries.iter().any(|(k, _)| {
            k.as_name().is_some_and(|name| name.starts_with(&wanted))
        });
        if found {
            self.prefix_hints.insert(wanted);
        }
        found
    }

    /// A live, read-through projection of the keys under `prefix`.
    ///
    /// Returns `None` when no key carries the prefix — including the
    /// degraded all-numeric form.
    pub fn prefix_view(&mut self, prefix: &str) -> Option<PrefixView<'_>> {
        if !self.has_prefix(prefix) {
            return None;
        }
        let prefix = format!("{prefix}_");
        Some(PrefixView { map: self, prefix })
    }
}

// ── PrefixView ───────────────────────────────────────────────────

/// Read-through/write-through façade over the keys of the owning
/// [`TagMap`] that share a name prefix. Nothing is copied: reads
/// delegate to the parent, writes land in the parent.
pub struct PrefixView<'a> {
    map: &'a mut TagMap,
    /// Prefix including the trailing separator.
    prefix: String,
}

impl PrefixView<'_> {
    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Iterate `(stripped_key, value)` pairs in parent order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map.entries.iter().filter_map(|(k, v)| {
            k.as_name()
                .and_then(|name| name.strip_prefix(self.prefix.as_str()))
                .map(|stripped| (stripped, v))
        })
    }

    /// Keys with the prefix stripped.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(&self.full_key(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Write through to the parent under the prefixed key.
    pub fn set(&mut self, key: &str, value: Value) {
        let full = self.full_key(key);
        self.map.set(full, value);
    }

    /// Remove the prefixed key from the parent.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let full = self.full_key(key);
        self.map.remove(&full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::tag_id;

    fn stats_tags() -> Vec<Tag> {
        vec![
            Tag::uint(tag_id::STATS_UL_SPEED, 11_000),
            Tag::uint(tag_id::STATS_DL_SPEED, 250_000),
            Tag::uint(tag_id::STATS_ED2K_USERS, 3_270_680),
        ]
    }

    #[test]
    fn names_resolve_and_order_is_kept() {
        let map = TagMap::from_tags(&stats_tags());
        assert!(map.has_names());
        assert_eq!(map.get("stats_ul_speed").unwrap().as_uint(), Some(11_000));
        let keys: Vec<String> = map.keys().map(|k| k.to_string()).collect();
        assert_eq!(
            keys,
            ["stats_ul_speed", "stats_dl_speed", "stats_ed2k_users"]
        );
    }

    #[test]
    fn duplicate_names_collect_in_order() {
        let tags = vec![
            Tag::text(tag_id::STRING, "Connecting to eD2k..."),
            Tag::text(tag_id::STRING, "Connecting to Kad..."),
        ];
        let map = TagMap::from_tags(&tags);
        let value = map.get("string").unwrap();
        let texts: Vec<&str> = value.items().filter_map(Value::as_text).collect();
        assert_eq!(texts, ["Connecting to eD2k...", "Connecting to Kad..."]);
    }

    #[test]
    fn triple_duplicate_appends_to_existing_collection() {
        let tags = vec![
            Tag::uint(tag_id::STRING, 1),
            Tag::uint(tag_id::STRING, 2),
            Tag::uint(tag_id::STRING, 3),
        ];
        let map = TagMap::from_tags(&tags);
        let values: Vec<u64> = map
            .get("string")
            .unwrap()
            .items()
            .filter_map(Value::as_uint)
            .collect();
        assert_eq!(values, [1, 2, 3]);
    }

    #[test]
    fn child_bearing_tag_becomes_node() {
        let tags = vec![Tag::with_children(
            tag_id::CONNSTATE,
            TagValue::UInt(0x15),
            vec![
                Tag::uint(tag_id::CLIENT_ID, 16_777_217),
                Tag::uint(tag_id::ED2K_ID, 42),
            ],
        )];
        let map = TagMap::from_tags(&tags);
        let (value, children) = map.get("connstate").unwrap().as_node().unwrap();
        assert_eq!(value.as_uint(), Some(0x15));
        assert_eq!(children.get("client_id").unwrap().as_uint(), Some(16_777_217));
    }

    #[test]
    fn unknown_ids_stay_numeric_and_degrade() {
        let tags = vec![Tag::uint(0x7000, 1), Tag::uint(0x7001, 2)];
        let map = TagMap::from_tags(&tags);
        assert!(!map.has_names());
        assert_eq!(map.get_id(0x7000).unwrap().as_uint(), Some(1));
        assert_eq!(map.get("stats_ul_speed"), None);
    }

    #[test]
    fn prefix_view_reads_with_stripped_keys() {
        let mut map = TagMap::from_tags(&stats_tags());
        let view = map.prefix_view("stats").unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.get("ul_speed").unwrap().as_uint(), Some(11_000));
        assert!(view.contains("dl_speed"));
        let keys: Vec<&str> = view.keys().collect();
        assert_eq!(keys, ["ul_speed", "dl_speed", "ed2k_users"]);
    }

    #[test]
    fn prefix_view_requires_a_match() {
        let mut map = TagMap::from_tags(&stats_tags());
        assert!(map.prefix_view("partfile").is_none());

        let mut numeric = TagMap::from_tags(&[Tag::uint(0x7000, 1)]);
        assert!(numeric.prefix_view("stats").is_none());
    }

    #[test]
    fn prefix_view_writes_through() {
        let mut map = TagMap::from_tags(&stats_tags());
        {
            let mut view = map.prefix_view("stats").unwrap();
            view.set("ul_speed", Value::UInt(0));
            view.set("banned_count", Value::UInt(3));
        }
        assert_eq!(map.get("stats_ul_speed").unwrap().as_uint(), Some(0));
        assert_eq!(map.get("stats_banned_count").unwrap().as_uint(), Some(3));
    }

    #[test]
    fn removing_last_prefixed_key_retires_the_hint() {
        let mut map = TagMap::from_tags(&[
            Tag::uint(tag_id::STATS_UL_SPEED, 1),
            Tag::uint(tag_id::DETAIL_LEVEL, 0),
        ]);
        // Prime the hint cache.
        assert!(map.has_prefix("stats"));

        {
            let mut view = map.prefix_view("stats").unwrap();
            assert_eq!(view.remove("ul_speed").unwrap().as_uint(), Some(1));
            assert!(view.is_empty());
        }
        // With the hint retired, the prefix no longer reports present.
        assert!(!map.has_prefix("stats"));
        assert!(map.prefix_view("stats").is_none());
        // Unrelated keys are untouched.
        assert!(map.contains("detail_level"));
    }
}
