use std::collections::HashMap;

use crate::codec::direction::Direction;
use crate::codec::packet::Packet;
use crate::error::Result;

/// One packet-identity record as delivered in the CONNECTION_START
/// payload: a numeric id plus whichever symbolic handles the host knows
/// about for it. A literal `"NULL"` field means absent (spec §4.C).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketInfo {
    pub id: i16,
    pub name: Option<String>,
    pub hash: Option<String>,
    pub structure: Option<String>,
    pub source: Option<String>,
}

fn non_null(raw: String) -> Option<String> {
    if raw == "NULL" {
        None
    } else {
        Some(raw)
    }
}

/// Per-direction multi-key lookup (id | hash | name -> entries). Rebuilt
/// at every CONNECTION_START, cleared at CONNECTION_END.
#[derive(Debug, Default)]
pub struct PacketInfoTable {
    to_client: HashMap<String, Vec<PacketInfo>>,
    to_server: HashMap<String, Vec<PacketInfo>>,
}

impl PacketInfoTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn map_for(&mut self, direction: Direction) -> &mut HashMap<String, Vec<PacketInfo>> {
        match direction {
            Direction::ToClient => &mut self.to_client,
            Direction::ToServer => &mut self.to_server,
        }
    }

    fn map_for_ref(&self, direction: Direction) -> &HashMap<String, Vec<PacketInfo>> {
        match direction {
            Direction::ToClient => &self.to_client,
            Direction::ToServer => &self.to_server,
        }
    }

    /// Inserts `entry` under every non-null key it exposes (id always,
    /// plus hash/name when present). Multiple entries sharing a key are
    /// retained as a list, not overwritten.
    pub fn insert(&mut self, direction: Direction, entry: PacketInfo) {
        let id_key = entry.id.to_string();
        let hash_key = entry.hash.clone();
        let name_key = entry.name.clone();
        let map = self.map_for(direction);

        map.entry(id_key).or_default().push(entry.clone());
        if let Some(hash) = hash_key {
            map.entry(hash).or_default().push(entry.clone());
        }
        if let Some(name) = name_key {
            map.entry(name).or_default().push(entry);
        }
    }

    /// Looks up by any of id (as decimal string), hash, or name.
    pub fn lookup(&self, direction: Direction, key: &str) -> Option<&PacketInfo> {
        self.map_for_ref(direction).get(key)?.first()
    }

    pub fn entries(&self, direction: Direction, key: &str) -> &[PacketInfo] {
        self.map_for_ref(direction)
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every non-null name/hash among all entries registered under the
    /// numeric header id, deduplicated into a set (spec §9 open question
    /// 2: dedup policy during intercept-id expansion).
    pub fn names_and_hashes_for_id(&self, direction: Direction, header_id: i16) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for entry in self.entries(direction, &header_id.to_string()) {
            for candidate in [entry.name.as_deref(), entry.hash.as_deref()] {
                if let Some(candidate) = candidate {
                    if seen.insert(candidate.to_string()) {
                        out.push(candidate.to_string());
                    }
                }
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.to_client.clear();
        self.to_server.clear();
    }

    /// Parses the CONNECTION_START tail: `int32 count` followed by
    /// `count` records of `(int32 id, string hash, string name, string
    /// structure, bool is_outgoing, string source)`.
    pub fn parse_records(packet: &mut Packet) -> Result<Self> {
        let mut table = PacketInfoTable::new();
        let count = packet.read_int_next();

        for _ in 0..count {
            let id = packet.read_int_next() as i16;
            let hash = non_null(packet.read_string());
            let name = non_null(packet.read_string());
            let structure = non_null(packet.read_string());
            let is_outgoing = packet.read_bool_next();
            let source = non_null(packet.read_string());

            let direction = if is_outgoing {
                Direction::ToServer
            } else {
                Direction::ToClient
            };

            table.insert(
                direction,
                PacketInfo {
                    id,
                    name,
                    hash,
                    structure,
                    source,
                },
            );
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(id: i16, name: Option<&str>, hash: Option<&str>) -> PacketInfo {
        PacketInfo {
            id,
            name: name.map(String::from),
            hash: hash.map(String::from),
            structure: None,
            source: None,
        }
    }

    #[test]
    fn multi_key_lookup() {
        let mut table = PacketInfoTable::new();
        table.insert(Direction::ToServer, sample_entry(42, Some("Chat"), Some("abc")));

        for key in ["42", "Chat", "abc"] {
            let found = table.lookup(Direction::ToServer, key).expect("entry");
            assert_eq!(found.id, 42);
        }
    }

    #[test]
    fn directions_are_isolated() {
        let mut table = PacketInfoTable::new();
        table.insert(Direction::ToServer, sample_entry(42, Some("Chat"), None));
        assert!(table.lookup(Direction::ToClient, "Chat").is_none());
    }

    #[test]
    fn names_and_hashes_dedup() {
        let mut table = PacketInfoTable::new();
        table.insert(Direction::ToServer, sample_entry(7, Some("Chat"), Some("abc")));
        table.insert(Direction::ToServer, sample_entry(7, Some("Chat"), Some("def")));
        let mut keys = table.names_and_hashes_for_id(Direction::ToServer, 7);
        keys.sort();
        assert_eq!(keys, vec!["Chat".to_string(), "abc".to_string(), "def".to_string()]);
    }

    #[test]
    fn null_literal_fields_become_absent() {
        let mut table = PacketInfoTable::new();
        table.insert(
            Direction::ToServer,
            PacketInfo {
                id: 1,
                name: non_null("NULL".into()),
                hash: non_null("xyz".into()),
                structure: None,
                source: None,
            },
        );
        assert!(table.lookup(Direction::ToServer, "1").unwrap().name.is_none());
        assert!(table.lookup(Direction::ToServer, "xyz").is_some());
    }

    #[test]
    fn parse_records_from_wire_payload() {
        let mut p = crate::codec::packet::Packet::empty(5);
        p.append_int(1); // count
        p.append_int(2547) // id
            .append_string("abcHash")
            .append_string("Chat")
            .append_string("s")
            .append_bool(true) // is_outgoing -> TO_SERVER
            .append_string("src");
        p.reset();

        let table = PacketInfoTable::parse_records(&mut p).unwrap();
        let found = table.lookup(Direction::ToServer, "Chat").unwrap();
        assert_eq!(found.id, 2547);
        assert_eq!(found.hash.as_deref(), Some("abcHash"));
    }
}
