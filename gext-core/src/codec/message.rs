use crate::codec::direction::Direction;
use crate::codec::packet::Packet;
use crate::error::{GextError, Result};

/// Wraps a packet with the direction it travels, the host's queue index,
/// and whether it has been blocked from reaching its destination. This is
/// the unit the manipulation pipeline works on (spec §4.B).
#[derive(Debug, Clone)]
pub struct Message {
    pub packet: Packet,
    pub direction: Direction,
    pub index: i32,
    pub blocked: bool,
}

impl Message {
    pub fn new(packet: Packet, direction: Direction, index: i32, blocked: bool) -> Self {
        Message {
            packet,
            direction,
            index,
            blocked,
        }
    }

    /// Independent copy (the packet buffer is deep-cloned) handed to an
    /// async-mode worker, so it can read and mutate freely without racing
    /// the manipulator, which keeps iterating the original. The deep copy
    /// over a genuinely shared buffer is the conservative choice spec §4.D
    /// calls for.
    pub fn share(&self) -> Self {
        Message {
            packet: self.packet.clone(),
            direction: self.direction,
            index: self.index,
            blocked: self.blocked,
        }
    }

    /// Host-text round-trip: `"<blocked>\t<index>\t<TOCLIENT|TOSERVER>\t<packet-text>"`.
    pub fn to_host_text(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            if self.blocked { '1' } else { '0' },
            self.index,
            self.direction.as_host_text(),
            self.packet.to_host_text()
        )
    }

    /// Splits on TAB with a maximum of 3 splits so the packet text (the
    /// 4th field) may itself contain tabs.
    pub fn from_host_text(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.splitn(4, '\t').collect();
        let [blocked, index, direction, packet_text] = parts.as_slice() else {
            return Err(GextError::Codec(format!(
                "expected 4 tab-separated fields in message envelope, got {}",
                parts.len()
            )));
        };

        let blocked = *blocked == "1";
        let index: i32 = index
            .parse()
            .map_err(|_| GextError::Codec(format!("invalid message index {index:?}")))?;
        let direction = Direction::from_host_text(direction);
        let packet = Packet::from_host_text(packet_text)?;

        Ok(Message {
            packet,
            direction,
            index,
            blocked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let mut p = crate::codec::packet::Packet::empty(100);
        p.append_string("hi\twith\ttabs");
        let msg = Message::new(p, Direction::ToServer, 5, false);
        let text = msg.to_host_text();
        let back = Message::from_host_text(&text).unwrap();
        assert_eq!(back.blocked, msg.blocked);
        assert_eq!(back.index, msg.index);
        assert_eq!(back.direction, msg.direction);
        assert_eq!(back.packet.raw(), msg.packet.raw());
    }

    #[test]
    fn direction_maps_unknown_token_to_to_server() {
        assert_eq!(Direction::from_host_text("TOCLIENT"), Direction::ToClient);
        assert_eq!(Direction::from_host_text("TOSERVER"), Direction::ToServer);
        assert_eq!(Direction::from_host_text("garbage"), Direction::ToServer);
    }
}
