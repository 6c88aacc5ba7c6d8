pub mod broker;
pub mod kind;

pub use broker::{BrokerResponse, RequestBroker};
pub use kind::{IncomingMessageKind, OutgoingMessageKind};

use crate::codec::direction::Direction;
use crate::codec::message::Message;
use crate::codec::packet::{Packet, StringEncoding};
use crate::error::{GextError, Result};
use crate::extension_info::ExtensionInfo;
use crate::registry::info::PacketInfoTable;

/// Parsed CONNECTION_START payload: the five scalar fields plus the
/// packet-info records that follow them (spec §4.C, §4.F).
pub struct ConnectionStart {
    pub host: String,
    pub port: i32,
    pub hotel_version: String,
    pub client_identifier: String,
    pub client_type: String,
    pub info_table: PacketInfoTable,
}

/// Decodes the `"sisss"` scalar header plus the packet-info record list
/// that follows it.
pub fn parse_connection_start(packet: &mut Packet) -> Result<ConnectionStart> {
    let host = packet.read_string();
    let port = packet.read_int_next();
    let hotel_version = packet.read_string();
    let client_identifier = packet.read_string();
    let client_type = packet.read_string();
    let info_table = PacketInfoTable::parse_records(packet)?;

    Ok(ConnectionStart {
        host,
        port,
        hotel_version,
        client_identifier,
        client_type,
        info_table,
    })
}

/// Decodes the FLAGS_CHECK payload: `int32 n, n x string`.
pub fn parse_flags_check(packet: &mut Packet) -> Vec<String> {
    let count = packet.read_int_next();
    (0..count).map(|_| packet.read_string()).collect()
}

/// Decodes PACKET_TO_STRING_RESPONSE: two 4-byte-head strings, `text` in
/// ISO-8859-1 and `expression` in UTF-8.
pub fn parse_packet_to_string_response(packet: &mut Packet) -> (String, String) {
    let text = packet.read_string_next(4, StringEncoding::Iso8859_1);
    let expression = packet.read_string_next(4, StringEncoding::Utf8);
    (text, expression)
}

/// Decodes STRING_TO_PACKET_RESPONSE: one 4-byte-head ISO-8859-1 string
/// holding the packet's host-text form.
pub fn parse_string_to_packet_response(packet: &mut Packet) -> Result<Packet> {
    let text = packet.read_string_next(4, StringEncoding::Iso8859_1);
    Packet::from_host_text(&text)
}

/// Decodes PACKET_INTERCEPT's inner payload (a 4-byte-head ISO-8859-1
/// string holding the message envelope's host-text form).
pub fn parse_packet_intercept(packet: &mut Packet) -> Result<Message> {
    let text = packet.read_string_next(4, StringEncoding::Iso8859_1);
    Message::from_host_text(&text)
}

/// Builds the EXTENSION_INFO response: 8 strings and 2 bools interleaved
/// exactly as spec §6 lists them.
pub fn build_extension_info(info: &ExtensionInfo) -> Packet {
    let mut packet = Packet::empty(OutgoingMessageKind::ExtensionInfo.header_id());
    packet
        .append_string(&info.title)
        .append_string(&info.author)
        .append_string(&info.version)
        .append_string(&info.description)
        .append_bool(info.use_click_trigger)
        .append_bool(info.file.is_some())
        .append_string(info.file.as_deref().unwrap_or(""))
        .append_string(info.cookie.as_deref().unwrap_or(""))
        .append_bool(info.can_leave)
        .append_bool(info.can_delete);
    packet
}

/// Builds the MANIPULATED_PACKET response carrying `message`'s host-text
/// form in a single 4-byte-head ISO-8859-1 string.
pub fn build_manipulated_packet(message: &Message) -> Packet {
    let mut packet = Packet::empty(OutgoingMessageKind::ManipulatedPacket.header_id());
    packet.append_host_string(&message.to_host_text(), StringEncoding::Iso8859_1);
    packet
}

/// Builds the SEND_MESSAGE wrapper: `bool is_to_server, int32 len, raw payload`.
pub fn build_send_message(direction: Direction, payload: &[u8]) -> Packet {
    let mut packet = Packet::empty(OutgoingMessageKind::SendMessage.header_id());
    packet
        .append_bool(direction == Direction::ToServer)
        .append_int(payload.len() as i32)
        .append_bytes(payload);
    packet
}

pub fn build_request_flags() -> Packet {
    Packet::empty(OutgoingMessageKind::RequestFlags.header_id())
}

pub fn build_packet_to_string_request(packet: &Packet) -> Packet {
    let mut request = Packet::empty(OutgoingMessageKind::PacketToStringRequest.header_id());
    request.append_host_string(&packet.to_host_text(), StringEncoding::Iso8859_1);
    request
}

pub fn build_string_to_packet_request(human_repr: &str) -> Packet {
    let mut request = Packet::empty(OutgoingMessageKind::StringToPacketRequest.header_id());
    request.append_host_string(human_repr, StringEncoding::Utf8);
    request
}

/// Builds `"[<color>]<prefix><text>"` for EXTENSION_CONSOLE_LOG.
pub fn build_console_log(color: &str, prefix: &str, text: &str) -> Packet {
    let body = format!("[{color}]{prefix}{text}");
    Packet::new(
        crate::codec::packet::HeaderId::Numeric(OutgoingMessageKind::ExtensionConsoleLog.header_id()),
        [crate::codec::packet::Value::from(body)],
    )
}

/// Reads the trailing `await_connect_packet` bool from an INIT packet.
pub fn parse_init(packet: &mut Packet) -> bool {
    packet.read_bool_next()
}

pub fn require_kind(id: i16) -> Result<IncomingMessageKind> {
    IncomingMessageKind::from_header_id(id)
        .ok_or_else(|| GextError::Framing(format!("unknown host message id {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_info_field_order_matches_wire_contract() {
        let info = ExtensionInfo::new("T", "A", "V", "D");
        let mut packet = build_extension_info(&info);
        packet.reset();
        assert_eq!(packet.read_string(), "T");
        assert_eq!(packet.read_string(), "A");
        assert_eq!(packet.read_string(), "V");
        assert_eq!(packet.read_string(), "D");
        assert!(!packet.read_bool_next()); // use_click_trigger
        assert!(!packet.read_bool_next()); // has_file
        assert_eq!(packet.read_string(), ""); // file
        assert_eq!(packet.read_string(), ""); // cookie
        assert!(packet.read_bool_next()); // can_leave
        assert!(packet.read_bool_next()); // can_delete
    }

    #[test]
    fn send_message_wrapper_layout() {
        let packet = build_send_message(Direction::ToServer, &[1, 2, 3]);
        let mut p = packet;
        p.reset();
        assert!(p.read_bool_next());
        assert_eq!(p.read_int_next(), 3);
        assert_eq!(p.read_bytes(3), vec![1, 2, 3]);
    }

    #[test]
    fn flags_check_round_trip() {
        let mut packet = Packet::empty(4);
        packet.append_int(2).append_string("alpha").append_string("beta");
        packet.reset();
        assert_eq!(parse_flags_check(&mut packet), vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn connection_start_round_trip() {
        let mut packet = Packet::empty(5);
        packet
            .append_string("hotel.example")
            .append_int(38101)
            .append_string("2024.1")
            .append_string("client-id")
            .append_string("UNITY");
        packet.append_int(1); // one record
        packet
            .append_int(2547)
            .append_string("abcHash")
            .append_string("Chat")
            .append_string("struct")
            .append_bool(true)
            .append_string("source");
        packet.reset();

        let parsed = parse_connection_start(&mut packet).unwrap();
        assert_eq!(parsed.host, "hotel.example");
        assert_eq!(parsed.port, 38101);
        assert_eq!(parsed.client_type, "UNITY");
        let entry = parsed.info_table.lookup(Direction::ToServer, "Chat").unwrap();
        assert_eq!(entry.id, 2547);
    }

    #[test]
    fn console_log_format() {
        let mut packet = build_console_log("green", "ext --> ", "ready");
        packet.reset();
        assert_eq!(packet.read_string(), "[green]ext --> ready");
    }
}
