use crate::codec::direction::Direction;
use crate::error::{GextError, Result};
use crate::registry::info::PacketInfoTable;

/// Header identifier a packet is addressed under: either the numeric
/// header id G-Earth uses on the wire, or a symbolic name/hash awaiting
/// resolution against a [`PacketInfoTable`] at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderId {
    Numeric(i16),
    Symbolic(String),
}

/// A value that can be appended to a [`Packet`] by [`Packet::append`].
/// Stands in for the source's runtime type dispatch (`type(obj) is str`
/// etc.) without reflection: callers build a `Vec<Value>` or call the
/// typed `append_*` methods directly.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Int(i32),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

const SENTINEL_ID: i16 = -1; // 0xFFFF as a signed i16

/// A length-prefixed, header-identified binary buffer: 4-byte big-endian
/// length, 2-byte signed header id, payload. See spec §4.A.
#[derive(Debug, Clone)]
pub struct Packet {
    buf: Vec<u8>,
    read_cursor: usize,
    edited: bool,
    deferred_id: Option<String>,
}

impl Packet {
    /// Builds a fresh outgoing packet. `id` numeric selects the header
    /// directly; symbolic defers resolution to [`Packet::fill_id`].
    pub fn new(id: HeaderId, values: impl IntoIterator<Item = Value>) -> Self {
        let deferred_id = match &id {
            HeaderId::Numeric(_) => None,
            HeaderId::Symbolic(name) => Some(name.clone()),
        };

        let mut packet = Packet {
            buf: vec![0x00, 0x00, 0x00, 0x02, 0xFF, 0xFF],
            read_cursor: 6,
            edited: false,
            deferred_id,
        };

        if let HeaderId::Numeric(n) = id {
            packet.replace_short(4, n);
        }

        for value in values {
            match value {
                Value::Str(s) => packet.append_string(&s),
                Value::Int(i) => packet.append_int(i),
                Value::Bool(b) => packet.append_bool(b),
                Value::Bytes(b) => packet.append_bytes(&b),
            };
        }

        packet.edited = false;
        packet
    }

    /// Convenience constructor for a packet with no payload, numeric id.
    pub fn empty(id: i16) -> Self {
        Packet::new(HeaderId::Numeric(id), [])
    }

    /// Wraps raw bytes already containing the 4-byte length prefix and
    /// 2-byte header id.
    pub fn from_bytes(raw: Vec<u8>) -> Self {
        Packet {
            buf: raw,
            read_cursor: 6,
            edited: false,
            deferred_id: None,
        }
    }

    /// Parses the host-text form used on the G-Earth wire: a leading
    /// `'0'`/`'1'` edited bit followed by the buffer reinterpreted through
    /// ISO-8859-1 (a lossless byte<->char mapping for bytes 0..=255).
    pub fn from_host_text(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let bit = chars.next().ok_or_else(|| {
            GextError::Codec("host-text packet form missing edited bit".into())
        })?;
        let edited = match bit {
            '0' => false,
            '1' => true,
            other => {
                return Err(GextError::Codec(format!(
                    "host-text packet form has invalid edited bit {other:?}"
                )))
            }
        };

        let buf = iso8859_1_decode(chars.as_str());
        Ok(Packet {
            buf,
            read_cursor: 6,
            edited,
            deferred_id: None,
        })
    }

    /// Host-text round-trip counterpart of [`Packet::from_host_text`].
    pub fn to_host_text(&self) -> String {
        let mut out = String::with_capacity(self.buf.len() + 1);
        out.push(if self.edited { '1' } else { '0' });
        out.push_str(&iso8859_1_encode(&self.buf));
        out
    }

    pub fn edited(&self) -> bool {
        self.edited
    }

    pub fn deferred_id(&self) -> Option<&str> {
        self.deferred_id.as_deref()
    }

    pub fn is_incomplete(&self) -> bool {
        self.deferred_id.is_some()
    }

    pub fn raw(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Resets the read cursor to the start of the payload (byte 6).
    pub fn reset(&mut self) {
        self.read_cursor = 6;
    }

    pub fn header_id(&self) -> i16 {
        self.read_short(Some(4))
    }

    /// Declared payload length (bytes 0..4), independent of `buf.len()`.
    pub fn length(&self) -> i32 {
        self.read_int(Some(0))
    }

    pub fn is_corrupted(&self) -> bool {
        self.buf.len() < 6 || self.length() as i64 != (self.buf.len() as i64 - 4)
    }

    fn fix_length(&mut self) {
        let len = (self.buf.len() as i32 - 4).to_be_bytes();
        self.buf[0..4].copy_from_slice(&len);
    }

    // --- reads ---

    fn take_cursor(&mut self, width: usize) -> usize {
        let idx = self.read_cursor;
        self.read_cursor += width;
        idx
    }

    pub fn read_int(&self, index: Option<usize>) -> i32 {
        let idx = index.unwrap_or(self.read_cursor);
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[idx..idx + 4]);
        i32::from_be_bytes(bytes)
    }

    /// Advancing variant of [`Packet::read_int`].
    pub fn read_int_next(&mut self) -> i32 {
        let idx = self.take_cursor(4);
        self.read_int(Some(idx))
    }

    pub fn read_short(&self, index: Option<usize>) -> i16 {
        let idx = index.unwrap_or(self.read_cursor);
        let mut bytes = [0u8; 2];
        bytes.copy_from_slice(&self.buf[idx..idx + 2]);
        i16::from_be_bytes(bytes)
    }

    pub fn read_short_next(&mut self) -> i16 {
        let idx = self.take_cursor(2);
        self.read_short(Some(idx))
    }

    pub fn read_long(&self, index: Option<usize>) -> i64 {
        let idx = index.unwrap_or(self.read_cursor);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.buf[idx..idx + 8]);
        i64::from_be_bytes(bytes)
    }

    pub fn read_long_next(&mut self) -> i64 {
        let idx = self.take_cursor(8);
        self.read_long(Some(idx))
    }

    pub fn read_byte(&self, index: Option<usize>) -> u8 {
        let idx = index.unwrap_or(self.read_cursor);
        self.buf[idx]
    }

    pub fn read_byte_next(&mut self) -> u8 {
        let idx = self.take_cursor(1);
        self.read_byte(Some(idx))
    }

    pub fn read_bool(&self, index: Option<usize>) -> bool {
        self.read_byte(index) != 0
    }

    pub fn read_bool_next(&mut self) -> bool {
        self.read_byte_next() != 0
    }

    /// Reads a head-byte length-prefixed string. `head` is the length
    /// prefix width (2 bytes by default, 4 for the host-envelope strings).
    pub fn read_string_at(&self, index: usize, head: usize, encoding: StringEncoding) -> String {
        let len = read_uint_be(&self.buf[index..index + head]) as usize;
        decode(&self.buf[index + head..index + head + len], encoding)
    }

    pub fn read_string_next(&mut self, head: usize, encoding: StringEncoding) -> String {
        let idx = self.read_cursor;
        let len = read_uint_be(&self.buf[idx..idx + head]) as usize;
        self.read_cursor += head + len;
        decode(&self.buf[idx + head..idx + head + len], encoding)
    }

    /// Default-encoding (2-byte head, ISO-8859-1) advancing string read,
    /// matching `read_string()` in the source.
    pub fn read_string(&mut self) -> String {
        self.read_string_next(2, StringEncoding::Iso8859_1)
    }

    pub fn read_bytes(&mut self, length: usize) -> Vec<u8> {
        let idx = self.take_cursor(length);
        self.buf[idx..idx + length].to_vec()
    }

    /// Batch reader driven by a format string: `i`=int32, `s`=string,
    /// `b`=byte, `B`=bool, `u`=int16, `l`=int64. Mirrors `HPacket.read`.
    pub fn read_format(&mut self, format: &str) -> Result<Vec<ReadValue>> {
        format
            .chars()
            .map(|c| match c {
                'i' => Ok(ReadValue::Int(self.read_int_next())),
                's' => Ok(ReadValue::Str(self.read_string())),
                'b' => Ok(ReadValue::Byte(self.read_byte_next())),
                'B' => Ok(ReadValue::Bool(self.read_bool_next())),
                'u' => Ok(ReadValue::Short(self.read_short_next())),
                'l' => Ok(ReadValue::Long(self.read_long_next())),
                other => Err(GextError::Codec(format!(
                    "unknown read() format specifier {other:?}"
                ))),
            })
            .collect()
    }

    // --- replace ---

    pub fn replace_int(&mut self, index: usize, value: i32) {
        self.buf[index..index + 4].copy_from_slice(&value.to_be_bytes());
        self.edited = true;
    }

    pub fn replace_short(&mut self, index: usize, value: i16) {
        self.buf[index..index + 2].copy_from_slice(&value.to_be_bytes());
        self.edited = true;
    }

    pub fn replace_long(&mut self, index: usize, value: i64) {
        self.buf[index..index + 8].copy_from_slice(&value.to_be_bytes());
        self.edited = true;
    }

    pub fn replace_bool(&mut self, index: usize, value: bool) {
        self.buf[index] = value as u8;
        self.edited = true;
    }

    /// Rebuilds the buffer around the new string: splices before/after
    /// the old string (including its length prefix) and fixes the
    /// packet length. `encoding` is the encoding of `value`; the old
    /// string's length prefix is always read as 2-byte unsigned.
    pub fn replace_string(&mut self, index: usize, value: &str, encoding: StringEncoding) {
        let old_len = read_uint_be(&self.buf[index..index + 2]) as usize;
        let mut rebuilt = Vec::with_capacity(self.buf.len());
        rebuilt.extend_from_slice(&self.buf[0..index]);

        let encoded = encode(value, encoding);
        rebuilt.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
        rebuilt.extend_from_slice(&encoded);

        rebuilt.extend_from_slice(&self.buf[index + 2 + old_len..]);
        self.buf = rebuilt;
        self.fix_length();
        self.edited = true;
    }

    // --- append ---

    pub fn append_int(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self.fix_length();
        self.edited = true;
        self
    }

    pub fn append_short(&mut self, value: i16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self.fix_length();
        self.edited = true;
        self
    }

    pub fn append_long(&mut self, value: i64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self.fix_length();
        self.edited = true;
        self
    }

    pub fn append_byte(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self.fix_length();
        self.edited = true;
        self
    }

    pub fn append_bool(&mut self, value: bool) -> &mut Self {
        self.append_byte(value as u8)
    }

    pub fn append_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(value);
        self.fix_length();
        self.edited = true;
        self
    }

    /// Appends a head-byte length-prefixed string. Default head is 2
    /// bytes unsigned big-endian, default encoding UTF-8.
    pub fn append_string_with(
        &mut self,
        value: &str,
        head: usize,
        encoding: StringEncoding,
    ) -> &mut Self {
        let encoded = encode(value, encoding);
        self.buf
            .extend_from_slice(&write_uint_be(encoded.len() as u64, head));
        self.buf.extend_from_slice(&encoded);
        self.fix_length();
        self.edited = true;
        self
    }

    pub fn append_string(&mut self, value: &str) -> &mut Self {
        self.append_string_with(value, 2, StringEncoding::Utf8)
    }

    /// Appends the host-envelope form of this message's string using a
    /// 4-byte head and the given encoding — used for MANIPULATED_PACKET,
    /// PACKET_TO_STRING_REQUEST and STRING_TO_PACKET_REQUEST bodies.
    pub fn append_host_string(&mut self, value: &str, encoding: StringEncoding) -> &mut Self {
        self.append_string_with(value, 4, encoding)
    }

    /// Resolves a deferred symbolic identifier against `table`. Returns
    /// `true` if the header is now numeric (either already was, or was
    /// just resolved). Preserves `edited` across the substitution: filling
    /// in the id the host told us about is not a user edit.
    pub fn fill_id(&mut self, direction: Direction, table: Option<&PacketInfoTable>) -> bool {
        let Some(name) = self.deferred_id.clone() else {
            return true;
        };

        let Some(table) = table else {
            return false;
        };

        let Some(entry) = table.lookup(direction, &name) else {
            return false;
        };

        let edited_before = self.edited;
        self.replace_short(4, entry.id);
        self.edited = edited_before;
        self.deferred_id = None;
        true
    }

    /// Undoes a successful `fill_id`: writes the sentinel header back and
    /// restores the deferred name and `edited` flag. Used by the send path
    /// so a caller's packet is not left observably resolved after one send.
    pub fn restore_deferred(&mut self, name: String, edited: bool) {
        self.replace_short(4, SENTINEL_ID);
        self.deferred_id = Some(name);
        self.edited = edited;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Iso8859_1,
    Utf8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadValue {
    Int(i32),
    Str(String),
    Byte(u8),
    Bool(bool),
    Short(i16),
    Long(i64),
}

fn decode(bytes: &[u8], encoding: StringEncoding) -> String {
    match encoding {
        StringEncoding::Iso8859_1 => iso8859_1_decode_bytes(bytes),
        StringEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn encode(s: &str, encoding: StringEncoding) -> Vec<u8> {
    match encoding {
        StringEncoding::Iso8859_1 => iso8859_1_encode_to_bytes(s),
        StringEncoding::Utf8 => s.as_bytes().to_vec(),
    }
}

fn read_uint_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

fn write_uint_be(value: u64, width: usize) -> Vec<u8> {
    let full = value.to_be_bytes();
    full[full.len() - width..].to_vec()
}

/// ISO-8859-1 maps code points 0..=255 to bytes 0..=255 one-to-one, so the
/// round-trip through `char` is lossless — this is exactly what the
/// source relies on when it does `bytearray.decode('iso-8859-1')` /
/// `.encode('iso-8859-1')` to shuttle arbitrary binary data through a
/// host-text string field.
fn iso8859_1_decode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn iso8859_1_decode(s: &str) -> Vec<u8> {
    s.chars().map(|c| c as u32 as u8).collect()
}

fn iso8859_1_encode(bytes: &[u8]) -> String {
    iso8859_1_decode_bytes(bytes)
}

fn iso8859_1_encode_to_bytes(s: &str) -> Vec<u8> {
    iso8859_1_decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_invariant_after_appends() {
        let mut p = Packet::empty(1);
        p.append_int(42).append_string("hi").append_bool(true);
        assert_eq!(p.read_int(Some(0)), (p.len() as i32) - 4);
    }

    #[test]
    fn length_invariant_after_replace_string() {
        let mut p = Packet::new(HeaderId::Numeric(1), [Value::from("hello"), Value::from(7i32)]);
        p.reset();
        p.read_string();
        p.replace_string(6, "a much longer replacement string", StringEncoding::Utf8);
        assert_eq!(p.read_int(Some(0)), (p.len() as i32) - 4);
    }

    #[test]
    fn read_round_trip_int() {
        let mut p = Packet::empty(5);
        p.append_int(-1234);
        p.reset();
        assert_eq!(p.read_int_next(), -1234);
    }

    #[test]
    fn read_round_trip_string_utf8() {
        // append_string/read_string intentionally use different default
        // encodings (utf-8 append, iso-8859-1 read), matching hpacket.py.
        // Round-tripping non-ASCII requires reading back with the encoding
        // it was written in.
        let mut p = Packet::empty(5);
        p.append_string("hæbbo");
        p.reset();
        assert_eq!(p.read_string_next(2, StringEncoding::Utf8), "hæbbo");
    }

    #[test]
    fn default_append_read_pair_round_trips_ascii() {
        let mut p = Packet::empty(5);
        p.append_string("hello");
        p.reset();
        assert_eq!(p.read_string(), "hello");
    }

    #[test]
    fn read_round_trip_bool_and_byte() {
        let mut p = Packet::empty(5);
        p.append_bool(true).append_byte(9);
        p.reset();
        assert!(p.read_bool_next());
        assert_eq!(p.read_byte_next(), 9);
    }

    #[test]
    fn read_round_trip_long() {
        let mut p = Packet::empty(5);
        p.append_long(-99999999999);
        p.reset();
        assert_eq!(p.read_long_next(), -99999999999);
    }

    #[test]
    fn read_format_batch_shares_cursor() {
        let mut p = Packet::empty(5);
        p.append_int(1).append_string("x").append_byte(2).append_bool(true);
        p.reset();
        let values = p.read_format("isbB").unwrap();
        assert_eq!(
            values,
            vec![
                ReadValue::Int(1),
                ReadValue::Str("x".into()),
                ReadValue::Byte(2),
                ReadValue::Bool(true),
            ]
        );
    }

    #[test]
    fn host_text_round_trip_preserves_edited_bit() {
        let mut p = Packet::empty(5);
        p.append_string("payload");
        let text = p.to_host_text();
        assert!(text.starts_with('1'));
        let back = Packet::from_host_text(&text).unwrap();
        assert_eq!(back.raw(), p.raw());
        assert_eq!(back.edited(), p.edited());
    }

    #[test]
    fn host_text_round_trip_unedited() {
        let p = Packet::from_bytes(vec![0, 0, 0, 2, 0, 5]);
        let text = p.to_host_text();
        assert!(text.starts_with('0'));
        let back = Packet::from_host_text(&text).unwrap();
        assert_eq!(back.raw(), p.raw());
    }

    #[test]
    fn host_text_round_trip_with_high_bytes() {
        let p = Packet::from_bytes(vec![0, 0, 0, 3, 0, 5, 0xFF]);
        let text = p.to_host_text();
        let back = Packet::from_host_text(&text).unwrap();
        assert_eq!(back.raw(), p.raw());
    }

    #[test]
    fn construction_from_numeric_id_is_not_edited() {
        let p = Packet::new(HeaderId::Numeric(5), [Value::from("x"), Value::from(1i32)]);
        assert!(!p.edited());
        assert_eq!(p.header_id(), 5);
    }

    #[test]
    fn construction_from_symbolic_id_is_incomplete() {
        let p = Packet::new(HeaderId::Symbolic("Chat".into()), []);
        assert!(p.is_incomplete());
        assert_eq!(p.deferred_id(), Some("Chat"));
        assert_eq!(p.header_id(), -1);
    }

    #[test]
    fn fill_id_without_table_fails() {
        let mut p = Packet::new(HeaderId::Symbolic("Chat".into()), []);
        assert!(!p.fill_id(Direction::ToServer, None));
        assert!(p.is_incomplete());
    }

    #[test]
    fn fill_id_preserves_edited_flag() {
        use crate::registry::info::{PacketInfo, PacketInfoTable};

        let mut table = PacketInfoTable::new();
        table.insert(
            Direction::ToServer,
            PacketInfo {
                id: 2547,
                name: Some("Chat".into()),
                hash: None,
                structure: None,
                source: None,
            },
        );

        let mut p = Packet::new(HeaderId::Symbolic("Chat".into()), []);
        p.append_string("hi");
        assert!(p.edited());

        assert!(p.fill_id(Direction::ToServer, Some(&table)));
        assert!(!p.is_incomplete());
        assert_eq!(p.header_id(), 2547);
        assert!(p.edited());
    }

    #[test]
    fn is_corrupted_detects_length_mismatch() {
        let p = Packet::from_bytes(vec![0, 0, 0, 99, 0, 5]);
        assert!(p.is_corrupted());
        let ok = Packet::from_bytes(vec![0, 0, 0, 2, 0, 5]);
        assert!(!ok.is_corrupted());
    }

    #[test]
    fn is_corrupted_detects_short_buffer() {
        let p = Packet::from_bytes(vec![0, 0]);
        assert!(p.is_corrupted());
    }
}
