//! Shared test harness: a fake host that the runtime dials into, plus
//! frame-level helpers for building/reading the wire packets used across
//! the end-to-end scenarios in `scenarios.rs`.

#![allow(dead_code)]

use gext_core::{Message, Packet, StringEncoding};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Binds a loopback listener on an OS-assigned port, standing in for the
/// host accepting the extension's connection.
pub async fn bind_fake_host() -> (u16, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake host listener");
    let port = listener.local_addr().expect("local addr").port();
    (port, listener)
}

pub async fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().await.expect("accept extension connection");
    stream
}

pub async fn send_packet(stream: &mut TcpStream, packet: &Packet) {
    stream.write_all(packet.raw()).await.expect("write frame to extension");
}

pub async fn recv_packet(stream: &mut TcpStream) -> Packet {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.expect("read length prefix");
    let length = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.expect("read frame body");

    let mut raw = Vec::with_capacity(4 + length);
    raw.extend_from_slice(&len_buf);
    raw.extend_from_slice(&body);
    Packet::from_bytes(raw)
}

/// INIT (id 7): trailing bool is `await_connect_packet`.
pub fn init_packet(await_connect_packet: bool) -> Packet {
    let mut p = Packet::empty(7);
    p.append_bool(await_connect_packet);
    p
}

/// CONNECTION_START (id 5): five scalar fields then `count` records of
/// `(id, hash, name)`, all outgoing (TO_SERVER), as sent by the host.
pub fn connection_start_packet(records: &[(i32, &str, &str)]) -> Packet {
    let mut p = Packet::empty(5);
    p.append_string("hotel.example")
        .append_int(38101)
        .append_string("2024.1")
        .append_string("client-id")
        .append_string("UNITY")
        .append_int(records.len() as i32);
    for (id, hash, name) in records {
        p.append_int(*id)
            .append_string(hash)
            .append_string(name)
            .append_string("struct")
            .append_bool(true)
            .append_string("src");
    }
    p
}

/// PACKET_INTERCEPT (id 3): wraps a [`Message`] envelope's host-text form.
pub fn packet_intercept_frame(message: &Message) -> Packet {
    let mut p = Packet::empty(3);
    p.append_host_string(&message.to_host_text(), StringEncoding::Iso8859_1);
    p
}

/// FLAGS_CHECK (id 4): `int32 n, n x string`.
pub fn flags_check_packet(flags: &[&str]) -> Packet {
    let mut p = Packet::empty(4);
    p.append_int(flags.len() as i32);
    for flag in flags {
        p.append_string(flag);
    }
    p
}
