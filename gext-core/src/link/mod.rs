#![allow(clippy::module_inception)]

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::codec::packet::Packet;
use crate::error::{GextError, Result};

/// Framing I/O over a single TCP connection to the host (spec §4.E).
/// Read side is only ever driven by the reader task; write side is
/// shared (stream mutex) so the manipulator and synchronous helper
/// calls can interleave replies safely.
pub struct HostLink {
    read_half: Mutex<tokio::net::tcp::OwnedReadHalf>,
    write_half: Mutex<tokio::net::tcp::OwnedWriteHalf>,
}

impl HostLink {
    /// Connects to `127.0.0.1:<port>` and disables Nagle's algorithm, as
    /// the host expects packet-sized writes to go out promptly.
    pub async fn connect(port: u16) -> Result<Self> {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .map_err(|e| GextError::Io(e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| GextError::Io(e))?;
        let (read_half, write_half) = stream.into_split();
        Ok(HostLink {
            read_half: Mutex::new(read_half),
            write_half: Mutex::new(write_half),
        })
    }

    /// Reads one host frame: a 4-byte big-endian length prefix followed
    /// by that many bytes of payload. Returns `Ok(None)` on a clean EOF
    /// before any bytes of the next frame arrive.
    pub async fn read_packet(&self) -> Result<Option<Packet>> {
        let mut reader = self.read_half.lock().await;

        let mut len_buf = [0u8; 4];
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Ok(None);
            }
            return Err(GextError::Io(e));
        }

        let length = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                GextError::Framing("connection closed mid-frame".into())
            } else {
                GextError::Io(e)
            }
        })?;

        let mut raw = Vec::with_capacity(4 + length);
        raw.extend_from_slice(&len_buf);
        raw.extend_from_slice(&body);
        debug!(bytes = raw.len(), "framed packet from host");
        Ok(Some(Packet::from_bytes(raw)))
    }

    /// Writes a packet's raw buffer to the host under the stream mutex.
    pub async fn write_packet(&self, packet: &Packet) -> Result<()> {
        let mut writer = self.write_half.lock().await;
        writer.write_all(packet.raw()).await.map_err(GextError::Io)?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut writer = self.write_half.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }
}

pub type SharedHostLink = Arc<HostLink>;
