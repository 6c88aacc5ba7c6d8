#![forbid(unsafe_code)]

//! Core runtime for G-Earth packet-interception extensions: framing,
//! codec, interceptor dispatch, and host-synchronous helper calls. See
//! [`Runtime`] for the entry point.

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod extension_info;
pub mod link;
pub mod registry;
pub mod runtime;

pub use codec::{Direction, HeaderId, Message, Packet, StringEncoding, Value};
pub use error::{GextError, Result};
pub use extension_info::ExtensionInfo;
pub use link::HostLink;
pub use registry::{InterceptKey, InterceptMode, PacketInfo, PacketInfoTable};
pub use runtime::{ConnectionInfo, Runtime};
