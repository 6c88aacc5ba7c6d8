pub mod direction;
pub mod message;
pub mod packet;

pub use direction::Direction;
pub use message::Message;
pub use packet::{HeaderId, Packet, ReadValue, StringEncoding, Value};
