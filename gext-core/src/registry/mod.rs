pub mod info;
pub mod intercept;

pub use info::{PacketInfo, PacketInfoTable};
pub use intercept::{Callback, InterceptKey, InterceptMode, InterceptorRegistry};
