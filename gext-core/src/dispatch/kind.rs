/// Header ids the host sends us (spec §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingMessageKind {
    OnDoubleClick,
    InfoRequest,
    PacketIntercept,
    FlagsCheck,
    ConnectionStart,
    ConnectionEnd,
    Init,
    PacketToStringResponse,
    StringToPacketResponse,
}

impl IncomingMessageKind {
    pub fn from_header_id(id: i16) -> Option<Self> {
        Some(match id {
            1 => IncomingMessageKind::OnDoubleClick,
            2 => IncomingMessageKind::InfoRequest,
            3 => IncomingMessageKind::PacketIntercept,
            4 => IncomingMessageKind::FlagsCheck,
            5 => IncomingMessageKind::ConnectionStart,
            6 => IncomingMessageKind::ConnectionEnd,
            7 => IncomingMessageKind::Init,
            20 => IncomingMessageKind::PacketToStringResponse,
            21 => IncomingMessageKind::StringToPacketResponse,
            _ => return None,
        })
    }
}

/// Header ids we send to the host (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutgoingMessageKind {
    ExtensionInfo,
    ManipulatedPacket,
    RequestFlags,
    SendMessage,
    PacketToStringRequest,
    StringToPacketRequest,
    ExtensionConsoleLog,
}

impl OutgoingMessageKind {
    pub fn header_id(self) -> i16 {
        match self {
            OutgoingMessageKind::ExtensionInfo => 1,
            OutgoingMessageKind::ManipulatedPacket => 2,
            OutgoingMessageKind::RequestFlags => 3,
            OutgoingMessageKind::SendMessage => 4,
            OutgoingMessageKind::PacketToStringRequest => 20,
            OutgoingMessageKind::StringToPacketRequest => 21,
            OutgoingMessageKind::ExtensionConsoleLog => 98,
        }
    }
}
