/// Direction of a packet relative to the game: towards the client (from
/// the server) or towards the server (from the client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ToClient,
    ToServer,
}

impl Direction {
    pub fn as_host_text(self) -> &'static str {
        match self {
            Direction::ToClient => "TOCLIENT",
            Direction::ToServer => "TOSERVER",
        }
    }

    /// Any string other than the literal `"TOCLIENT"` is treated as
    /// TO_SERVER, matching the source's `==` check rather than a strict
    /// enum parse.
    pub fn from_host_text(s: &str) -> Self {
        if s == "TOCLIENT" {
            Direction::ToClient
        } else {
            Direction::ToServer
        }
    }
}
