use std::fmt;

/// Logical socket channel. At most one socket of each kind is live at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Chat,
    ChatList,
    Status,
}

impl ChannelKind {
    #[cfg(test)]
    pub const ALL: [ChannelKind; 3] = [Self::Chat, Self::ChatList, Self::Status];

    pub fn as_label(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::ChatList => "chat-list",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// Identifies one physical socket: its channel kind plus the generation the
/// connection manager assigned when opening it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId {
    pub kind: ChannelKind,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketSignal {
    Opened,
    Text(String),
    Closed(Option<CloseInfo>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub socket: SocketId,
    pub signal: SocketSignal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Tick,
    QuitRequested,
    Input(String),
    Transport(TransportEvent),
    /// A REST job finished and its result is waiting to be applied.
    BackendReady,
}
