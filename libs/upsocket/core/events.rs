use crate::traits::{UpsocketError, WsMessage};
use std::fmt;
use std::sync::Arc;

/// Topics a [`crate::Connection`] publishes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Open,
    Close,
    Error,
    Message,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Open, Topic::Close, Topic::Error, Topic::Message];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Open => "open",
            Topic::Close => "close",
            Topic::Error => "error",
            Topic::Message => "message",
        }
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.as_str().to_string()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload delivered to connection subscribers
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A transport opened
    Open,
    /// The current transport closed
    Close,
    /// A transport failure other than "connection refused"
    Error(Arc<UpsocketError>),
    /// Inbound payload
    Message(WsMessage),
}

impl ConnectionEvent {
    /// Topic this event is published on
    pub fn topic(&self) -> Topic {
        match self {
            ConnectionEvent::Open => Topic::Open,
            ConnectionEvent::Close => Topic::Close,
            ConnectionEvent::Error(_) => Topic::Error,
            ConnectionEvent::Message(_) => Topic::Message,
        }
    }

    pub fn as_message(&self) -> Option<&WsMessage> {
        match self {
            ConnectionEvent::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&UpsocketError> {
        match self {
            ConnectionEvent::Error(err) => Some(err),
            _ => None,
        }
    }
}
