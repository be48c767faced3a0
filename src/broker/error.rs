use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerErrorKind {
    NotConnected,
    Transport,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerError {
    pub kind: BrokerErrorKind,
    pub message: String,
}

impl BrokerError {
    pub fn new(kind: BrokerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BrokerError {}

pub fn not_connected(message: impl Into<String>) -> BrokerError {
    BrokerError::new(BrokerErrorKind::NotConnected, message)
}

pub fn transport_failure(message: impl Into<String>) -> BrokerError {
    BrokerError::new(BrokerErrorKind::Transport, message)
}

pub fn internal_error(message: impl Into<String>) -> BrokerError {
    BrokerError::new(BrokerErrorKind::Internal, message)
}
