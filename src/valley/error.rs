use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValleyErrorKind {
    InvalidState,
    Broker,
    Campfire,
    PartyBox,
    Dock,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValleyError {
    pub kind: ValleyErrorKind,
    pub message: String,
}

impl ValleyError {
    pub fn new(kind: ValleyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValleyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValleyError {}

pub fn invalid_state(message: impl Into<String>) -> ValleyError {
    ValleyError::new(ValleyErrorKind::InvalidState, message)
}

pub fn broker_failure(message: impl Into<String>) -> ValleyError {
    ValleyError::new(ValleyErrorKind::Broker, message)
}

pub fn campfire_failure(message: impl Into<String>) -> ValleyError {
    ValleyError::new(ValleyErrorKind::Campfire, message)
}

pub fn party_box_failure(message: impl Into<String>) -> ValleyError {
    ValleyError::new(ValleyErrorKind::PartyBox, message)
}

pub fn dock_failure(message: impl Into<String>) -> ValleyError {
    ValleyError::new(ValleyErrorKind::Dock, message)
}

pub fn internal_error(message: impl Into<String>) -> ValleyError {
    ValleyError::new(ValleyErrorKind::Internal, message)
}
