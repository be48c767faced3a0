use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyBoxErrorKind {
    Io,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyBoxError {
    pub kind: PartyBoxErrorKind,
    pub message: String,
}

impl PartyBoxError {
    pub fn new(kind: PartyBoxErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for PartyBoxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PartyBoxError {}

pub fn io_failure(message: impl Into<String>) -> PartyBoxError {
    PartyBoxError::new(PartyBoxErrorKind::Io, message)
}

pub fn internal_error(message: impl Into<String>) -> PartyBoxError {
    PartyBoxError::new(PartyBoxErrorKind::Internal, message)
}
