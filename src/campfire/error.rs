use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampfireErrorKind {
    InvalidState,
    NotFound,
    Registration,
    Broker,
    Step,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampfireError {
    pub kind: CampfireErrorKind,
    pub message: String,
}

impl CampfireError {
    pub fn new(kind: CampfireErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for CampfireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CampfireError {}

pub fn invalid_state(message: impl Into<String>) -> CampfireError {
    CampfireError::new(CampfireErrorKind::InvalidState, message)
}

pub fn not_found(message: impl Into<String>) -> CampfireError {
    CampfireError::new(CampfireErrorKind::NotFound, message)
}

pub fn registration_invalid(message: impl Into<String>) -> CampfireError {
    CampfireError::new(CampfireErrorKind::Registration, message)
}

pub fn broker_failure(message: impl Into<String>) -> CampfireError {
    CampfireError::new(CampfireErrorKind::Broker, message)
}

pub fn step_failure(message: impl Into<String>) -> CampfireError {
    CampfireError::new(CampfireErrorKind::Step, message)
}

pub fn internal_error(message: impl Into<String>) -> CampfireError {
    CampfireError::new(CampfireErrorKind::Internal, message)
}
