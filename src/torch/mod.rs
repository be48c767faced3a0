//! Torch message envelope and the addressing contract between valleys
//! and campfires.

pub mod address;
pub mod signer;

pub use address::TorchAddress;
pub use signer::{PlaceholderSigner, TorchSignerPort};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Message envelope exchanged between campfires and valleys.
///
/// A torch is immutable once constructed; a processing step that needs to
/// change data constructs a new torch instead of mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Torch {
    pub id: String,
    pub sender_valley: String,
    pub target_address: String,
    pub payload: Value,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub signature: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Torch {
    pub fn new(
        sender_valley: impl Into<String>,
        target_address: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            sender_valley: sender_valley.into(),
            target_address: target_address.into(),
            payload,
            attachments: Vec::new(),
            signature: String::new(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Builds the response torch for this one: id derived from the inbound
    /// id, sender taken from the inbound target address, target routed back
    /// at the inbound sender. Returns `None` when the inbound target address
    /// does not resolve to a valley.
    pub fn respond(&self, payload: Value, signer: &dyn TorchSignerPort) -> Option<Torch> {
        let inbound_target = TorchAddress::parse(&self.target_address)?;
        let mut response = Torch {
            id: format!("response_{}", self.id),
            sender_valley: inbound_target.valley,
            target_address: TorchAddress::valley(&self.sender_valley).to_string(),
            payload,
            attachments: Vec::new(),
            signature: String::new(),
            timestamp: OffsetDateTime::now_utc(),
        };
        response.signature = signer.sign(&response);
        Some(response)
    }
}
