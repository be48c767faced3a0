use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sidecar record written next to every stored attachment
/// (`attachments/<id>.meta`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentMetadata {
    pub attachment_id: String,
    pub size: u64,
    pub stored_at: String,
    pub hash: String,
}

/// Extra record written when an attachment is quarantined
/// (`quarantine/<id>.quarantine`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuarantineRecord {
    pub quarantined_at: String,
    pub reason: String,
    pub original_location: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryStats {
    pub files: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageStats {
    pub categories: BTreeMap<String, CategoryStats>,
    pub total: CategoryStats,
}
