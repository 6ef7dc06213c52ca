use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// On-disk representation of an encrypted payload.
///
/// The variant tag is a structural header, decoded before anything else:
/// a `plain` envelope is recognized without touching the cipher, so a
/// fallback write made while the primitive was unavailable always reads
/// back cleanly. No marker-string sniffing — a sealed body that happens
/// to look like JSON stays a sealed body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum Envelope {
    /// AES-256-GCM sealed payload; nonce and ciphertext are base64.
    Sealed { nonce: String, body: String },
    /// Unencrypted fallback, written when the primitive is missing or
    /// sealing failed.
    Plain { body: JsonValue },
}

impl Envelope {
    pub fn is_sealed(&self) -> bool {
        matches!(self, Envelope::Sealed { .. })
    }
}
