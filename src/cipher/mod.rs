//! Data-at-rest cipher for queued mutation payloads.
//!
//! Queue entries can carry identifiers and amounts, so they are sealed
//! with AES-256-GCM before touching the local store. The key is
//! generated on first use, persisted in the metadata area, and rotated
//! after a fixed age — old ciphertext becomes undecryptable by design,
//! which is acceptable because queue entries are expected to drain long
//! before the key expires.
//!
//! The policy is fail open, log loud: a missing or failing primitive
//! downgrades writes to a tagged plaintext envelope instead of blocking
//! the write path. Losing confidentiality of one cached payload is
//! preferable to losing the user's ability to operate offline.

pub mod envelope;
pub mod error;

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value as JsonValue;

use crate::store::LocalStore;

pub use envelope::Envelope;
pub use error::{
    decrypt_error, encrypt_error, key_error, unavailable, CipherError, CipherErrorCode,
    CipherResult,
};

const KEY_META: &str = "encryption_key";
const KEY_CREATED_META: &str = "encryption_key_created_at";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Clone)]
struct CachedKey {
    bytes: [u8; KEY_LEN],
    created_at: DateTime<Utc>,
}

/// Symmetric cipher over JSON payloads with locally managed key material.
pub struct Cipher {
    store: Arc<LocalStore>,
    max_key_age: Duration,
    enabled: bool,
    cached: async_lock::Mutex<Option<CachedKey>>,
}

impl Cipher {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self::with_max_key_age(store, Duration::days(30))
    }

    pub fn with_max_key_age(store: Arc<LocalStore>, max_key_age: Duration) -> Self {
        Self {
            store,
            max_key_age,
            enabled: true,
            cached: async_lock::Mutex::new(None),
        }
    }

    /// Degraded mode for hosts without the cryptographic primitive.
    /// Every write becomes a tagged plaintext envelope; sealed reads
    /// fail with `cipher/unavailable`.
    pub fn disabled(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            max_key_age: Duration::days(30),
            enabled: false,
            cached: async_lock::Mutex::new(None),
        }
    }

    /// Seals a payload. Never fails: if the primitive is disabled or the
    /// seal throws, the payload is written as a tagged plaintext
    /// envelope and a warning is logged.
    pub async fn encrypt(&self, value: &JsonValue) -> Envelope {
        if !self.enabled {
            log::warn!("encryption unavailable, storing payload unencrypted");
            return Envelope::Plain { body: value.clone() };
        }

        match self.seal(value).await {
            Ok(envelope) => envelope,
            Err(err) => {
                log::error!("sealing payload failed: {err}");
                log::warn!("storing payload unencrypted as fallback");
                Envelope::Plain { body: value.clone() }
            }
        }
    }

    /// Opens an envelope. Plaintext fallbacks unwrap without touching
    /// the cipher; sealed bodies that fail to open surface a per-entry
    /// `cipher/decrypt` error the caller is expected to skip.
    pub async fn decrypt(&self, envelope: &Envelope) -> CipherResult<JsonValue> {
        match envelope {
            Envelope::Plain { body } => Ok(body.clone()),
            Envelope::Sealed { nonce, body } => {
                if !self.enabled {
                    return Err(unavailable("cannot open sealed payload without a cipher"));
                }
                self.open(nonce, body).await
            }
        }
    }

    /// Drops key material from the store and the in-process cache.
    /// Used on logout; any remaining ciphertext becomes unreadable.
    pub async fn clear_key(&self) -> CipherResult<()> {
        let mut cached = self.cached.lock().await;
        cached.take();
        self.store
            .delete_meta(KEY_META)
            .await
            .map_err(|err| key_error(format!("failed to clear key material: {err}")))?;
        self.store
            .delete_meta(KEY_CREATED_META)
            .await
            .map_err(|err| key_error(format!("failed to clear key timestamp: {err}")))?;
        Ok(())
    }

    async fn seal(&self, value: &JsonValue) -> CipherResult<Envelope> {
        let key = self.key().await?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| key_error("key material has the wrong length"))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = serde_json::to_vec(value)
            .map_err(|err| encrypt_error(format!("failed to serialize payload: {err}")))?;
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|err| encrypt_error(format!("seal failed: {err}")))?;

        Ok(Envelope::Sealed {
            nonce: BASE64.encode(nonce_bytes),
            body: BASE64.encode(ciphertext),
        })
    }

    async fn open(&self, nonce: &str, body: &str) -> CipherResult<JsonValue> {
        let key = self.key().await?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| key_error("key material has the wrong length"))?;

        let nonce_bytes = BASE64
            .decode(nonce)
            .map_err(|err| decrypt_error(format!("nonce is not valid base64: {err}")))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(decrypt_error("nonce has the wrong length"));
        }
        let ciphertext = BASE64
            .decode(body)
            .map_err(|err| decrypt_error(format!("body is not valid base64: {err}")))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| decrypt_error("payload failed authentication"))?;

        serde_json::from_slice(&plaintext)
            .map_err(|err| decrypt_error(format!("decrypted payload is not JSON: {err}")))
    }

    /// Returns the current key, loading it from the store or generating
    /// a fresh one when missing or older than `max_key_age`.
    async fn key(&self) -> CipherResult<[u8; KEY_LEN]> {
        let mut cached = self.cached.lock().await;

        if let Some(key) = cached.as_ref() {
            if Utc::now() - key.created_at < self.max_key_age {
                return Ok(key.bytes);
            }
            cached.take();
        }

        let stored: Option<String> = self
            .store
            .get_meta(KEY_META)
            .await
            .map_err(|err| key_error(format!("failed to read key material: {err}")))?;
        let created_at: Option<DateTime<Utc>> = self
            .store
            .get_meta(KEY_CREATED_META)
            .await
            .map_err(|err| key_error(format!("failed to read key timestamp: {err}")))?;

        if let (Some(encoded), Some(created_at)) = (stored, created_at) {
            if Utc::now() - created_at < self.max_key_age {
                let bytes = import_key(&encoded)?;
                *cached = Some(CachedKey { bytes, created_at });
                return Ok(bytes);
            }
            log::info!("encryption key expired, generating a new one");
        }

        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let created_at = Utc::now();

        self.store
            .set_meta(KEY_META, &BASE64.encode(bytes))
            .await
            .map_err(|err| key_error(format!("failed to persist key material: {err}")))?;
        self.store
            .set_meta(KEY_CREATED_META, &created_at)
            .await
            .map_err(|err| key_error(format!("failed to persist key timestamp: {err}")))?;

        log::info!("new encryption key generated");
        *cached = Some(CachedKey { bytes, created_at });
        Ok(bytes)
    }
}

fn import_key(encoded: &str) -> CipherResult<[u8; KEY_LEN]> {
    let decoded = BASE64
        .decode(encoded)
        .map_err(|err| key_error(format!("stored key is not valid base64: {err}")))?;
    if decoded.len() != KEY_LEN {
        return Err(key_error("stored key has the wrong length"));
    }
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&decoded);
    Ok(bytes)
}
