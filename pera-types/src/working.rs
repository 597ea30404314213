use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value stored in the Working Store, transparently compressed once its
/// serialized length exceeds the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoredValue {
    Plain(Value),
    Compressed(Vec<u8>),
}

impl StoredValue {
    /// Wrap a value, compressing it if its JSON-serialized length exceeds
    /// `threshold_bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized to JSON.
    pub fn pack(value: &Value, threshold_bytes: usize) -> serde_json::Result<Self> {
        let raw = serde_json::to_vec(value)?;
        if raw.len() > threshold_bytes {
            let compressed = lz4_flex::compress_prepend_size(&raw);
            Ok(StoredValue::Compressed(compressed))
        } else {
            Ok(StoredValue::Plain(value.clone()))
        }
    }

    /// Re-inflate to the original JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if compressed bytes are corrupt or decompressed
    /// bytes are not valid JSON.
    pub fn unpack(&self) -> anyhow::Result<Value> {
        match self {
            StoredValue::Plain(v) => Ok(v.clone()),
            StoredValue::Compressed(bytes) => {
                let raw = lz4_flex::decompress_size_prepended(bytes)
                    .map_err(|e| anyhow::anyhow!("working store decompression failed: {e}"))?;
                Ok(serde_json::from_slice(&raw)?)
            }
        }
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        matches!(self, StoredValue::Compressed(_))
    }
}

/// One keyed value in the Working Store, carrying its own expiration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingEntry {
    pub session_id: uuid::Uuid,
    pub key: String,
    pub value: StoredValue,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WorkingEntry {
    #[must_use]
    pub fn new(session_id: uuid::Uuid, key: impl Into<String>, value: StoredValue, ttl: std::time::Duration) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(3600));
        Self {
            session_id,
            key: key.into(),
            value,
            created_at: now,
            last_access: now,
            expires_at: now + ttl,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_access = now;
    }
}
