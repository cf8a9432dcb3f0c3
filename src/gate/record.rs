use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Persisted idempotency record, one per key.
///
/// The wire format is JSON text bytes with camelCase field names; `connection_id`
/// is serialized as `connectionId` and identifies the request that owns the key
/// while it is unfinished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyRecord {
    pub key: String,
    pub connection_id: String,
    pub finished: bool,
    pub status_code: Option<u16>,
    pub body: Option<String>,
}

impl IdempotencyRecord {
    /// Creates the in-flight marker written when a request first enters the gate.
    pub fn pending(key: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            connection_id: connection_id.into(),
            finished: false,
            status_code: None,
            body: None,
        }
    }

    /// Creates the finished record written when the owning request completes.
    pub fn complete(
        key: impl Into<String>,
        connection_id: impl Into<String>,
        status_code: u16,
        body: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            connection_id: connection_id.into(),
            finished: true,
            status_code: Some(status_code),
            body: Some(body.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.finished
    }

    /// Checks the state-combination invariant: a record is either pending with
    /// no result, or finished with both status code and body present.
    pub fn validate(&self) -> Result<()> {
        let consistent = if self.finished {
            self.status_code.is_some() && self.body.is_some()
        } else {
            self.status_code.is_none() && self.body.is_none()
        };

        if consistent {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Idempotency record for key '{}' has an invalid state combination",
                self.key
            )))
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a stored record and verifies its invariants. A record that cannot
    /// be decoded surfaces as a gate-level failure, never as a proceed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: IdempotencyRecord = serde_json::from_slice(bytes)?;
        record.validate()?;
        Ok(record)
    }
}
