//! # Idempotency Store
//!
//! Scoped replay protection for mutating executes. `fetch_or_validate`
//! holds the lock across its check-then-read so a concurrent request with
//! the same key cannot observe a half-written record; `save` is an
//! unconditional overwrite, matching the original implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::CoreError;

#[derive(Clone, Debug)]
pub struct IdempotencyRecord {
    pub request_hash: String,
    pub status_code: u16,
    pub payload: Value,
}

pub struct IdempotencyStore {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    fn record_key(scope: &str, idempotency_key: &str) -> String {
        format!("{scope}:{idempotency_key}")
    }

    /// Returns the prior record if `idempotency_key` was already used in
    /// this `scope` with the same request hash (a safe replay), errors if
    /// used with a different hash (key reuse across different requests),
    /// or `None` on a fresh key.
    pub fn fetch_or_validate(
        &self,
        scope: &str,
        idempotency_key: &str,
        request_hash: &str,
    ) -> Result<Option<IdempotencyRecord>, CoreError> {
        let records = self.records.lock().expect("idempotency store mutex poisoned");
        match records.get(&Self::record_key(scope, idempotency_key)) {
            None => Ok(None),
            Some(record) if record.request_hash == request_hash => Ok(Some(record.clone())),
            Some(_) => Err(CoreError::IdempotencyKeyReused(format!(
                "idempotency key '{idempotency_key}' was already used with a different request"
            ))),
        }
    }

    pub fn save(&self, scope: &str, idempotency_key: &str, record: IdempotencyRecord) {
        self.records
            .lock()
            .expect("idempotency store mutex poisoned")
            .insert(Self::record_key(scope, idempotency_key), record);
    }
}
