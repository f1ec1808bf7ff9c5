//! # Approval Store
//!
//! Lifecycle of approval tickets that pause a mutating `execute` until a
//! human approves or denies it. `get_or_create_pending` holds the lock
//! across the find-then-insert sequence so two concurrent requests for the
//! same fingerprint can never create two pending tickets — the at-most-one-
//! pending invariant the specification calls for.

use std::sync::Mutex;
use std::collections::HashMap;

use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{ApprovalStatus, ApprovalTicket};

pub struct ApprovalStore {
    tickets: Mutex<HashMap<String, ApprovalTicket>>,
}

impl Default for ApprovalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalStore {
    pub fn new() -> Self {
        Self {
            tickets: Mutex::new(HashMap::new()),
        }
    }

    fn generate_id() -> String {
        format!("appr_{}", Uuid::new_v4().simple().to_string().get(..12).unwrap_or_default())
    }

    pub fn get(&self, id: &str) -> Result<ApprovalTicket, CoreError> {
        self.tickets
            .lock()
            .expect("approval store mutex poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("unknown approval ticket '{id}'")))
    }

    /// Looks up a pending-or-later ticket matching `(capability_id,
    /// fingerprint)`; if none exists, creates a new pending ticket. Returns
    /// the ticket and whether it was freshly created.
    pub fn get_or_create_pending(
        &self,
        capability_id: &str,
        fingerprint: &str,
        summary: String,
        proposed_effect: serde_json::Value,
    ) -> ApprovalTicket {
        let mut tickets = self.tickets.lock().expect("approval store mutex poisoned");
        if let Some(existing) = tickets
            .values()
            .find(|t| t.capability_id == capability_id && t.fingerprint == fingerprint)
        {
            return existing.clone();
        }

        let ticket = ApprovalTicket {
            id: Self::generate_id(),
            status: ApprovalStatus::Pending,
            summary,
            proposed_effect,
            fingerprint: fingerprint.to_string(),
            capability_id: capability_id.to_string(),
        };
        tickets.insert(ticket.id.clone(), ticket.clone());
        ticket
    }

    pub fn find_approved(&self, capability_id: &str, fingerprint: &str) -> Option<ApprovalTicket> {
        self.tickets
            .lock()
            .expect("approval store mutex poisoned")
            .values()
            .find(|t| {
                t.capability_id == capability_id
                    && t.fingerprint == fingerprint
                    && t.status == ApprovalStatus::Approved
            })
            .cloned()
    }

    pub fn set_status(&self, id: &str, status: ApprovalStatus) -> Result<ApprovalTicket, CoreError> {
        let mut tickets = self.tickets.lock().expect("approval store mutex poisoned");
        let ticket = tickets
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("unknown approval ticket '{id}'")))?;

        if ticket.status == status {
            return Ok(ticket.clone());
        }
        if ticket.status != ApprovalStatus::Pending {
            return Err(CoreError::ApprovalAlreadyFinalized(format!(
                "ticket '{id}' is already {}",
                ticket.status.as_str()
            )));
        }

        ticket.status = status;
        Ok(ticket.clone())
    }
}
