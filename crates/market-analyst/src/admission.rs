//! Admission Control
//!
//! Bounds concurrent analyses globally and to one in-flight attempt per
//! conversation. All mutation goes through this struct's methods; the slot
//! release is tied to `AdmissionTicket`'s `Drop`, so no failure path can
//! leak a permanently-held slot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{AnalystError, Result};
use crate::model::ConversationId;

/// Gate over global and per-conversation concurrency.
pub struct AdmissionGate {
    max_concurrent: usize,
    active: Mutex<HashSet<ConversationId>>,
}

impl AdmissionGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Number of analyses currently in flight.
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    /// Non-failing admission check-and-enter.
    pub fn try_enter(&self, conversation: &ConversationId) -> bool {
        let mut active = self.active.lock().unwrap();
        if active.len() >= self.max_concurrent || active.contains(conversation) {
            return false;
        }
        active.insert(conversation.clone());
        true
    }

    /// Enter or fail with `AdmissionDenied`.
    pub fn enter(&self, conversation: &ConversationId) -> Result<()> {
        let mut active = self.active.lock().unwrap();
        if active.contains(conversation) {
            return Err(AnalystError::AdmissionDenied(format!(
                "conversation {conversation} already has an analysis in flight"
            )));
        }
        if active.len() >= self.max_concurrent {
            return Err(AnalystError::AdmissionDenied(format!(
                "{} of {} analysis slots in use",
                active.len(),
                self.max_concurrent
            )));
        }
        active.insert(conversation.clone());
        Ok(())
    }

    /// Release a slot. Idempotent: leaving a conversation that is not active
    /// is a no-op, logged as a warning condition.
    pub fn leave(&self, conversation: &ConversationId) {
        let mut active = self.active.lock().unwrap();
        if !active.remove(conversation) {
            tracing::warn!(%conversation, "leave() for a conversation that was not active");
        }
    }

    /// Scoped acquisition: enter now, release on drop of the returned ticket.
    pub fn acquire(gate: &Arc<Self>, conversation: ConversationId) -> Result<AdmissionTicket> {
        gate.enter(&conversation)?;
        Ok(AdmissionTicket {
            gate: Arc::clone(gate),
            conversation,
        })
    }
}

/// The right to occupy one unit of concurrency capacity for one in-flight
/// analysis. Releasing happens on drop, whatever path the attempt took.
pub struct AdmissionTicket {
    gate: Arc<AdmissionGate>,
    conversation: ConversationId,
}

impl AdmissionTicket {
    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.gate.leave(&self.conversation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(id: &str) -> ConversationId {
        ConversationId::new(id)
    }

    #[test]
    fn test_global_ceiling() {
        let gate = AdmissionGate::new(2);
        assert!(gate.try_enter(&conv("a")));
        assert!(gate.try_enter(&conv("b")));
        assert!(!gate.try_enter(&conv("c")));
        assert_eq!(gate.active_count(), 2);

        gate.leave(&conv("a"));
        assert!(gate.try_enter(&conv("c")));
    }

    #[test]
    fn test_one_ticket_per_conversation() {
        let gate = AdmissionGate::new(8);
        assert!(gate.try_enter(&conv("a")));
        assert!(!gate.try_enter(&conv("a")));
        assert!(gate.enter(&conv("a")).is_err());
    }

    #[test]
    fn test_leave_is_idempotent() {
        let gate = AdmissionGate::new(1);
        gate.leave(&conv("ghost"));
        assert_eq!(gate.active_count(), 0);

        assert!(gate.try_enter(&conv("a")));
        gate.leave(&conv("a"));
        gate.leave(&conv("a"));
        assert_eq!(gate.active_count(), 0);
    }

    #[test]
    fn test_ticket_releases_on_drop() {
        let gate = Arc::new(AdmissionGate::new(1));
        {
            let _ticket = AdmissionGate::acquire(&gate, conv("a")).unwrap();
            assert_eq!(gate.active_count(), 1);
            assert!(AdmissionGate::acquire(&gate, conv("b")).is_err());
        }
        assert_eq!(gate.active_count(), 0);
        assert!(AdmissionGate::acquire(&gate, conv("b")).is_ok());
    }

    #[test]
    fn test_count_matches_unreleased_tickets() {
        let gate = Arc::new(AdmissionGate::new(4));
        let t1 = AdmissionGate::acquire(&gate, conv("a")).unwrap();
        let t2 = AdmissionGate::acquire(&gate, conv("b")).unwrap();
        let t3 = AdmissionGate::acquire(&gate, conv("c")).unwrap();
        assert_eq!(gate.active_count(), 3);

        drop(t2);
        assert_eq!(gate.active_count(), 2);
        drop(t1);
        drop(t3);
        assert_eq!(gate.active_count(), 0);
    }
}
