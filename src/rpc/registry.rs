//! Correlation id registry: maps in-flight correlation ids to one-shot
//! reply slots.
//!
//! The map mutex guards insert/lookup/delete only; it is never held
//! across an await or a publish.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::RpcError;
use crate::rpc::envelope::AgentReply;

/// Thread-safe map of correlation id to pending reply slot.
#[derive(Default)]
pub struct CorrelationRegistry {
    pending: Mutex<HashMap<String, oneshot::Sender<AgentReply>>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh one-shot slot under `id` and return its receiving
    /// end. Fails if `id` is already registered; ids are generated fresh
    /// per call, so a collision is a bug.
    pub fn register(&self, id: &str) -> Result<oneshot::Receiver<AgentReply>, RpcError> {
        let mut pending = self.pending.lock();
        if pending.contains_key(id) {
            return Err(RpcError::DuplicateCorrelation(id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id.to_string(), tx);
        Ok(rx)
    }

    /// Hand `reply` to the caller waiting on `id`, consuming the slot.
    ///
    /// Returns `false` when the id is unknown (late reply, foreign
    /// correlation id, or the caller already gave up) or the waiter is
    /// gone; the reply is then discarded. Never blocks.
    pub fn deliver(&self, id: &str, reply: AgentReply) -> bool {
        let slot = self.pending.lock().remove(id);
        match slot {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Drop any slot registered under `id`. Idempotent; called by the
    /// waiting side on every exit path.
    pub fn remove(&self, id: &str) {
        self.pending.lock().remove(id);
    }

    /// Number of in-flight registrations.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn reply(event_type: &str) -> AgentReply {
        AgentReply {
            event_type: event_type.to_string(),
            data: Map::new(),
        }
    }

    #[test]
    fn register_then_deliver_hands_off() {
        let registry = CorrelationRegistry::new();
        let mut rx = registry.register("c-1").unwrap();

        assert!(registry.deliver("c-1", reply("ok")));
        assert_eq!(rx.try_recv().unwrap().event_type, "ok");
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_register_fails() {
        let registry = CorrelationRegistry::new();
        let _rx = registry.register("c-1").unwrap();
        let err = registry.register("c-1").unwrap_err();
        assert!(matches!(err, RpcError::DuplicateCorrelation(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deliver_unknown_id_is_discarded() {
        let registry = CorrelationRegistry::new();
        assert!(!registry.deliver("never-registered", reply("ok")));
        assert!(registry.is_empty());
    }

    #[test]
    fn deliver_after_remove_is_discarded() {
        let registry = CorrelationRegistry::new();
        let _rx = registry.register("c-1").unwrap();
        registry.remove("c-1");
        assert!(!registry.deliver("c-1", reply("ok")));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = CorrelationRegistry::new();
        let _rx = registry.register("c-1").unwrap();
        registry.remove("c-1");
        registry.remove("c-1");
        registry.remove("c-1");
        assert!(registry.is_empty());
    }

    #[test]
    fn deliver_to_dropped_waiter_returns_false() {
        let registry = CorrelationRegistry::new();
        let rx = registry.register("c-1").unwrap();
        drop(rx);
        assert!(!registry.deliver("c-1", reply("ok")));
    }

    #[test]
    fn at_most_one_reply_is_observed() {
        let registry = CorrelationRegistry::new();
        let mut rx = registry.register("c-1").unwrap();

        assert!(registry.deliver("c-1", reply("first")));
        assert!(!registry.deliver("c-1", reply("second")));
        assert_eq!(rx.try_recv().unwrap().event_type, "first");
    }

    #[test]
    fn ids_are_independent() {
        let registry = CorrelationRegistry::new();
        let mut rx_a = registry.register("a").unwrap();
        let mut rx_b = registry.register("b").unwrap();

        assert!(registry.deliver("b", reply("for-b")));
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().event_type, "for-b");
    }
}
