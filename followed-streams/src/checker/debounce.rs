//! Live-state diffing with offline debounce.
//!
//! Going live is reported on the first observation. Going offline has to be
//! seen [`OFFLINE_CONFIRMATIONS`] cycles in a row before it is reported; a
//! live observation in between cancels it. A key seen for the first time
//! (no previous snapshot) never produces a transition.
//!
//! The pending-offline counters are process-local and are not persisted.

use std::collections::HashMap;

use stream_platforms::{StreamData, StreamDataKey};

/// Consecutive offline observations required before an offline transition.
pub const OFFLINE_CONFIRMATIONS: u32 = 2;

/// A live-state change worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Online,
    Offline,
}

/// Transitions found in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transitions {
    pub online: Vec<StreamData>,
    pub offline: Vec<StreamData>,
}

#[derive(Debug, Default)]
pub struct Debouncer {
    /// Offline observations seen so far for keys that were live.
    pending_offline: HashMap<StreamDataKey, u32>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one fresh snapshot against the snapshot read at cycle start.
    pub fn observe(&mut self, old: Option<&StreamData>, new: &StreamData) -> Option<Transition> {
        let old = old?;
        let key = new.key();

        if new.is_live {
            let was_pending = self.pending_offline.remove(&key).is_some();
            return (!old.is_live || was_pending).then_some(Transition::Online);
        }

        if !old.is_live && !self.pending_offline.contains_key(&key) {
            return None;
        }

        let seen = self.pending_offline.entry(key.clone()).or_insert(0);
        *seen += 1;
        if *seen >= OFFLINE_CONFIRMATIONS {
            self.pending_offline.remove(&key);
            return Some(Transition::Offline);
        }
        None
    }

    /// Classify every fetched snapshot of a cycle.
    ///
    /// Keys in `old` that were not fetched this cycle are left untouched:
    /// a missing fetch means "unknown", not "offline".
    pub fn reconcile(
        &mut self,
        old: &HashMap<StreamDataKey, StreamData>,
        fetched: &[StreamData],
    ) -> Transitions {
        let mut transitions = Transitions::default();
        for new in fetched {
            match self.observe(old.get(&new.key()), new) {
                Some(Transition::Online) => transitions.online.push(new.clone()),
                Some(Transition::Offline) => transitions.offline.push(new.clone()),
                None => {}
            }
        }
        transitions
    }

    /// Forget any pending-offline state for `key`.
    pub fn clear(&mut self, key: &StreamDataKey) -> bool {
        self.pending_offline.remove(key).is_some()
    }

    pub fn clear_all(&mut self) {
        self.pending_offline.clear();
    }

    /// Keep pending-offline state only for keys matching `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&StreamDataKey) -> bool) {
        self.pending_offline.retain(|key, _| keep(key));
    }

    pub fn is_pending_offline(&self, key: &StreamDataKey) -> bool {
        self.pending_offline.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending_offline.len()
    }
}
