//! Identifiers and simple allocators for engine entities.

use serde::{Deserialize, Serialize};

/// A clip bound to the skeleton inside the mixer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub u32);

/// One `speak` request.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct UtteranceId(pub u32);

/// Monotonic allocator for ActionId and UtteranceId.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_action: u32,
    next_utterance: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_action(&mut self) -> ActionId {
        let id = ActionId(self.next_action);
        self.next_action = self.next_action.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_utterance(&mut self) -> UtteranceId {
        let id = UtteranceId(self.next_utterance);
        self.next_utterance = self.next_utterance.wrapping_add(1);
        id
    }
}
