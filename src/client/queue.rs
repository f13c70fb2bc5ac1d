use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What to do when a message arrives at a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued message to make room
    #[default]
    DropOldest,
    /// Refuse the new message
    RejectNew,
}

/// Bounded FIFO of serialized messages waiting for a connection.
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<String>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl OutboundQueue {
    /// A `capacity` of 0 is treated as 1.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Append a message.
    ///
    /// Returns the evicted message under `DropOldest`, or
    /// `ClientError::QueueFull` under `RejectNew`.
    pub fn push(&mut self, text: String) -> Result<Option<String>, ClientError> {
        if self.items.len() < self.capacity {
            self.items.push_back(text);
            return Ok(None);
        }

        match self.policy {
            OverflowPolicy::DropOldest => {
                let evicted = self.items.pop_front();
                self.items.push_back(text);
                Ok(evicted)
            }
            OverflowPolicy::RejectNew => Err(ClientError::QueueFull {
                capacity: self.capacity,
            }),
        }
    }

    /// Put messages that never made it onto the wire back at the front, in
    /// their original order.
    ///
    /// Returns how many queued messages were dropped from the back to stay
    /// within capacity.
    pub fn requeue_front(&mut self, pending: Vec<String>) -> usize {
        for text in pending.into_iter().rev() {
            self.items.push_front(text);
        }
        let mut dropped = 0;
        while self.items.len() > self.capacity {
            self.items.pop_back();
            dropped += 1;
        }
        dropped
    }

    /// Take everything, oldest first.
    pub fn drain(&mut self) -> Vec<String> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
