//! Per-consumer outbound queue.
//!
//! The fan-out must never block the real-time thread, so a slow consumer
//! sheds load here: when the queue is full, periodic updates and snapshots
//! are dropped first; add/remove/state-change messages survive.

use std::collections::VecDeque;

use crate::bridge::OutboundMsg;

pub const DEFAULT_CAP: usize = 256;

pub struct OutQueue {
    items: VecDeque<OutboundMsg>,
    cap: usize,
}

impl OutQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, msg: OutboundMsg) {
        if self.items.len() >= self.cap {
            if let Some(pos) = self.items.iter().position(|m| !m.topic.is_critical()) {
                self.items.remove(pos);
            } else if !msg.topic.is_critical() {
                // Full of critical messages; the incoming update loses.
                return;
            } else {
                self.items.pop_front();
            }
        }
        self.items.push_back(msg);
    }

    pub fn pop(&mut self) -> Option<OutboundMsg> {
        self.items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
