// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! FIFO of owned message buffers with lazy reclamation.
//!
//! The queue keeps three positions over its node list:
//!
//! ```text
//!  head          divider                      tail
//!   |  consumed    |   pending ...              |
//! ```
//!
//! Nodes in `head..divider` have already been dequeued: their payload was
//! handed to the caller and only the empty node remains. They are reclaimed
//! by the next [`MessageQueue::enqueue`], so consumed entries never pile up
//! beyond one enqueue cycle. `len()` is always the number of nodes between
//! divider and tail.
//!
//! There is no sentinel node. `head` is the front of a `VecDeque`, `tail` its
//! back, and the divider is an index into it. An empty queue is
//! `divider == nodes.len()`, which is the state a sentinel-based list is in
//! when the divider node is the tail.

use std::collections::VecDeque;

use bytes::BytesMut;

#[derive(Debug)]
struct Node {
    payload: Option<BytesMut>,
}

#[derive(Debug, Default)]
pub struct MessageQueue {
    nodes: VecDeque<Node>,
    /// index of the first pending node; everything before it is consumed
    divider: usize,
    length: usize,
}

impl MessageQueue {
    pub fn new() -> Self {
        MessageQueue::default()
    }

    pub fn enqueue(&mut self, message: BytesMut) {
        self.nodes.push_back(Node {
            payload: Some(message),
        });
        self.length += 1;
        self.reclaim();
    }

    fn reclaim(&mut self) {
        if self.divider > 0 {
            self.nodes.drain(..self.divider);
            self.divider = 0;
        }
    }

    /// Take the oldest pending message. Its node stays behind, empty, until
    /// the next enqueue.
    pub fn dequeue(&mut self) -> Option<BytesMut> {
        let node = self.nodes.get_mut(self.divider)?;
        let message = node.payload.take();
        self.divider += 1;
        self.length -= 1;
        message
    }

    /// The oldest pending message, left in place.
    pub fn peek(&self) -> Option<&BytesMut> {
        self.nodes
            .get(self.divider)
            .and_then(|node| node.payload.as_ref())
    }

    /// Mutable access to the oldest pending message, used to trim a
    /// partially transmitted buffer without losing its queue position.
    pub fn peek_mut(&mut self) -> Option<&mut BytesMut> {
        self.nodes
            .get_mut(self.divider)
            .and_then(|node| node.payload.as_mut())
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Consumed nodes still waiting for reclamation.
    pub fn retained(&self) -> usize {
        self.divider
    }

    /// Free every node, pending or consumed.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.divider = 0;
        self.length = 0;
    }
}
