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

use bytes::BytesMut;

use crate::ofp::{peek_length, HEADER_LEN, MAX_MESSAGE_LEN};
use crate::queue::MessageQueue;
use crate::AppError::Incomplete;
use crate::{AppError, AppResult};

/// Reassembles OpenFlow messages from arbitrary stream reads.
///
/// Holds at most one maximum size message; whatever follows the last complete
/// frame is moved to the front before the next read.
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: Box<[u8]>,
    filled: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer {
            buffer: vec![0u8; MAX_MESSAGE_LEN].into_boxed_slice(),
            filled: 0,
        }
    }

    /// Room for the next read.
    pub fn spare(&mut self) -> &mut [u8] {
        &mut self.buffer[self.filled..]
    }

    pub fn commit(&mut self, read: usize) {
        self.filled = (self.filled + read).min(self.buffer.len());
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }

    /// Length of the complete frame at the start of `buffer`.
    pub fn check(buffer: &[u8]) -> AppResult<usize> {
        let Some(length) = peek_length(buffer) else {
            return Err(Incomplete);
        };
        let length = length as usize;
        if length < HEADER_LEN {
            return Err(AppError::MalformedProtocol(format!(
                "frame length {} shorter than the header",
                length
            )));
        }
        if buffer.len() < length {
            return Err(Incomplete);
        }
        Ok(length)
    }

    /// Move every complete frame into `queue`, returning how many were queued.
    pub fn drain_into(&mut self, queue: &mut MessageQueue) -> AppResult<usize> {
        let mut start = 0;
        let mut framed = 0;
        let result = loop {
            match FrameBuffer::check(&self.buffer[start..self.filled]) {
                Ok(length) => {
                    queue.enqueue(BytesMut::from(&self.buffer[start..start + length]));
                    start += length;
                    framed += 1;
                }
                Err(AppError::Incomplete) => break Ok(framed),
                Err(e) => break Err(e),
            }
        };
        if start > 0 {
            self.buffer.copy_within(start..self.filled, 0);
            self.filled -= start;
        }
        result
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        FrameBuffer::new()
    }
}
