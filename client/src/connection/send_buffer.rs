use std::collections::VecDeque;

use warp_shared::Envelope;

use crate::error::ClientError;

/// Bounded queue of command envelopes awaiting a live connection.
///
/// Exceeding the capacity is backpressure surfaced to the offending push,
/// never silent growth or silent drop.
pub struct SendBuffer {
    queue: VecDeque<Envelope>,
    capacity: usize,
}

impl SendBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, envelope: Envelope) -> Result<(), ClientError> {
        if self.queue.len() >= self.capacity {
            return Err(ClientError::BufferOverflow {
                capacity: self.capacity,
            });
        }
        self.queue.push_back(envelope);
        Ok(())
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.queue).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
