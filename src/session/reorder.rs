use std::collections::BTreeMap;

use crate::foundation::error::{StitchError, StitchResult};

/// Restores sequence order after parallel stages, holding at most `capacity` early items.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: u64,
    capacity: usize,
    pending: BTreeMap<u64, T>,
}

impl<T> ReorderBuffer<T> {
    /// Empty buffer expecting sequence 0.
    pub fn new(capacity: usize) -> Self {
        Self {
            next: 0,
            capacity: capacity.max(1),
            pending: BTreeMap::new(),
        }
    }

    /// Accept item `seq`.
    ///
    /// Stale or duplicate sequence numbers and overflow are errors: they mean an upstream stage
    /// lost or repeated work.
    pub fn push(&mut self, seq: u64, item: T) -> StitchResult<()> {
        if seq < self.next || self.pending.contains_key(&seq) {
            return Err(StitchError::Other(anyhow::anyhow!(
                "sequence {seq} delivered twice (next expected {})",
                self.next
            )));
        }
        if seq != self.next && self.pending.len() >= self.capacity {
            return Err(StitchError::Other(anyhow::anyhow!(
                "reorder buffer overflow: {} items waiting for sequence {}",
                self.pending.len(),
                self.next
            )));
        }
        self.pending.insert(seq, item);
        Ok(())
    }

    /// Next in-order item, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next)?;
        self.next += 1;
        Some(item)
    }

    /// Sequence number the buffer is waiting for.
    pub fn next_seq(&self) -> u64 {
        self.next
    }

    /// Items held back.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// `true` when nothing is held back.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/reorder.rs"]
mod tests;
