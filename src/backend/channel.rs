//! Fixed-capacity FIFO of [`Record`]s between the read and send loops.
//!
//! Every blocking operation takes an explicit wait bound. The send loop relies
//! on [`BoundedChannel::pop_timeout`] returning `None` periodically so it can
//! re-check the pipeline's lifecycle flag.
//!
//! Besides the usual tail insertion the channel has a head insertion,
//! [`BoundedChannel::try_push_front`], which the send loop uses as a retry slot
//! for a record whose send failed. Both insertions respect the capacity.

use crate::types::Record;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default channel capacity
pub const DEFAULT_CAPACITY: usize = 1000;

/// Returned when a record could not be inserted; gives the record back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Full(pub Record);

impl Full {
    /// Recover the rejected record
    pub fn into_inner(self) -> Record {
        self.0
    }
}

impl fmt::Display for Full {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel full")
    }
}

impl std::error::Error for Full {}

struct Shared {
    queue: Mutex<VecDeque<Record>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

/// Cloneable handle to a bounded record queue.
///
/// Clones share the same queue, so a channel can outlive the pipeline that
/// created it and be handed to a new one.
#[derive(Clone)]
pub struct BoundedChannel {
    shared: Arc<Shared>,
}

impl BoundedChannel {
    /// Create a channel holding at most `capacity` records.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Maximum number of records held
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of records currently queued
    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.shared.queue.lock().len() >= self.shared.capacity
    }

    /// Append a record, waiting up to `timeout` for space.
    pub fn push_timeout(&self, record: Record, timeout: Duration) -> Result<(), Full> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.queue.lock();
        while queue.len() >= self.shared.capacity {
            if self
                .shared
                .not_full
                .wait_until(&mut queue, deadline)
                .timed_out()
                && queue.len() >= self.shared.capacity
            {
                return Err(Full(record));
            }
        }
        queue.push_back(record);
        drop(queue);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Append a record without waiting.
    pub fn try_push(&self, record: Record) -> Result<(), Full> {
        self.insert_now(record, false)
    }

    /// Insert a record at the head without waiting.
    ///
    /// The record will be the next one returned by a pop.
    pub fn try_push_front(&self, record: Record) -> Result<(), Full> {
        self.insert_now(record, true)
    }

    fn insert_now(&self, record: Record, front: bool) -> Result<(), Full> {
        let mut queue = self.shared.queue.lock();
        if queue.len() >= self.shared.capacity {
            return Err(Full(record));
        }
        if front {
            queue.push_front(record);
        } else {
            queue.push_back(record);
        }
        drop(queue);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head record, waiting up to `timeout` for one to arrive.
    ///
    /// `None` means the wait elapsed with the channel empty.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Record> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.queue.lock();
        loop {
            if let Some(record) = queue.pop_front() {
                drop(queue);
                self.shared.not_full.notify_one();
                return Some(record);
            }
            if self
                .shared
                .not_empty
                .wait_until(&mut queue, deadline)
                .timed_out()
                && queue.is_empty()
            {
                return None;
            }
        }
    }

    /// Remove the head record if one is queued.
    pub fn try_pop(&self) -> Option<Record> {
        let record = self.shared.queue.lock().pop_front();
        if record.is_some() {
            self.shared.not_full.notify_one();
        }
        record
    }

    /// Remove and return everything queued, head first.
    pub fn drain(&self) -> Vec<Record> {
        let drained: Vec<Record> = self.shared.queue.lock().drain(..).collect();
        if !drained.is_empty() {
            self.shared.not_full.notify_all();
        }
        drained
    }
}

impl Default for BoundedChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for BoundedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
