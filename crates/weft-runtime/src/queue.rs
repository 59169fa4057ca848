#![forbid(unsafe_code)]

//! Pending render tasks, one FIFO lane per priority.
//!
//! Identity is the unit: the `pending` map holds each unit's current
//! priority and the sequence number of its live lane entry. Escalation
//! pushes a new entry into the higher lane; the old entry goes stale and is
//! discarded when it reaches the front.

use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use ahash::AHashMap;
use weft_core::Priority;

use crate::unit::{Renderable, UnitId};

struct Entry {
    id: UnitId,
    seq: u64,
    priority: Priority,
    deadline: Duration,
    unit: Rc<dyn Renderable>,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    priority: Priority,
    seq: u64,
}

/// Task handed to the render phase.
pub(crate) struct Task {
    pub(crate) unit: Rc<dyn Renderable>,
    pub(crate) priority: Priority,
}

/// Outcome of [`RenderQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueued {
    New,
    Escalated { from: Priority },
    Unchanged { current: Priority },
}

#[derive(Default)]
pub(crate) struct RenderQueue {
    lanes: [VecDeque<Entry>; 3],
    pending: AHashMap<UnitId, Pending>,
    next_seq: u64,
}

impl RenderQueue {
    pub(crate) fn push(
        &mut self,
        unit: Rc<dyn Renderable>,
        priority: Priority,
        deadline: Duration,
    ) -> Enqueued {
        let id = unit.id();
        let previous = self.pending.get(&id).copied();
        if let Some(current) = previous
            && current.priority >= priority
        {
            return Enqueued::Unchanged {
                current: current.priority,
            };
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(id, Pending { priority, seq });
        self.lanes[priority.lane()].push_back(Entry {
            id,
            seq,
            priority,
            deadline,
            unit,
        });
        match previous {
            Some(p) => Enqueued::Escalated { from: p.priority },
            None => Enqueued::New,
        }
    }

    /// Most urgent live task, removed from the queue.
    pub(crate) fn pop(&mut self) -> Option<Task> {
        for lane in 0..self.lanes.len() {
            while let Some(entry) = self.lanes[lane].pop_front() {
                if self.is_live(&entry) {
                    self.pending.remove(&entry.id);
                    return Some(Task {
                        unit: entry.unit,
                        priority: entry.priority,
                    });
                }
            }
        }
        None
    }

    /// Earliest deadline of any live task, in any lane.
    ///
    /// Entries join a lane in deadline order, so each lane's first live entry
    /// carries that lane's earliest deadline.
    pub(crate) fn earliest_deadline(&mut self) -> Option<Duration> {
        let mut earliest = None;
        for lane in 0..self.lanes.len() {
            while let Some(front) = self.lanes[lane].front() {
                if self.is_live(front) {
                    let deadline = front.deadline;
                    earliest = Some(earliest.map_or(deadline, |e: Duration| e.min(deadline)));
                    break;
                }
                self.lanes[lane].pop_front();
            }
        }
        earliest
    }

    pub(crate) fn top_priority(&self) -> Option<Priority> {
        self.pending.values().map(|p| p.priority).max()
    }

    pub(crate) fn has_priority(&self, priority: Priority) -> bool {
        self.pending.values().any(|p| p.priority == priority)
    }

    pub(crate) fn contains(&self, id: UnitId) -> bool {
        self.pending.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn is_live(&self, entry: &Entry) -> bool {
        self.pending.get(&entry.id).is_some_and(|p| p.seq == entry.seq)
    }
}
