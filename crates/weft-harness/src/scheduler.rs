#![forbid(unsafe_code)]

//! Deterministic host scheduler.
//!
//! [`ManualScheduler`] queues callbacks per [`Priority`] and runs them only
//! when the test asks. Time only moves through [`ManualScheduler::advance`],
//! and yield decisions come from a script, so every interleaving the updater
//! can produce is reproducible.
//!
//! # Invariants
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Order | Most urgent lane first, FIFO within a lane |
//! | Reentrancy | Tasks run with no internal borrow held; they may request more callbacks |
//! | Yields | `should_yield` pops the script front, `false` once it is empty |

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};
use weft_core::{EventClass, HostScheduler, HostTask, Priority, WeftError};

/// Upper bound on tasks run by one [`ManualScheduler::run_until_idle`].
pub const MAX_STEPS: usize = 10_000;

/// [`HostScheduler`] driven entirely by the test.
#[derive(Default)]
pub struct ManualScheduler {
    lanes: RefCell<[VecDeque<HostTask>; 3]>,
    clock: Cell<Duration>,
    yields: RefCell<VecDeque<bool>>,
    event: Cell<Option<EventClass>>,
    requested: RefCell<Vec<Priority>>,
    executed: Cell<usize>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.set(self.clock.get().saturating_add(by));
    }

    /// Queue answers for upcoming `should_yield` calls.
    pub fn script_yields(&self, answers: impl IntoIterator<Item = bool>) {
        self.yields.borrow_mut().extend(answers);
    }

    /// Set the event class reported by `current_event`.
    pub fn set_event(&self, event: Option<EventClass>) {
        self.event.set(event);
    }

    /// Every priority passed to `request_callback`, in request order.
    #[must_use]
    pub fn requested_priorities(&self) -> Vec<Priority> {
        self.requested.borrow().clone()
    }

    /// Callbacks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lanes.borrow().iter().map(VecDeque::len).sum()
    }

    /// Callbacks run so far.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.executed.get()
    }

    /// Run the most urgent callback. Returns `false` if none was queued.
    pub fn run_next(&self) -> Result<bool, WeftError> {
        let task = {
            let mut lanes = self.lanes.borrow_mut();
            lanes.iter_mut().find_map(VecDeque::pop_front)
        };
        let Some(task) = task else {
            return Ok(false);
        };
        self.executed.set(self.executed.get() + 1);
        task()?;
        Ok(true)
    }

    /// Run callbacks until none remain, stopping at the first error.
    ///
    /// Returns the number of callbacks run.
    pub fn run_until_idle(&self) -> Result<usize, WeftError> {
        let mut steps = 0;
        while steps < MAX_STEPS {
            if !self.run_next()? {
                debug!(steps, "scheduler idle");
                return Ok(steps);
            }
            steps += 1;
        }
        warn!(steps, pending = self.pending(), "scheduler did not settle");
        Ok(steps)
    }
}

impl HostScheduler for ManualScheduler {
    fn request_callback(&self, priority: Priority, task: HostTask) {
        self.requested.borrow_mut().push(priority);
        self.lanes.borrow_mut()[priority.lane()].push_back(task);
    }

    fn should_yield(&self) -> bool {
        self.yields.borrow_mut().pop_front().unwrap_or(false)
    }

    fn now(&self) -> Duration {
        self.clock.get()
    }

    fn current_event(&self) -> Option<EventClass> {
        self.event.get()
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .field("now", &self.clock.get())
            .field("event", &self.event.get())
            .finish()
    }
}
