//! Single-slot timers keyed by logical job.
//!
//! Each [`JobId`] has at most one pending fire time. Arming a job replaces
//! its previous fire time; there is no cancel.

use crate::time::Timestamp;
use std::fmt;

/// Logical timers owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobId {
    /// First uplink after startup.
    Init,
    /// Regular uplink or duty-cycle retry.
    Send,
    /// Turn the indicator off.
    Blink,
}

impl JobId {
    /// Number of logical timers.
    pub const COUNT: usize = 3;

    /// All jobs, in tie-break order.
    pub const ALL: [JobId; Self::COUNT] = [Self::Init, Self::Send, Self::Blink];

    fn index(self) -> usize {
        match self {
            Self::Init => 0,
            Self::Send => 1,
            Self::Blink => 2,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Send => write!(f, "send"),
            Self::Blink => write!(f, "blink"),
        }
    }
}

/// Fire times of all logical timers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobTable {
    slots: [Option<Timestamp>; JobId::COUNT],
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `job` to fire at `at`, returning the fire time it replaced.
    pub fn arm(&mut self, job: JobId, at: Timestamp) -> Option<Timestamp> {
        self.slots[job.index()].replace(at)
    }

    /// Pending fire time of `job`.
    pub fn deadline(&self, job: JobId) -> Option<Timestamp> {
        self.slots[job.index()]
    }

    /// True if `job` is armed.
    pub fn is_armed(&self, job: JobId) -> bool {
        self.deadline(job).is_some()
    }

    /// Earliest pending job. Ties go to the job listed first in [`JobId::ALL`].
    pub fn next_deadline(&self) -> Option<(JobId, Timestamp)> {
        JobId::ALL
            .into_iter()
            .filter_map(|job| self.deadline(job).map(|at| (job, at)))
            .min_by_key(|&(job, at)| (at, job))
    }

    /// Disarm and return the earliest job due at `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<JobId> {
        let (job, at) = self.next_deadline()?;
        if at > now {
            return None;
        }
        self.slots[job.index()] = None;
        Some(job)
    }

    /// Number of armed jobs.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
