use std::collections::VecDeque;
use std::convert::TryFrom;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

/// Smallest number of acceptors that forms a strict majority.
pub fn majority(acceptors: usize) -> usize {
    acceptors / 2 + 1
}

/// Decides which acceptors a proposer reaches in a phase, and how long it
/// waits between steps.
///
/// A quorum smaller than a majority is allowed: the phase simply fails.
/// Indices out of range are skipped by the proposer.
pub trait FaultModel: Send + Sync {
    /// Acceptor indices to contact, in call order.
    fn quorum(&self, acceptors: usize) -> Vec<usize>;
    /// Pause before the next step.
    fn delay(&self) -> Duration;
}

/// Upper bound on the random pause used by [`RandomFaults::default`].
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(2);

/// Random majority in random order, with random pauses.
#[derive(Clone, Copy, Debug)]
pub struct RandomFaults {
    max_delay: Duration,
}

impl RandomFaults {
    /// Pauses are drawn uniformly from `[0, max_delay)`.
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }
}

impl Default for RandomFaults {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DELAY)
    }
}

impl FaultModel for RandomFaults {
    fn quorum(&self, acceptors: usize) -> Vec<usize> {
        if acceptors == 0 {
            return Vec::new();
        }
        let mut rng = rand::thread_rng();
        let mut chosen: Vec<usize> = (0..acceptors).collect();
        chosen.shuffle(&mut rng);
        chosen.truncate(rng.gen_range(majority(acceptors)..=acceptors));
        chosen
    }

    fn delay(&self) -> Duration {
        let nanos = u64::try_from(self.max_delay.as_nanos()).unwrap_or(u64::MAX);
        if nanos == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(0..nanos))
    }
}

/// Every acceptor, in index order, never pausing.
#[derive(Clone, Copy, Debug, Default)]
pub struct FullQuorum;

impl FaultModel for FullQuorum {
    fn quorum(&self, acceptors: usize) -> Vec<usize> {
        (0..acceptors).collect()
    }

    fn delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Replays the given quorums in order, one per phase across all proposers
/// sharing it, then behaves like [`FullQuorum`].
#[derive(Debug, Default)]
pub struct ScriptedFaults {
    script: Mutex<VecDeque<Vec<usize>>>,
}

impl ScriptedFaults {
    /// Script of quorums, consumed front to back.
    pub fn new(script: impl IntoIterator<Item = Vec<usize>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    /// Quorums not yet handed out.
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl FaultModel for ScriptedFaults {
    fn quorum(&self, acceptors: usize) -> Vec<usize> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| (0..acceptors).collect())
    }

    fn delay(&self) -> Duration {
        Duration::ZERO
    }
}
