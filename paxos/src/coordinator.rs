use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use log::{error, info, warn};
use rand::Rng;

use crate::{
    Acceptor, AcceptorService, ConfigError, Decision, Error, EventSink, FaultModel, LogSink,
    Proposer, RetryPolicy,
};

/// Sizes of one trial.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Concurrent proposers, at least 1.
    pub proposers: u32,
    /// Shared acceptors, odd and at least 3.
    pub acceptors: usize,
    /// Retry policy given to every proposer.
    pub retry: RetryPolicy,
}

impl Config {
    /// Unbounded retries.
    pub fn new(proposers: u32, acceptors: usize) -> Self {
        Self {
            proposers,
            acceptors,
            retry: RetryPolicy::unbounded(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check the sizes before anything is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_acceptors(self.acceptors)?;
        if self.proposers < 1 {
            return Err(ConfigError::NoProposers);
        }
        Ok(())
    }
}

pub(crate) fn validate_acceptors(n: usize) -> Result<(), ConfigError> {
    if n < 3 {
        Err(ConfigError::TooFewAcceptors(n))
    } else if n % 2 != 1 {
        Err(ConfigError::EvenAcceptors(n))
    } else {
        Ok(())
    }
}

/// What every proposer of a trial decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrialOutcome<V> {
    /// Candidate of each proposer, indexed by id.
    pub candidates: Vec<V>,
    /// Decisions of the proposers that decided, in id order.
    pub decisions: Vec<Decision<V>>,
    /// Proposers that ran out of attempts under a bounded retry policy.
    pub undecided: Vec<u32>,
}

impl<V: PartialEq> TrialOutcome<V> {
    /// The value common to every decision, or `None` on disagreement or
    /// when nobody decided.
    pub fn agreed(&self) -> Option<&V> {
        let first = &self.decisions.first()?.value;
        if self.decisions.iter().all(|d| &d.value == first) {
            Some(first)
        } else {
            None
        }
    }

    /// Every proposer decided, and all on the same value.
    pub fn is_success(&self) -> bool {
        self.undecided.is_empty() && self.agreed().is_some()
    }

    /// Two proposers decided different values.
    pub fn disagrees(&self) -> bool {
        !self.decisions.is_empty() && self.agreed().is_none()
    }

    /// Every decided value was somebody's candidate.
    pub fn is_valid(&self) -> bool {
        self.decisions
            .iter()
            .all(|d| self.candidates.contains(&d.value))
    }

    /// Largest number of phase 1 attempts any proposer needed.
    pub fn max_attempts(&self) -> u64 {
        self.decisions.iter().map(|d| d.attempts).max().unwrap_or(0)
    }
}

/// Run one trial against fresh acceptors.
///
/// `candidate(id)` gives the value proposer `id` starts with. The trial waits
/// for every proposer without a timeout. A proposer that gives up under a
/// bounded retry policy is listed in [`TrialOutcome::undecided`]; the others
/// are still compared.
pub async fn run_trial<V, F>(
    config: &Config,
    faults: Arc<dyn FaultModel>,
    sink: Arc<dyn EventSink<V>>,
    candidate: F,
) -> Result<TrialOutcome<V>>
where
    V: Clone + Eq + Debug + Send + Sync + 'static,
    F: Fn(u32) -> V,
{
    config.validate().map_err(Error::from)?;
    let acceptors = (0..config.acceptors)
        .map(|i| Arc::new(Acceptor::new(i)) as Arc<dyn AcceptorService<V>>)
        .collect();
    run_trial_with(config, acceptors, faults, sink, candidate).await
}

/// Run one trial against the given acceptors, which may already hold state.
pub async fn run_trial_with<V, F>(
    config: &Config,
    acceptors: Vec<Arc<dyn AcceptorService<V>>>,
    faults: Arc<dyn FaultModel>,
    sink: Arc<dyn EventSink<V>>,
    candidate: F,
) -> Result<TrialOutcome<V>>
where
    V: Clone + Eq + Debug + Send + Sync + 'static,
    F: Fn(u32) -> V,
{
    config.validate().map_err(Error::from)?;
    if acceptors.len() != config.acceptors {
        return Err(Error::from(ConfigError::AcceptorMismatch {
            expected: config.acceptors,
            actual: acceptors.len(),
        })
        .into());
    }

    let candidates: Vec<V> = (0..config.proposers).map(candidate).collect();

    let mut proposers = Vec::with_capacity(candidates.len());
    for id in 0..config.proposers {
        let p = Proposer::new(
            id,
            config.proposers,
            acceptors.clone(),
            faults.clone(),
            sink.clone(),
        )
        .map_err(Error::from)?
        .with_retry(config.retry);
        proposers.push(p);
    }

    let handles = proposers
        .into_iter()
        .zip(candidates.iter().cloned())
        .map(|(mut p, v)| tokio::spawn(async move { p.run(v).await }));

    let mut decisions = Vec::with_capacity(candidates.len());
    let mut undecided = Vec::new();
    for joined in join_all(handles).await {
        match joined.map_err(|e| Error::ProposerPanicked(e.to_string()))? {
            Ok(decision) => decisions.push(decision),
            Err(e) => match e.downcast_ref::<Error>() {
                Some(Error::RetriesExhausted { proposer, attempts }) => {
                    warn!("[trial] proposer {} gave up after {} attempts", proposer, attempts);
                    undecided.push(*proposer);
                }
                _ => return Err(e),
            },
        }
    }

    let outcome = TrialOutcome {
        candidates,
        decisions,
        undecided,
    };
    if outcome.disagrees() {
        error!(
            "[trial] disagreement: {:?}",
            outcome.decisions.iter().map(|d| &d.value).collect::<Vec<_>>()
        );
    } else if let Some(v) = outcome.agreed() {
        info!("[trial] agreed on {:?}", v);
    }
    Ok(outcome)
}

/// Run one trial where every proposer starts with a random value in `0..2000`.
pub async fn run_random_trial(
    config: &Config,
    faults: Arc<dyn FaultModel>,
) -> Result<TrialOutcome<u32>> {
    run_trial(config, faults, Arc::new(LogSink), |_| {
        rand::thread_rng().gen_range(0..2000u32)
    })
    .await
}
