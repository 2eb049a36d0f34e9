use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use tokio::time;

use crate::coordinator::validate_acceptors;
use crate::{
    majority, AcceptorService, ConfigError, Error, Event, EventSink, FaultModel, PrepareReply,
    Proposal, ProposalNumber,
};

/// Where a proposer is in its round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Soliciting promises.
    Preparing,
    /// Soliciting acceptances.
    Accepting,
    /// A majority accepted; the round is over.
    Decided,
}

/// How many phase 1 attempts a proposer may make.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u64>,
}

impl RetryPolicy {
    /// Retry until decided.
    pub const fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    /// Give up after `n` attempts.
    pub const fn bounded(n: u64) -> Self {
        Self {
            max_attempts: Some(n),
        }
    }

    fn exhausted(&self, attempts: u64) -> bool {
        matches!(self.max_attempts, Some(max) if attempts >= max)
    }
}

/// Outcome of a finished round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision<V> {
    /// Proposer id.
    pub proposer: u32,
    /// Chosen value.
    pub value: V,
    /// Number the value was accepted under.
    pub proposal: ProposalNumber,
    /// Phase 1 attempts made, 1 if the first one went through.
    pub attempts: u64,
}

/// A proposer driving one round to a decision.
///
/// Proposal numbers are `id + k * proposers` for `k = 1, 2, ...`, so they
/// increase per proposer and never collide across proposers.
pub struct Proposer<V: Send + 'static> {
    id: u32,
    proposers: u32,
    acceptors: Vec<Arc<dyn AcceptorService<V>>>,
    faults: Arc<dyn FaultModel>,
    sink: Arc<dyn EventSink<V>>,
    retry: RetryPolicy,

    phase: Phase,
    proposal: ProposalNumber,
    attempts: u64,
}

impl<V> Proposer<V>
where
    V: Clone + Debug + Send + Sync + 'static,
{
    /// Create proposer `id` of `proposers`, talking to `acceptors`.
    pub fn new(
        id: u32,
        proposers: u32,
        acceptors: Vec<Arc<dyn AcceptorService<V>>>,
        faults: Arc<dyn FaultModel>,
        sink: Arc<dyn EventSink<V>>,
    ) -> Result<Self, ConfigError> {
        validate_acceptors(acceptors.len())?;
        if id >= proposers {
            return Err(ConfigError::ProposerOutOfRange { id, proposers });
        }
        Ok(Self {
            id,
            proposers,
            acceptors,
            faults,
            sink,
            retry: RetryPolicy::unbounded(),
            phase: Phase::Preparing,
            proposal: ProposalNumber::new(u64::from(id) + u64::from(proposers)),
            attempts: 0,
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Proposer id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of the current (or deciding) attempt.
    pub fn proposal(&self) -> ProposalNumber {
        self.proposal
    }

    /// Phase 1 attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Run phases 1 and 2 until a majority accepts. `candidate` is proposed
    /// unless a promise reports an already accepted value.
    pub async fn run(&mut self, candidate: V) -> Result<Decision<V>> {
        let majority = majority(self.acceptors.len());
        let mut value = candidate;

        loop {
            self.attempts += 1;
            let n = self.proposal;

            self.phase = Phase::Preparing;
            if let Some(chosen) = self.prepare(n, &value, majority).await {
                value = chosen;

                self.phase = Phase::Accepting;
                if self.accept(n, &value, majority).await {
                    self.phase = Phase::Decided;
                    self.sink.record(
                        self.id,
                        Event::Decided {
                            proposal: n,
                            value: value.clone(),
                            attempts: self.attempts,
                        },
                    );
                    return Ok(Decision {
                        proposer: self.id,
                        value,
                        proposal: n,
                        attempts: self.attempts,
                    });
                }
            }

            if self.retry.exhausted(self.attempts) {
                return Err(Error::RetriesExhausted {
                    proposer: self.id,
                    attempts: self.attempts,
                }
                .into());
            }
            self.proposal = ProposalNumber::new(n.get() + u64::from(self.proposers));
        }
    }

    /// Phase 1. Returns the value to carry into phase 2 if a majority
    /// promised: the one accepted under the highest reported number, or
    /// `value` when nobody reported one.
    async fn prepare(&self, n: ProposalNumber, value: &V, majority: usize) -> Option<V> {
        self.pause().await;
        let quorum = self.faults.quorum(self.acceptors.len());
        self.sink.record(
            self.id,
            Event::PhaseStarted {
                phase: Phase::Preparing,
                proposal: n,
                value: value.clone(),
                quorum: quorum.len(),
            },
        );

        let mut promises = 0;
        let mut highest: Option<Proposal<V>> = None;
        for &i in &quorum {
            let acceptor = match self.acceptors.get(i) {
                Some(a) => a,
                None => continue,
            };
            self.pause().await;
            let reply = acceptor.prepare(n).await;
            let promised = reply.is_promised();
            let prior = match reply {
                PrepareReply::Promised(prior) => prior,
                PrepareReply::Rejected => None,
            };
            self.sink.record(
                self.id,
                Event::PrepareReplied {
                    acceptor: i,
                    proposal: n,
                    promised,
                    prior: prior.clone(),
                },
            );

            if promised {
                promises += 1;
            }
            if let Some(p) = prior {
                if highest.as_ref().map(|h| h.id) < Some(p.id) {
                    highest = Some(p);
                }
            }
        }

        if promises < majority {
            self.sink.record(
                self.id,
                Event::PhaseFailed {
                    phase: Phase::Preparing,
                    proposal: n,
                    votes: promises,
                    asked: quorum.len(),
                },
            );
            return None;
        }

        let value = highest.map_or_else(|| value.clone(), |p| p.value);
        self.sink.record(
            self.id,
            Event::PhaseSucceeded {
                phase: Phase::Preparing,
                proposal: n,
                value: value.clone(),
                votes: promises,
                asked: quorum.len(),
            },
        );
        Some(value)
    }

    /// Phase 2 against a freshly chosen quorum.
    async fn accept(&self, n: ProposalNumber, value: &V, majority: usize) -> bool {
        self.pause().await;
        let quorum = self.faults.quorum(self.acceptors.len());
        self.sink.record(
            self.id,
            Event::PhaseStarted {
                phase: Phase::Accepting,
                proposal: n,
                value: value.clone(),
                quorum: quorum.len(),
            },
        );

        let mut accepted = 0;
        for &i in &quorum {
            let acceptor = match self.acceptors.get(i) {
                Some(a) => a,
                None => continue,
            };
            self.pause().await;
            let ok = acceptor.accept(n, value.clone()).await;
            self.sink.record(
                self.id,
                Event::AcceptReplied {
                    acceptor: i,
                    proposal: n,
                    accepted: ok,
                },
            );
            if ok {
                accepted += 1;
            }
        }

        if accepted < majority {
            self.sink.record(
                self.id,
                Event::PhaseFailed {
                    phase: Phase::Accepting,
                    proposal: n,
                    votes: accepted,
                    asked: quorum.len(),
                },
            );
            return false;
        }
        self.sink.record(
            self.id,
            Event::PhaseSucceeded {
                phase: Phase::Accepting,
                proposal: n,
                value: value.clone(),
                votes: accepted,
                asked: quorum.len(),
            },
        );
        true
    }

    /// Yield to the scheduler for a delay picked by the fault model.
    async fn pause(&self) {
        let dt = self.faults.delay();
        if dt.is_zero() {
            tokio::task::yield_now().await;
        } else {
            time::sleep(dt).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{acceptor_cluster, as_services, RecordingSink};
    use crate::{FullQuorum, NoopSink, ScriptedFaults};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replays quorums like [`ScriptedFaults`] and counts the pauses taken.
    struct CountingFaults {
        script: ScriptedFaults,
        delay: Duration,
        pauses: AtomicUsize,
    }

    impl CountingFaults {
        fn new(script: Vec<Vec<usize>>, delay: Duration) -> Self {
            Self {
                script: ScriptedFaults::new(script),
                delay,
                pauses: AtomicUsize::new(0),
            }
        }

        fn pauses(&self) -> usize {
            self.pauses.load(Ordering::SeqCst)
        }
    }

    impl FaultModel for CountingFaults {
        fn quorum(&self, acceptors: usize) -> Vec<usize> {
            self.script.quorum(acceptors)
        }

        fn delay(&self) -> Duration {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            self.delay
        }
    }

    fn proposer(
        id: u32,
        proposers: u32,
        acceptors: Vec<Arc<dyn AcceptorService<String>>>,
        faults: Arc<dyn FaultModel>,
        sink: Arc<dyn EventSink<String>>,
    ) -> Proposer<String> {
        Proposer::new(id, proposers, acceptors, faults, sink).unwrap()
    }

    #[tokio::test]
    async fn uncontended_proposer_decides_own_value_first_try() {
        let cluster = acceptor_cluster::<String>(3);
        let sink = Arc::new(RecordingSink::<String>::new());
        let mut p = proposer(0, 1, as_services(&cluster), Arc::new(FullQuorum), sink.clone());

        let d = p.run("mine".to_string()).await.unwrap();
        assert_eq!(d.value, "mine");
        assert_eq!(d.attempts, 1);
        assert_eq!(d.proposal, ProposalNumber::new(1));
        assert_eq!(p.phase(), Phase::Decided);

        let replies: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|(_, e)| match e {
                Event::PrepareReplied {
                    promised, prior, ..
                } => Some((promised, prior)),
                _ => None,
            })
            .collect();
        assert_eq!(replies, vec![(true, None); 3]);

        for a in &cluster {
            let s = a.snapshot().await;
            assert_eq!(
                s.accepted,
                Some(Proposal {
                    id: ProposalNumber::new(1),
                    value: "mine".to_string()
                })
            );
        }
    }

    #[tokio::test]
    async fn adopts_value_with_highest_prior_number() {
        let cluster = acceptor_cluster::<String>(3);
        assert!(cluster[0].accept(ProposalNumber::new(2), "old".into()).await);
        assert!(cluster[1].accept(ProposalNumber::new(4), "newer".into()).await);

        // id 2 of 3 starts at 5, above both prior numbers.
        let mut p = proposer(2, 3, as_services(&cluster), Arc::new(FullQuorum), Arc::new(NoopSink));
        let d = p.run("mine".to_string()).await.unwrap();

        assert_eq!(d.value, "newer");
        assert_eq!(d.attempts, 1);
        assert_eq!(d.proposal, ProposalNumber::new(5));
    }

    #[tokio::test]
    async fn equal_number_prepare_forces_higher_retry() {
        let cluster = acceptor_cluster::<String>(3);
        for a in &cluster[..2] {
            assert!(a.prepare(ProposalNumber::new(1)).await.is_promised());
        }

        let mut p = proposer(0, 1, as_services(&cluster), Arc::new(FullQuorum), Arc::new(NoopSink));
        let d = p.run("v".to_string()).await.unwrap();
        assert_eq!(d.attempts, 2);
        assert_eq!(d.proposal, ProposalNumber::new(2));
    }

    #[tokio::test]
    async fn minority_quorum_fails_then_retries() {
        let cluster = acceptor_cluster::<String>(3);
        let sink = Arc::new(RecordingSink::<String>::new());
        let faults = Arc::new(ScriptedFaults::new(vec![vec![0]]));
        let mut p = proposer(1, 2, as_services(&cluster), faults, sink.clone());

        let d = p.run("v".to_string()).await.unwrap();
        assert_eq!(d.attempts, 2);
        assert_eq!(d.proposal, ProposalNumber::new(5));

        let failed = sink
            .events()
            .into_iter()
            .filter(|(_, e)| matches!(e, Event::PhaseFailed { .. }))
            .count();
        assert_eq!(failed, 1);
        assert_eq!(sink.proposals(1), vec![3, 5].into_iter().map(ProposalNumber::new).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn phase_two_minority_abandons_attempt() {
        let cluster = acceptor_cluster::<String>(5);
        // Phase 1 full, phase 2 reaches two acceptors only.
        let faults = Arc::new(ScriptedFaults::new(vec![vec![0, 1, 2, 3, 4], vec![3, 4]]));
        let mut p = proposer(0, 1, as_services(&cluster), faults, Arc::new(NoopSink));

        let d = p.run("v".to_string()).await.unwrap();
        assert_eq!(d.attempts, 2);
        assert_eq!(d.value, "v");
    }

    #[tokio::test]
    async fn pauses_once_per_phase_and_per_acceptor() {
        let cluster = acceptor_cluster::<String>(3);
        let faults = Arc::new(CountingFaults::new(vec![], Duration::ZERO));
        let mut p = proposer(0, 1, as_services(&cluster), faults.clone(), Arc::new(NoopSink));

        p.run("v".to_string()).await.unwrap();
        // One pause before each phase, one before each of the 3 calls.
        assert_eq!(faults.pauses(), 2 * (1 + 3));
    }

    #[tokio::test]
    async fn pauses_follow_quorum_size_across_retries() {
        let cluster = acceptor_cluster::<String>(5);
        // Phase 1 reaches one acceptor and fails, then the retry goes through
        // with a 3-acceptor phase 1 and a full phase 2.
        let faults = Arc::new(CountingFaults::new(
            vec![vec![4], vec![0, 2, 4]],
            Duration::from_micros(10),
        ));
        let mut p = proposer(0, 1, as_services(&cluster), faults.clone(), Arc::new(NoopSink));

        let d = p.run("v".to_string()).await.unwrap();
        assert_eq!(d.attempts, 2);
        assert_eq!(faults.pauses(), (1 + 1) + (1 + 3) + (1 + 5));
    }

    #[tokio::test]
    async fn bounded_retry_gives_up() {
        let cluster = acceptor_cluster::<String>(3);
        let faults = Arc::new(ScriptedFaults::new(vec![vec![0]; 10]));
        let mut p = proposer(0, 1, as_services(&cluster), faults, Arc::new(NoopSink))
            .with_retry(RetryPolicy::bounded(3));

        let err = p.run("v".to_string()).await.unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::RetriesExhausted { proposer, attempts }) => {
                assert_eq!(*proposer, 0);
                assert_eq!(*attempts, 3);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(p.attempts(), 3);
    }

    #[test]
    fn rejects_bad_acceptor_counts() {
        for (n, expect) in vec![
            (2, ConfigError::TooFewAcceptors(2)),
            (4, ConfigError::EvenAcceptors(4)),
        ] {
            let cluster = acceptor_cluster::<String>(n);
            let res = Proposer::new(
                0,
                1,
                as_services(&cluster),
                Arc::new(FullQuorum),
                Arc::new(NoopSink),
            );
            assert_eq!(res.err(), Some(expect));
        }
    }

    #[test]
    fn rejects_out_of_range_id() {
        let cluster = acceptor_cluster::<String>(3);
        let res = Proposer::new(3, 3, as_services(&cluster), Arc::new(FullQuorum), Arc::new(NoopSink));
        assert_eq!(
            res.err(),
            Some(ConfigError::ProposerOutOfRange { id: 3, proposers: 3 })
        );
    }
}
