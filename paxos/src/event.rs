use std::fmt::Debug;

use log::{debug, info, trace};

use crate::{Phase, Proposal, ProposalNumber};

/// One step of a proposer's round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event<V> {
    /// A phase begins against `quorum` acceptors.
    PhaseStarted {
        /// `Preparing` or `Accepting`.
        phase: Phase,
        /// Number used for this attempt.
        proposal: ProposalNumber,
        /// Value carried by the proposer at this point.
        value: V,
        /// How many acceptors will be asked.
        quorum: usize,
    },
    /// An acceptor answered a prepare.
    PrepareReplied {
        /// Acceptor index.
        acceptor: usize,
        /// Number asked for.
        proposal: ProposalNumber,
        /// Whether the promise was granted.
        promised: bool,
        /// Previously accepted proposal reported with the promise.
        prior: Option<Proposal<V>>,
    },
    /// An acceptor answered an accept.
    AcceptReplied {
        /// Acceptor index.
        acceptor: usize,
        /// Number asked for.
        proposal: ProposalNumber,
        /// Whether the value was accepted.
        accepted: bool,
    },
    /// A majority of all acceptors said yes.
    PhaseSucceeded {
        /// `Preparing` or `Accepting`.
        phase: Phase,
        /// Number used for this attempt.
        proposal: ProposalNumber,
        /// Value going forward.
        value: V,
        /// Positive replies.
        votes: usize,
        /// Acceptors asked.
        asked: usize,
    },
    /// The phase missed a majority; the attempt is abandoned.
    PhaseFailed {
        /// `Preparing` or `Accepting`.
        phase: Phase,
        /// Number used for this attempt.
        proposal: ProposalNumber,
        /// Positive replies.
        votes: usize,
        /// Acceptors asked.
        asked: usize,
    },
    /// The round is over.
    Decided {
        /// Number the value was chosen under.
        proposal: ProposalNumber,
        /// Chosen value.
        value: V,
        /// Phase 1 attempts made.
        attempts: u64,
    },
}

impl<V> Event<V> {
    /// Number this event concerns.
    pub fn proposal(&self) -> ProposalNumber {
        match self {
            Event::PhaseStarted { proposal, .. }
            | Event::PrepareReplied { proposal, .. }
            | Event::AcceptReplied { proposal, .. }
            | Event::PhaseSucceeded { proposal, .. }
            | Event::PhaseFailed { proposal, .. }
            | Event::Decided { proposal, .. } => *proposal,
        }
    }
}

/// Receives every event of every proposer in a trial.
pub trait EventSink<V>: Send + Sync {
    /// Called synchronously from the proposer's task.
    fn record(&self, proposer: u32, event: Event<V>);
}

/// Forwards events to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl<V: Debug> EventSink<V> for LogSink {
    fn record(&self, p: u32, event: Event<V>) {
        match event {
            Event::PhaseStarted {
                phase,
                proposal,
                value,
                quorum,
            } => debug!(
                "[proposer {} - {:?} - start] N:{} V:{:?} quorum:{}",
                p, phase, proposal, value, quorum
            ),
            Event::PrepareReplied {
                acceptor,
                proposal,
                promised,
                prior,
            } => trace!(
                "[proposer {}] prepare({}) -> acc-{}: promised:{} prior:{:?}",
                p,
                proposal,
                acceptor,
                promised,
                prior
            ),
            Event::AcceptReplied {
                acceptor,
                proposal,
                accepted,
            } => trace!(
                "[proposer {}] accept({}) -> acc-{}: accepted:{}",
                p,
                proposal,
                acceptor,
                accepted
            ),
            Event::PhaseSucceeded {
                phase,
                proposal,
                value,
                votes,
                asked,
            } => debug!(
                "[proposer {} - {:?} - succ ] N:{} V:{:?} votes:{}/{}",
                p, phase, proposal, value, votes, asked
            ),
            Event::PhaseFailed {
                phase,
                proposal,
                votes,
                asked,
            } => debug!(
                "[proposer {} - {:?} - fail ] N:{} votes:{}/{}",
                p, phase, proposal, votes, asked
            ),
            Event::Decided {
                proposal,
                value,
                attempts,
            } => info!(
                "[proposer {}] decided V:{:?} under N:{} after {} attempts",
                p, value, proposal, attempts
            ),
        }
    }
}

/// Drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl<V> EventSink<V> for NoopSink {
    fn record(&self, _proposer: u32, _event: Event<V>) {}
}
