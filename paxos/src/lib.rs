#![deny(missing_docs)]
#![deny(clippy::all)]
//! A basic paxos library.
//!
//! Single-decree Paxos run entirely in-process: a fixed set of [`Acceptor`]s
//! shared by concurrently running [`Proposer`]s. Message loss and reordering
//! are emulated by a pluggable [`FaultModel`] that picks a random majority
//! of acceptors for every phase and sleeps a random time between calls.

use std::fmt;

mod acceptor;
mod coordinator;
mod error;
mod event;
mod fault;
mod proposer;


pub use acceptor::{Acceptor, AcceptorService, AcceptorState, PrepareReply};
pub use coordinator::{run_random_trial, run_trial, run_trial_with, Config, TrialOutcome};
pub use error::{ConfigError, Error};
pub use event::{Event, EventSink, LogSink, NoopSink};
pub use fault::{
    majority, FaultModel, FullQuorum, RandomFaults, ScriptedFaults, DEFAULT_MAX_DELAY,
};
pub use proposer::{Decision, Phase, Proposer, RetryPolicy};

/// Number ordering competing proposals.
///
/// "No number" is `Option<ProposalNumber>::None`, which sorts below every
/// `Some`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProposalNumber(u64);

impl ProposalNumber {
    /// Wrap a raw number.
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// The raw number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ProposalNumber {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Display for ProposalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Proposal with id and value.
///
/// id is unique for different round of different proposer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Proposal<V> {
    /// Number the value was accepted under.
    pub id: ProposalNumber,
    /// The accepted value.
    pub value: V,
}
