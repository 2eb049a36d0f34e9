use thiserror::Error;

/// A trial or round configuration that cannot run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Fewer than three acceptors.
    #[error("invalid acceptor count {0}: need at least 3")]
    TooFewAcceptors(usize),
    /// An even number of acceptors.
    #[error("invalid acceptor count {0}: must be odd")]
    EvenAcceptors(usize),
    /// No proposers at all.
    #[error("invalid proposer count: need at least 1")]
    NoProposers,
    /// A proposer id outside `[0, proposers)`.
    #[error("proposer id {id} out of range for {proposers} proposers")]
    ProposerOutOfRange {
        /// Offending id.
        id: u32,
        /// Configured proposer count.
        proposers: u32,
    },
    /// Supplied acceptor set does not match the configured count.
    #[error("expected {expected} acceptors, got {actual}")]
    AcceptorMismatch {
        /// Configured count.
        expected: usize,
        /// Supplied count.
        actual: usize,
    },
}

/// Errors surfaced by a round or a trial.
///
/// Failing to reach a quorum is not one of them; a proposer retries that.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before any protocol activity.
    #[error("rejected configuration: {0}")]
    Config(#[from] ConfigError),
    /// A bounded retry policy ran out.
    #[error("proposer {proposer} gave up after {attempts} attempts")]
    RetriesExhausted {
        /// Proposer id.
        proposer: u32,
        /// Attempts made.
        attempts: u64,
    },
    /// A proposer task did not complete.
    #[error("proposer task failed: {0}")]
    ProposerPanicked(String),
}
