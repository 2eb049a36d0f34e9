use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Proposal, ProposalNumber};

/// Reply to a phase 1 request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrepareReply<V> {
    /// Promise granted, with the proposal this acceptor accepted before (if any).
    Promised(Option<Proposal<V>>),
    /// The number was not higher than one already seen.
    Rejected,
}

impl<V> PrepareReply<V> {
    /// Whether the promise was granted.
    pub fn is_promised(&self) -> bool {
        matches!(self, PrepareReply::Promised(_))
    }
}

/// The two requests an acceptor serves. Each one is atomic with respect to
/// the others on the same acceptor.
#[async_trait]
pub trait AcceptorService<V: Send + 'static>: Send + Sync {
    /// Phase 1: ask for a promise to ignore anything numbered below `n`.
    async fn prepare(&self, n: ProposalNumber) -> PrepareReply<V>;
    /// Phase 2: ask to accept `value` under `n`.
    async fn accept(&self, n: ProposalNumber, value: V) -> bool;
}

/// State held by a single acceptor.
///
/// Transitions are pure and synchronous; [`Acceptor`] serializes access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptorState<V> {
    /// Highest number seen. Never decreases.
    pub max_n: Option<ProposalNumber>,
    /// Last accepted proposal.
    pub accepted: Option<Proposal<V>>,
}

impl<V> Default for AcceptorState<V> {
    fn default() -> Self {
        Self {
            max_n: None,
            accepted: None,
        }
    }
}

impl<V: Clone> AcceptorState<V> {
    /// Promise only on a strictly higher number. A repeated prepare with the
    /// number already promised is rejected.
    pub fn prepare(&mut self, n: ProposalNumber) -> PrepareReply<V> {
        // `accepted` is always empty while `max_n` is.
        if Some(n) > self.max_n {
            self.max_n = Some(n);
            PrepareReply::Promised(self.accepted.clone())
        } else {
            PrepareReply::Rejected
        }
    }

    /// Accept unless a higher number has been promised.
    pub fn accept(&mut self, n: ProposalNumber, value: V) -> bool {
        if Some(n) < self.max_n {
            return false;
        }
        self.max_n = Some(n);
        self.accepted = Some(Proposal { id: n, value });
        true
    }
}

/// An in-memory acceptor. Requests queue on an internal lock and are served
/// one at a time in arrival order.
#[derive(Debug)]
pub struct Acceptor<V> {
    id: usize,
    state: Mutex<AcceptorState<V>>,
}

impl<V> Acceptor<V> {
    /// Create an acceptor that has seen nothing.
    pub fn new(id: usize) -> Self {
        Self {
            id,
            state: Mutex::new(AcceptorState::default()),
        }
    }

    /// Index of this acceptor within its cluster.
    pub fn id(&self) -> usize {
        self.id
    }
}

impl<V: Clone> Acceptor<V> {
    /// Copy of the current state.
    pub async fn snapshot(&self) -> AcceptorState<V> {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl<V> AcceptorService<V> for Acceptor<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn prepare(&self, n: ProposalNumber) -> PrepareReply<V> {
        self.state.lock().await.prepare(n)
    }

    async fn accept(&self, n: ProposalNumber, value: V) -> bool {
        self.state.lock().await.accept(n, value)
    }
}
