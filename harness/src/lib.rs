//! Repeats Basic Paxos trials and tallies the ones that break agreement.

use std::sync::Arc;

use anyhow::Result;
use basic_paxos::{run_random_trial, Config, FaultModel};
use log::{info, warn};
use serde::Serialize;

/// Summary of a batch of trials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarnessReport {
    /// Proposers per trial.
    pub proposers: u32,
    /// Acceptors per trial.
    pub acceptors: usize,
    /// Trials run.
    pub trials: usize,
    /// Trials where proposers decided different values.
    pub wrong: usize,
    /// Trials where at least one proposer ran out of attempts.
    pub gave_up: usize,
    /// Trials where a decided value was nobody's candidate.
    pub invalid: usize,
    /// Most phase 1 attempts any single proposer needed.
    pub max_attempts: u64,
    /// Agreed value per trial, `None` for a wrong trial or one where
    /// nobody decided.
    pub decided: Vec<Option<u32>>,
}

impl HarnessReport {
    /// No trial broke agreement or validity. Gave-up trials do not fail
    /// the batch.
    pub fn passed(&self) -> bool {
        self.wrong == 0 && self.invalid == 0
    }
}

/// Run `trials` trials one after another. A rejected configuration aborts
/// before the first one. Proposers that give up under a bounded retry policy
/// are counted in [`HarnessReport::gave_up`] and the batch goes on.
pub async fn run_trials(
    config: &Config,
    faults: Arc<dyn FaultModel>,
    trials: usize,
) -> Result<HarnessReport> {
    config.validate()?;

    let mut report = HarnessReport {
        proposers: config.proposers,
        acceptors: config.acceptors,
        trials,
        wrong: 0,
        gave_up: 0,
        invalid: 0,
        max_attempts: 0,
        decided: Vec::with_capacity(trials),
    };

    for i in 0..trials {
        let outcome = run_random_trial(config, faults.clone()).await?;
        let agreed = outcome.agreed().copied();
        if outcome.disagrees() {
            warn!("[harness] trial {} disagreed: {:?}", i, outcome.decisions);
            report.wrong += 1;
        }
        if !outcome.undecided.is_empty() {
            warn!(
                "[harness] trial {} proposers {:?} gave up",
                i, outcome.undecided
            );
            report.gave_up += 1;
        }
        if !outcome.is_valid() {
            warn!("[harness] trial {} decided a value nobody proposed", i);
            report.invalid += 1;
        }
        report.max_attempts = report.max_attempts.max(outcome.max_attempts());
        report.decided.push(agreed);
    }

    info!(
        "[harness] trials:{} wrong:{} invalid:{} gave_up:{}",
        report.trials, report.wrong, report.invalid, report.gave_up
    );
    Ok(report)
}
