//! SCPI probing engine
//!
//! A single [`Prober`] drives every probing mode. Batch runs (`test`, `group`,
//! `fuzz`) record one result per command sent. Discovery runs (`learn`,
//! `smart-learn`, `focus`) also collect commands that answered and were not
//! already known.
//!
//! Commands matching a skip pattern are never sent. A Ctrl+C stops the current
//! loop at the next await point; the run is marked interrupted and keeps what
//! it collected so far.

pub mod candidates;
pub mod outcome;

pub use candidates::{focus_candidates, query_form, smart_pools, CandidateGenerator};
pub use outcome::{ProbeOutcome, ProbeRecord, ProbeRun};

use crate::adapters::ScpiTransport;
use crate::console::{Reporter, Tone};
use crate::interrupt::Interrupt;
use crate::pinky::Chatter;
use rand::Rng;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Case-insensitive key used to compare commands
fn command_key(cmd: &str) -> String {
    cmd.trim().to_uppercase()
}

/// Drives one probing run against an open transport.
pub struct Prober<'a> {
    transport: &'a mut dyn ScpiTransport,
    reporter: &'a Reporter,
    interrupt: Interrupt,
    skip_patterns: Vec<String>,
    dry_run: bool,
    chatter: Option<Chatter>,
}

impl<'a> Prober<'a> {
    /// Prober with no skip patterns, dry-run off and no chatter
    pub fn new(transport: &'a mut dyn ScpiTransport, reporter: &'a Reporter, interrupt: Interrupt) -> Self {
        Self {
            transport,
            reporter,
            interrupt,
            skip_patterns: Vec::new(),
            dry_run: false,
            chatter: None,
        }
    }

    /// Commands containing any of these substrings are never sent
    pub fn with_skip_patterns(mut self, patterns: &[String]) -> Self {
        self.skip_patterns = patterns.iter().filter(|p| !p.is_empty()).cloned().collect();
        self
    }

    /// Record [`ProbeOutcome::DryRun`] instead of sending anything
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Print Pinky chatter after each discovery probe
    pub fn with_chatter(mut self, chatter: Chatter) -> Self {
        self.chatter = Some(chatter);
        self
    }

    /// Chatter follows probes the instrument answered without raising
    fn chatter_after(&mut self, outcome: &ProbeOutcome) {
        if matches!(outcome, ProbeOutcome::Error(_)) {
            return;
        }
        if let Some(chatter) = self.chatter.as_mut() {
            chatter.after_probe(self.reporter);
        }
    }

    /// Whether `cmd` matches a skip pattern
    pub fn is_skipped(&self, cmd: &str) -> bool {
        self.skip_patterns.iter().any(|p| cmd.contains(p.as_str()))
    }

    /// Send one query and classify it.
    ///
    /// Returns `None` when the interrupt fired before the response arrived.
    pub async fn probe(&mut self, cmd: &str) -> Option<ProbeOutcome> {
        if self.interrupt.is_triggered() {
            return None;
        }
        if self.dry_run {
            return Some(ProbeOutcome::DryRun);
        }

        let interrupt = self.interrupt.clone();
        let outcome = tokio::select! {
            biased;
            _ = interrupt.triggered() => return None,
            result = self.transport.query(cmd) => ProbeOutcome::classify(result),
        };
        trace!(cmd, status = outcome.status(), "Probe complete");
        Some(outcome)
    }

    /// Probe every command once, in order (`test`, `group`).
    pub async fn run_batch(&mut self, commands: &[String]) -> ProbeRun {
        let mut run = ProbeRun::default();
        let total = commands.len();

        for (i, cmd) in commands.iter().enumerate() {
            if self.is_skipped(cmd) {
                self.reporter.warn(format!("⏭️ Skipped {}", cmd));
                run.skipped.push(cmd.clone());
                continue;
            }
            let Some(outcome) = self.probe(cmd).await else {
                run.interrupted = true;
                break;
            };
            self.reporter.progress(i + 1, total, cmd, &outcome);
            run.results.push(ProbeRecord::new(cmd.as_str(), outcome));
        }

        debug!(
            sent = run.results.len(),
            skipped = run.skipped.len(),
            interrupted = run.interrupted,
            "Batch finished"
        );
        run
    }

    /// Send `attempts` random candidates, each distinct command at most once.
    pub async fn fuzz<R: Rng>(&mut self, generator: &mut CandidateGenerator<R>, attempts: usize) -> ProbeRun {
        let mut run = ProbeRun::default();
        let mut seen = HashSet::new();

        for i in 0..attempts {
            let Some(cmd) = generator.next_candidate() else {
                break;
            };
            if !seen.insert(command_key(&cmd)) {
                continue;
            }
            if self.is_skipped(&cmd) {
                run.skipped.push(cmd);
                continue;
            }
            let Some(outcome) = self.probe(&cmd).await else {
                run.interrupted = true;
                break;
            };
            self.reporter.progress(i + 1, attempts, &cmd, &outcome);
            run.results.push(ProbeRecord::new(cmd, outcome));
        }
        run
    }

    /// Random discovery (`learn`, `smart-learn`).
    ///
    /// Candidates already in `known`, already tried this run, or matching a skip
    /// pattern are dropped without being sent. Only answering commands are kept;
    /// errors and empty responses are discarded.
    pub async fn learn<R: Rng>(
        &mut self,
        generator: &mut CandidateGenerator<R>,
        attempts: usize,
        known: &[String],
    ) -> ProbeRun {
        let known: HashSet<String> = known.iter().map(|c| command_key(c)).collect();
        let mut tried = HashSet::new();
        let mut run = ProbeRun::default();

        for _ in 0..attempts {
            let Some(cmd) = generator.next_candidate() else {
                break;
            };
            let key = command_key(&cmd);
            if known.contains(&key) || !tried.insert(key) {
                continue;
            }
            if self.is_skipped(&cmd) {
                run.skipped.push(cmd);
                continue;
            }

            let Some(outcome) = self.probe(&cmd).await else {
                run.interrupted = true;
                break;
            };
            self.chatter_after(&outcome);

            match outcome {
                ProbeOutcome::DryRun => {
                    self.reporter.line(Tone::Gray, format!("🧠 Would test: {}", cmd));
                    run.results.push(ProbeRecord::new(cmd, outcome));
                }
                ProbeOutcome::Success(ref text) => {
                    self.reporter.success(format!("🧠 Learned: {} → {}", cmd, text));
                    let record = ProbeRecord::new(cmd, outcome.clone());
                    run.results.push(record.clone());
                    run.discovered.push(record);
                }
                ProbeOutcome::Empty | ProbeOutcome::Error(_) => {
                    trace!(cmd = %cmd, outcome = %outcome, "Candidate rejected");
                }
            }
        }

        debug!(
            discovered = run.discovered.len(),
            interrupted = run.interrupted,
            "Discovery finished"
        );
        run
    }

    /// Deterministic sweep over prepared candidates (`focus`).
    ///
    /// Every outcome is recorded; answering commands not in `known` are
    /// discovered once.
    pub async fn focus(&mut self, candidates: &[String], known: &[String]) -> ProbeRun {
        let known: HashSet<String> = known.iter().map(|c| command_key(c)).collect();
        let mut found = HashSet::new();
        let mut run = ProbeRun::default();
        let total = candidates.len();

        for (i, cmd) in candidates.iter().enumerate() {
            if self.is_skipped(cmd) {
                self.reporter.warn(format!("⏭️ Skipped {}", cmd));
                run.skipped.push(cmd.clone());
                continue;
            }
            let Some(outcome) = self.probe(cmd).await else {
                run.interrupted = true;
                break;
            };
            self.chatter_after(&outcome);
            self.reporter.progress(i + 1, total, cmd, &outcome);

            let key = command_key(cmd);
            let record = ProbeRecord::new(cmd.as_str(), outcome);
            if record.outcome.is_success() && !known.contains(&key) && found.insert(key) {
                run.discovered.push(record.clone());
            }
            run.results.push(record);
        }
        run
    }
}
