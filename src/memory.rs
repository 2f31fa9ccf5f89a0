#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Per-job, in-memory record of repair attempts. Created at job start,
//! dropped at job completion; never persisted. A restarted orchestrator gets
//! a fresh memory, which is why stale running jobs are failed on recovery
//! instead of resumed.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::types::JobId;

pub const MAX_HISTORY: usize = 10;
pub const MAX_SAME_ERROR_TOLERANCE: u32 = 2;
const ALL_FAIL_ATTEMPT_FLOOR: usize = 3;

/// One recorded coach repair attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairAttempt {
    pub round: u32,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<String>,
    pub success: bool,
    pub error_signature: String,
    pub error_description: String,
    pub fix_summary: String,
}

/// Per-job repair memory driving the termination verdict
#[derive(Debug)]
pub struct SessionMemory {
    job_id: JobId,
    history: VecDeque<RepairAttempt>,
    signature_counts: HashMap<String, u32>,
    repaired_files: HashSet<String>,
    last_error_signature: Option<String>,
    consecutive_same_error: u32,
    max_history: usize,
    same_error_tolerance: u32,
}

impl SessionMemory {
    #[must_use]
    pub fn new(job_id: JobId) -> Self {
        Self::with_limits(job_id, MAX_HISTORY, MAX_SAME_ERROR_TOLERANCE)
    }

    #[must_use]
    pub fn with_limits(job_id: JobId, max_history: usize, same_error_tolerance: u32) -> Self {
        Self {
            job_id,
            history: VecDeque::new(),
            signature_counts: HashMap::new(),
            repaired_files: HashSet::new(),
            last_error_signature: None,
            consecutive_same_error: 0,
            max_history: max_history.max(1),
            same_error_tolerance: same_error_tolerance.max(1),
        }
    }

    #[must_use]
    pub const fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Appends an attempt, evicting the oldest beyond the history cap, and
    /// unions the touched files into the repaired set.
    pub fn record_attempt(
        &mut self,
        round: u32,
        files: Vec<String>,
        success: bool,
        error_signature: impl Into<String>,
        error_description: impl Into<String>,
        fix_summary: impl Into<String>,
    ) {
        for file in &files {
            self.repaired_files.insert(file.clone());
        }
        self.history.push_back(RepairAttempt {
            round,
            timestamp: Utc::now(),
            files,
            success,
            error_signature: error_signature.into(),
            error_description: error_description.into(),
            fix_summary: fix_summary.into(),
        });
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    /// Flags the most recent attempt as successful. Called when a later
    /// validation shows the repair advanced past the gate it targeted.
    pub fn mark_last_attempt_succeeded(&mut self) {
        if let Some(last) = self.history.back_mut() {
            last.success = true;
        }
    }

    /// Tracks the signature run-length. Returns true once the same signature
    /// has been seen `same_error_tolerance` times in a row.
    pub fn record_error_signature(&mut self, signature: &str) -> bool {
        if self.last_error_signature.as_deref() == Some(signature) {
            self.consecutive_same_error += 1;
        } else {
            self.last_error_signature = Some(signature.to_string());
            self.consecutive_same_error = 1;
        }
        *self
            .signature_counts
            .entry(signature.to_string())
            .or_insert(0) += 1;

        self.consecutive_same_error >= self.same_error_tolerance
    }

    /// Termination verdict: repeated identical errors, or a full history of
    /// failures with nothing to show for it.
    #[must_use]
    pub fn should_terminate(&self) -> bool {
        if self.consecutive_same_error >= self.same_error_tolerance {
            return true;
        }
        self.history.len() >= ALL_FAIL_ATTEMPT_FLOOR && self.success_count() == 0
    }

    #[must_use]
    pub fn has_repaired_file(&self, path: &str) -> bool {
        self.repaired_files.contains(path)
    }

    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn success_count(&self) -> usize {
        self.history.iter().filter(|a| a.success).count()
    }

    #[must_use]
    pub fn signature_occurrences(&self, signature: &str) -> u32 {
        self.signature_counts.get(signature).copied().unwrap_or(0)
    }

    #[must_use]
    pub const fn consecutive_same_error_count(&self) -> u32 {
        self.consecutive_same_error
    }

    #[must_use]
    pub fn last_error_signature(&self) -> Option<&str> {
        self.last_error_signature.as_deref()
    }

    #[must_use]
    pub fn attempts(&self) -> impl Iterator<Item = &RepairAttempt> {
        self.history.iter()
    }

    /// Renders the briefing handed to the coach before a repair round:
    /// what was tried, what kept failing, and whether the loop is stuck.
    #[must_use]
    pub fn build_coach_context(&self) -> String {
        if self.history.is_empty() {
            return "No repair attempts so far. This is the first repair round.".to_string();
        }

        let mut context = String::from("Previous repair attempts:\n");
        for attempt in &self.history {
            let verdict = if attempt.success { "fixed" } else { "failed" };
            context.push_str(&format!(
                "- round {} [{}] {}: {}\n",
                attempt.round,
                verdict,
                attempt.files.iter().join(", "),
                if attempt.error_description.is_empty() {
                    &attempt.error_signature
                } else {
                    &attempt.error_description
                },
            ));
            if !attempt.fix_summary.is_empty() {
                context.push_str(&format!("  tried: {}\n", attempt.fix_summary));
            }
        }

        let failed_by_kind = self.failed_strategies_by_kind();
        if !failed_by_kind.is_empty() {
            context.push_str("\nFailed strategies by error kind:\n");
            for (kind, files) in failed_by_kind {
                context.push_str(&format!("- {}: {}\n", kind, files.iter().join(", ")));
            }
        }

        if !self.repaired_files.is_empty() {
            context.push_str(&format!(
                "\nFiles already repaired at least once: {}\n",
                self.repaired_files.iter().sorted().join(", ")
            ));
        }

        if self.consecutive_same_error >= self.same_error_tolerance {
            context.push_str(
                "\nWARNING: the last rounds failed with the identical error. \
                 Try a completely different strategy instead of repeating the previous fix.\n",
            );
        }

        context
    }

    fn failed_strategies_by_kind(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for attempt in self.history.iter().filter(|a| !a.success) {
            let kind = if attempt.error_description.is_empty() {
                attempt.error_signature.clone()
            } else {
                attempt.error_description.clone()
            };
            let files = grouped.entry(kind).or_default();
            for file in &attempt.files {
                if !files.contains(file) {
                    files.push(file.clone());
                }
            }
        }
        grouped
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn memory() -> SessionMemory {
        SessionMemory::new(JobId::new("job-1"))
    }

    #[test]
    fn same_signature_twice_triggers_stop() {
        let mut memory = memory();
        assert!(!memory.record_error_signature("sig-a"));
        assert!(memory.record_error_signature("sig-a"));
        assert!(memory.should_terminate());
    }

    #[test]
    fn alternating_signatures_do_not_stop() {
        let mut memory = memory();
        assert!(!memory.record_error_signature("sig-a"));
        assert!(!memory.record_error_signature("sig-b"));
        assert!(!memory.record_error_signature("sig-a"));
        assert!(!memory.should_terminate());
        assert_eq!(memory.signature_occurrences("sig-a"), 2);
    }

    #[test]
    fn three_failures_without_success_terminate() {
        let mut memory = memory();
        for round in 1..=3 {
            memory.record_attempt(
                round,
                vec![format!("src/F{round}.java")],
                false,
                format!("sig-{round}"),
                "symbol not found",
                "",
            );
        }
        assert!(memory.should_terminate());
    }

    #[test]
    fn a_single_success_resets_the_all_fail_guard() {
        let mut memory = memory();
        memory.record_attempt(1, vec!["a".into()], false, "s1", "", "");
        memory.record_attempt(2, vec!["b".into()], true, "s2", "", "");
        memory.record_attempt(3, vec!["c".into()], false, "s3", "", "");
        assert!(!memory.should_terminate());
        assert_eq!(memory.success_count(), 1);
    }

    #[test]
    fn history_is_capped_dropping_oldest() {
        let mut memory = memory();
        for round in 1..=12 {
            memory.record_attempt(round, vec![], false, format!("sig-{round}"), "", "");
        }
        assert_eq!(memory.attempt_count(), MAX_HISTORY);
        let first = memory.attempts().next().unwrap();
        assert_eq!(first.round, 3);
    }

    #[test]
    fn repaired_files_accumulate() {
        let mut memory = memory();
        memory.record_attempt(1, vec!["src/A.java".into()], false, "s", "", "");
        memory.record_attempt(2, vec!["src/B.java".into()], false, "s", "", "");
        assert!(memory.has_repaired_file("src/A.java"));
        assert!(memory.has_repaired_file("src/B.java"));
        assert!(!memory.has_repaired_file("src/C.java"));
    }

    #[test]
    fn coach_context_mentions_attempts_and_stuck_warning() {
        let mut memory = memory();
        memory.record_attempt(
            1,
            vec!["src/A.java".into()],
            false,
            "sig-a",
            "symbol not found",
            "added missing import",
        );
        memory.record_error_signature("sig-a");
        memory.record_error_signature("sig-a");

        let context = memory.build_coach_context();
        assert!(context.contains("round 1"));
        assert!(context.contains("src/A.java"));
        assert!(context.contains("symbol not found"));
        assert!(context.contains("added missing import"));
        assert!(context.contains("completely different strategy"));
    }

    #[test]
    fn first_round_context_is_explicit() {
        let context = memory().build_coach_context();
        assert!(context.contains("first repair round"));
    }
}
