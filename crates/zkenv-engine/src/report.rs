//! Per-variable outcomes of an encrypt or decrypt run

use std::collections::BTreeMap;

use secrecy::SecretString;
use zkenv_core::ZkenvError;

/// Overall verdict, derived from the per-variable outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    /// No variables to process.
    Empty,
    /// Every variable succeeded.
    Complete,
    /// Some succeeded, some did not.
    Partial,
    /// Nothing succeeded.
    Failed,
}

impl ReportStatus {
    fn from_counts(succeeded: usize, total: usize) -> Self {
        match (succeeded, total) {
            (_, 0) => ReportStatus::Empty,
            (s, t) if s == t => ReportStatus::Complete,
            (0, _) => ReportStatus::Failed,
            _ => ReportStatus::Partial,
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportStatus::Empty => "empty",
            ReportStatus::Complete => "complete",
            ReportStatus::Partial => "partial",
            ReportStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ── Encrypt ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum LineOutcome {
    Passthrough,
    Emitted { name: String },
    /// An `# ERROR encrypting NAME` marker was written in place of the record.
    Errored { name: String, error: ZkenvError },
}

#[derive(Debug, Default)]
pub struct EncryptReport {
    pub lines: Vec<LineOutcome>,
}

impl EncryptReport {
    pub fn emitted(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, LineOutcome::Emitted { .. }))
            .count()
    }

    pub fn errored(&self) -> impl Iterator<Item = (&str, &ZkenvError)> {
        self.lines.iter().filter_map(|l| match l {
            LineOutcome::Errored { name, error } => Some((name.as_str(), error)),
            _ => None,
        })
    }

    pub fn status(&self) -> ReportStatus {
        let emitted = self.emitted();
        ReportStatus::from_counts(emitted, emitted + self.errored().count())
    }
}

// ── Decrypt ──────────────────────────────────────────────────────────────────

/// What happened to the custodian's copy after a successful open.
#[derive(Debug)]
pub enum Deletion {
    /// Multi-use pair, left in place.
    NotRequested,
    Deleted,
    /// Delete call failed; the value was still recovered.
    Failed(ZkenvError),
}

pub enum RecordOutcome {
    Recovered {
        name: String,
        value: SecretString,
        deletion: Deletion,
    },
    /// Never sent to the custodian: the line could not be parsed.
    SkippedMalformed { name: String, reason: String },
    Failed { name: String, error: ZkenvError },
}

impl RecordOutcome {
    pub fn name(&self) -> &str {
        match self {
            RecordOutcome::Recovered { name, .. }
            | RecordOutcome::SkippedMalformed { name, .. }
            | RecordOutcome::Failed { name, .. } => name,
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, RecordOutcome::Recovered { .. })
    }
}

impl std::fmt::Debug for RecordOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordOutcome::Recovered { name, deletion, .. } => f
                .debug_struct("Recovered")
                .field("name", name)
                .field("value", &"[REDACTED]")
                .field("deletion", deletion)
                .finish(),
            RecordOutcome::SkippedMalformed { name, reason } => f
                .debug_struct("SkippedMalformed")
                .field("name", name)
                .field("reason", reason)
                .finish(),
            RecordOutcome::Failed { name, error } => f
                .debug_struct("Failed")
                .field("name", name)
                .field("error", error)
                .finish(),
        }
    }
}

/// Result of a decrypt run, in file order.
///
/// Variables that were not recovered are absent from [`secrets`](Self::secrets);
/// a missing name means "not recovered", never "empty".
#[derive(Debug, Default)]
pub struct DecryptReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl DecryptReport {
    /// Recovered values by name. A later duplicate overrides an earlier one.
    pub fn secrets(&self) -> BTreeMap<String, SecretString> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                RecordOutcome::Recovered { name, value, .. } => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Last recovered value for `name`.
    pub fn get(&self, name: &str) -> Option<&SecretString> {
        self.outcomes.iter().rev().find_map(|o| match o {
            RecordOutcome::Recovered { name: n, value, .. } if n == name => Some(value),
            _ => None,
        })
    }

    /// Names with no recovered value anywhere in the file.
    pub fn missing(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self
            .outcomes
            .iter()
            .filter(|o| !o.is_recovered())
            .map(RecordOutcome::name)
        {
            if self.get(name).is_none() && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn recovered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_recovered()).count()
    }

    pub fn status(&self) -> ReportStatus {
        ReportStatus::from_counts(self.recovered(), self.outcomes.len())
    }
}
