//! Non-fatal conditions raised while estimating, routed through an injected
//! sink instead of a process-wide logger so that callers (and tests) decide
//! where they go.

use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warning,
}

/// A recoverable condition observed during grouping or global-scale setup.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The prior prediction column contained `count` NaN or infinite entries;
    /// they were excluded from the weighted mean.
    NonFinitePriorPredictions { count: usize },
    /// The weighted prior mean is not finite in link space, so no prior
    /// individualization is applied.
    NonFinitePriorMeanLink { mean: f64 },
    /// A declared bin received no training samples in this iteration.
    UnobservedBin { bin: usize },
    /// A neutral estimate with zero uncertainty was inserted for this bin.
    FallbackBinInserted { bin: usize },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::NonFinitePriorPredictions { .. }
            | Diagnostic::NonFinitePriorMeanLink { .. } => Severity::Warning,
            Diagnostic::UnobservedBin { .. } | Diagnostic::FallbackBinInserted { .. } => {
                Severity::Debug
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::NonFinitePriorPredictions { count } => write!(
                f,
                "Found a total number of {count} non-finite values in the prior prediction column"
            ),
            Diagnostic::NonFinitePriorMeanLink { mean } => write!(
                f,
                "The mean prior prediction ({mean}) is not finite in link space. \
                 No individualization is done and no prior mean subtraction is necessary."
            ),
            Diagnostic::UnobservedBin { bin } => {
                write!(f, "Bin {bin} has no training samples in this iteration")
            }
            Diagnostic::FallbackBinInserted { bin } => write!(
                f,
                "Inserted neutral parameter with zero uncertainty for unobserved bin {bin}"
            ),
        }
    }
}

/// Receives diagnostics. Implementations must tolerate concurrent reports
/// because bins may be estimated in parallel.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to the `log` facade at its severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Warning => log::warn!("{diagnostic}"),
            Severity::Debug => log::debug!("{diagnostic}"),
        }
    }
}

/// Keeps every reported diagnostic in memory, in report order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn records(&self) -> Vec<Diagnostic> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count_where(&self, predicate: impl Fn(&Diagnostic) -> bool) -> usize {
        self.records().iter().filter(|&d| predicate(d)).count()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.records()
            .into_iter()
            .filter(|d| d.severity() == Severity::Warning)
            .collect()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match self.records.lock() {
            Ok(mut guard) => guard.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}
