//! # Bin Grouping
//!
//! Partitions the per-sample arrays of one training iteration into contiguous
//! groups that share a bin code. Samples are ordered by a stable sort on the
//! bin code, and every run of equal codes becomes one [`BinGroup`]. Bins with no
//! samples produce no group; they are reported to the diagnostics sink and left
//! for the estimator to reconcile against the declared bin count.

use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use ndarray::{Array1, ArrayView1, CowArray, Ix1};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GroupingError {
    #[error(
        "Per-sample arrays have inconsistent lengths: {bin_codes} bin codes, {targets} targets, {others} other-feature predictions, {weights} weights."
    )]
    LengthMismatch {
        bin_codes: usize,
        targets: usize,
        others: usize,
        weights: usize,
    },

    #[error("Bin code {code} at sample {sample} is outside the declared range [0, {n_bins}).")]
    BinCodeOutOfRange {
        code: usize,
        sample: usize,
        n_bins: usize,
    },
}

/// Read-only view of the framework's binning for one (possibly composite)
/// feature.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBins<'a> {
    /// Bin code of every training sample, each in `[0, n_bins)`.
    pub bin_codes: ArrayView1<'a, usize>,
    /// Total bins allocated for the feature, including any unseen bin.
    pub n_bins: usize,
}

impl<'a> FeatureBins<'a> {
    pub fn new(bin_codes: ArrayView1<'a, usize>, n_bins: usize) -> Self {
        Self { bin_codes, n_bins }
    }
}

/// The parallel per-sample arrays of one estimator call.
#[derive(Debug)]
pub struct SampleBatch<'a> {
    pub target: ArrayView1<'a, f64>,
    /// In-sample prediction of every feature except the one being estimated,
    /// in natural scale.
    pub others_prediction: ArrayView1<'a, f64>,
    pub weights: CowArray<'a, f64, Ix1>,
}

impl<'a> SampleBatch<'a> {
    /// Builds a batch; absent weights default to one per sample.
    pub fn new(
        target: ArrayView1<'a, f64>,
        others_prediction: ArrayView1<'a, f64>,
        weights: Option<ArrayView1<'a, f64>>,
    ) -> Result<Self, GroupingError> {
        let weights = match weights {
            Some(w) => CowArray::from(w),
            None => CowArray::from(Array1::ones(target.len())),
        };
        if others_prediction.len() != target.len() || weights.len() != target.len() {
            return Err(GroupingError::LengthMismatch {
                bin_codes: target.len(),
                targets: target.len(),
                others: others_prediction.len(),
                weights: weights.len(),
            });
        }
        Ok(Self {
            target,
            others_prediction,
            weights,
        })
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// All samples of one bin, copied out of the batch in stable order.
#[derive(Debug, Clone, PartialEq)]
pub struct BinGroup {
    pub bin: usize,
    pub target: Array1<f64>,
    pub others_prediction: Array1<f64>,
    pub weights: Array1<f64>,
}

impl BinGroup {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// Splits `batch` into one group per distinct bin code, ascending by code.
pub fn group_by_bin(
    feature: &FeatureBins<'_>,
    batch: &SampleBatch<'_>,
    sink: &dyn DiagnosticsSink,
) -> Result<Vec<BinGroup>, GroupingError> {
    let codes = feature.bin_codes;
    if codes.len() != batch.len() {
        return Err(GroupingError::LengthMismatch {
            bin_codes: codes.len(),
            targets: batch.target.len(),
            others: batch.others_prediction.len(),
            weights: batch.weights.len(),
        });
    }
    if let Some((sample, &code)) = codes.iter().enumerate().find(|(_, c)| **c >= feature.n_bins) {
        return Err(GroupingError::BinCodeOutOfRange {
            code,
            sample,
            n_bins: feature.n_bins,
        });
    }

    // `sort_by_key` is stable, so samples keep their original order inside a bin.
    let mut order: Vec<usize> = (0..codes.len()).collect();
    order.sort_by_key(|&i| codes[i]);

    let groups: Vec<BinGroup> = order
        .chunk_by(|&a, &b| codes[a] == codes[b])
        .map(|run| BinGroup {
            bin: codes[run[0]],
            target: run.iter().map(|&i| batch.target[i]).collect(),
            others_prediction: run.iter().map(|&i| batch.others_prediction[i]).collect(),
            weights: run.iter().map(|&i| batch.weights[i]).collect(),
        })
        .collect();

    let mut next = 0;
    for group in &groups {
        for bin in next..group.bin {
            sink.report(Diagnostic::UnobservedBin { bin });
        }
        next = group.bin + 1;
    }
    for bin in next..feature.n_bins {
        sink.report(Diagnostic::UnobservedBin { bin });
    }

    log::debug!(
        "Grouped {} samples into {} of {} declared bins",
        batch.len(),
        groups.len(),
        feature.n_bins
    );
    Ok(groups)
}
