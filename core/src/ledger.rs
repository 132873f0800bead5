//! Probability ledger: turns a draw-set into exact integer weights and
//! certifies that they add up to the required total.
//!
//! RULE: The pass/fail decision is made on integers only. Percent strings
//! in diagnostics are rendered from integers by `format_percent`.
//!
//! A `WeightTable` borrows the candidates it was built from. It is built
//! fresh for every draw and never cached: rates can change between draws.

use crate::{
    fixed_point::{format_percent, parse_rate, InvalidReason, ParsedRate},
    types::{CandidateId, Weight, HUNDRED_PERCENT},
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default tolerance: 0.000001% expressed in fixed-point units.
pub const DEFAULT_TOLERANCE_UNITS: Weight = 10;

/// One possible outcome of a weighted draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate<P> {
    pub id: CandidateId,
    /// Percent as configured, e.g. `"12.3456789"`.
    pub probability_text: String,
    pub payload: P,
}

impl<P> Candidate<P> {
    pub fn new(id: impl Into<CandidateId>, probability_text: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            probability_text: probability_text.into(),
            payload,
        }
    }
}

/// A rate that could not be turned into a weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidItem {
    pub index: usize,
    pub raw: String,
    pub reason: InvalidReason,
}

/// A well-formed negative rate, clamped to zero weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegativeItem {
    pub index: usize,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDiagnostics {
    pub total_weight: Weight,
    /// `total_weight` as a percent with seven decimals.
    pub total_percent: String,
    /// Number of candidates supplied.
    pub count: usize,
    /// Candidates excluded from sampling, including invalid and negative ones.
    pub zero_weight_count: usize,
    pub invalid_items: Vec<InvalidItem>,
    pub negative_items: Vec<NegativeItem>,
    /// Set when the weight sum did not fit in a `Weight`.
    pub overflowed: bool,
}

#[derive(Debug)]
pub struct WeightedEntry<'a, P> {
    /// Position in the supplied candidate list.
    pub index: usize,
    pub candidate: &'a Candidate<P>,
    pub weight: Weight,
}

/// Positive-weight candidates in input order plus their exact sum.
#[derive(Debug)]
pub struct WeightTable<'a, P> {
    entries: Vec<WeightedEntry<'a, P>>,
    total_weight: Weight,
    diagnostics: LedgerDiagnostics,
}

impl<'a, P> WeightTable<'a, P> {
    pub fn entries(&self) -> &[WeightedEntry<'a, P>] {
        &self.entries
    }

    pub fn total_weight(&self) -> Weight {
        self.total_weight
    }

    pub fn diagnostics(&self) -> &LedgerDiagnostics {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn build_weight_table<P>(candidates: &[Candidate<P>]) -> WeightTable<'_, P> {
    let mut entries = Vec::with_capacity(candidates.len());
    let mut invalid_items = Vec::new();
    let mut negative_items = Vec::new();
    let mut zero_weight_count = 0;
    let mut sum: u128 = 0;

    for (index, candidate) in candidates.iter().enumerate() {
        let weight = match parse_rate(&candidate.probability_text) {
            ParsedRate::Weight(w) => w,
            ParsedRate::Negative(_) => {
                warn!(
                    "candidate {} (index {index}) has negative rate {:?}; weight clamped to 0",
                    candidate.id, candidate.probability_text
                );
                negative_items.push(NegativeItem {
                    index,
                    raw: candidate.probability_text.clone(),
                });
                0
            }
            ParsedRate::Invalid(reason) => {
                warn!(
                    "candidate {} (index {index}) has unparseable rate {:?} ({reason:?})",
                    candidate.id, candidate.probability_text
                );
                invalid_items.push(InvalidItem {
                    index,
                    raw: candidate.probability_text.clone(),
                    reason,
                });
                0
            }
        };

        if weight == 0 {
            zero_weight_count += 1;
            continue;
        }
        sum += u128::from(weight);
        entries.push(WeightedEntry {
            index,
            candidate,
            weight,
        });
    }

    let (total_weight, overflowed) = match Weight::try_from(sum) {
        Ok(total) => (total, false),
        Err(_) => (Weight::MAX, true),
    };

    let diagnostics = LedgerDiagnostics {
        total_weight,
        total_percent: format_percent(total_weight),
        count: candidates.len(),
        zero_weight_count,
        invalid_items,
        negative_items,
        overflowed,
    };
    debug!(
        "weight table built: {} of {} candidates weighted, total {}%",
        entries.len(),
        diagnostics.count,
        diagnostics.total_percent
    );

    WeightTable {
        entries,
        total_weight,
        diagnostics,
    }
}

// ── Validation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    pub require_total_100: bool,
    /// Allowed deviation from 100%, in fixed-point units (not percent).
    pub tolerance_units: Weight,
    pub strict_positive: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            require_total_100: true,
            tolerance_units: DEFAULT_TOLERANCE_UNITS,
            strict_positive: true,
        }
    }
}

impl ValidationOptions {
    /// Options with the tolerance given as a percent string, e.g. `"0.000001"`.
    /// Returns `None` when the tolerance is not a non-negative decimal.
    pub fn with_tolerance_percent(self, tolerance: &str) -> Option<Self> {
        match parse_rate(tolerance) {
            ParsedRate::Weight(tolerance_units) => Some(Self {
                tolerance_units,
                ..self
            }),
            ParsedRate::Negative(_) | ParsedRate::Invalid(_) => None,
        }
    }
}

/// Fatal reasons a draw-set cannot be sampled.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("candidate set is empty")]
    EmptyCandidateSet,

    #[error("no valid positive-weight candidates")]
    ZeroTotalWeight,

    #[error("probabilities sum to {total_percent}%, outside 100% ± {tolerance_percent}%")]
    ToleranceExceeded {
        total_percent: String,
        tolerance_percent: String,
        deviation_units: Weight,
    },

    #[error("sum of weights overflows the fixed-point range")]
    WeightOverflow,
}

/// A rejected draw-set, with everything needed to reproduce the rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{error} (count {}, total {}%, invalid {})",
    .diagnostics.count, .diagnostics.total_percent, .diagnostics.invalid_items.len())]
pub struct ValidationFailure {
    pub error: ValidationError,
    pub diagnostics: LedgerDiagnostics,
}

pub fn validate<'t, 'a, P>(
    table: &'t WeightTable<'a, P>,
    options: &ValidationOptions,
) -> Result<&'t WeightTable<'a, P>, ValidationFailure> {
    let diagnostics = table.diagnostics();
    let fail = |error| ValidationFailure {
        error,
        diagnostics: diagnostics.clone(),
    };

    if diagnostics.count == 0 {
        return Err(fail(ValidationError::EmptyCandidateSet));
    }
    if diagnostics.overflowed {
        return Err(fail(ValidationError::WeightOverflow));
    }
    if options.strict_positive && table.total_weight == 0 {
        return Err(fail(ValidationError::ZeroTotalWeight));
    }
    if options.require_total_100 {
        let deviation_units = table.total_weight.abs_diff(HUNDRED_PERCENT);
        if deviation_units > options.tolerance_units {
            return Err(fail(ValidationError::ToleranceExceeded {
                total_percent: diagnostics.total_percent.clone(),
                tolerance_percent: format_percent(options.tolerance_units),
                deviation_units,
            }));
        }
    }
    Ok(table)
}
