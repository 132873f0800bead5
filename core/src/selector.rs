//! Weighted selection over a validated `WeightTable`.
//!
//! RULE: The walk uses integer arithmetic only. Candidate `i` wins the roll
//! `r` iff `acc_i <= r < acc_i + w_i`, walking in input order.
//!
//! The selector never panics on bad input. An empty table yields a
//! failed result; a walk that somehow runs off the end returns the last
//! entry and flags `SelectionUnreachable`.

use crate::{
    fixed_point::format_percent,
    ledger::{
        build_weight_table, validate, Candidate, LedgerDiagnostics, ValidationError,
        ValidationOptions, WeightTable, WeightedEntry,
    },
    rng::{RandomSource, RandomSourceKind},
    types::Weight,
};
use log::{debug, error};
use serde::{Deserialize, Serialize};

/// Why a draw produced no usable winner, or reached the defensive path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawFailure {
    /// The draw-set was rejected before sampling.
    Validation { error: ValidationError },
    /// No positive-weight entries to sample from.
    EmptyTable,
    /// The walk exhausted the table without a hit. The result still
    /// carries the last entry; treat as a bug report.
    SelectionUnreachable { roll: Weight, total_weight: Weight },
}

impl DrawFailure {
    pub fn message(&self) -> String {
        match self {
            Self::Validation { error } => error.to_string(),
            Self::EmptyTable => "no positive-weight candidates to draw from".into(),
            Self::SelectionUnreachable { roll, total_weight } => {
                format!("roll {roll} not covered by total weight {total_weight}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawDiagnostics {
    #[serde(flatten)]
    pub ledger: LedgerDiagnostics,
    /// Number of positive-weight entries sampled over.
    pub considered: usize,
    pub roll: Option<Weight>,
    pub random_source: Option<RandomSourceKind>,
    pub failure: Option<DrawFailure>,
}

#[derive(Debug)]
pub struct DrawResult<'a, P> {
    pub selected: Option<&'a Candidate<P>>,
    /// Position of the winner in the supplied candidate list.
    pub selected_index: Option<usize>,
    pub diagnostics: DrawDiagnostics,
}

impl<'a, P> DrawResult<'a, P> {
    /// True when a winner was chosen, including via the fallback path.
    pub fn ok(&self) -> bool {
        self.selected.is_some()
    }

    pub fn payload(&self) -> Option<&'a P> {
        self.selected.map(|c| &c.payload)
    }

    fn failed(diagnostics: DrawDiagnostics) -> Self {
        Self {
            selected: None,
            selected_index: None,
            diagnostics,
        }
    }
}

/// Result of walking the cumulative intervals for one roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Located {
    /// Offset into the table's entries.
    Hit(usize),
    Exhausted,
}

/// Find the entry whose half-open interval contains `roll`.
pub fn locate<P>(entries: &[WeightedEntry<'_, P>], roll: Weight) -> Located {
    let mut acc: Weight = 0;
    for (pos, entry) in entries.iter().enumerate() {
        // Totals are checked to fit in a Weight before any draw.
        let end = acc.saturating_add(entry.weight);
        if roll < end {
            return Located::Hit(pos);
        }
        acc = end;
    }
    Located::Exhausted
}

/// Draw one candidate with probability proportional to its weight.
pub fn draw<'a, P>(table: &WeightTable<'a, P>, rng: &mut dyn RandomSource) -> DrawResult<'a, P> {
    let mut diagnostics = DrawDiagnostics {
        ledger: table.diagnostics().clone(),
        considered: table.entries().len(),
        roll: None,
        random_source: None,
        failure: None,
    };

    let total_weight = table.total_weight();
    if table.is_empty() || total_weight == 0 || diagnostics.ledger.overflowed {
        diagnostics.failure = Some(DrawFailure::EmptyTable);
        return DrawResult::failed(diagnostics);
    }

    let roll = rng.uniform_below(total_weight);
    diagnostics.roll = Some(roll);
    diagnostics.random_source = Some(rng.kind());

    let entries = table.entries();
    let entry = match locate(entries, roll) {
        Located::Hit(pos) => &entries[pos],
        Located::Exhausted => {
            error!(
                "weighted walk exhausted: roll {roll}, total {total_weight}; returning last candidate"
            );
            diagnostics.failure = Some(DrawFailure::SelectionUnreachable { roll, total_weight });
            match entries.last() {
                Some(last) => last,
                None => return DrawResult::failed(diagnostics),
            }
        }
    };

    debug!(
        "drew {} (index {}) with roll {roll}/{total_weight} ({}%) from {}",
        entry.candidate.id,
        entry.index,
        format_percent(total_weight),
        rng.kind().as_str()
    );

    DrawResult {
        selected: Some(entry.candidate),
        selected_index: Some(entry.index),
        diagnostics,
    }
}

/// Build, validate and draw in one call. A draw-set that fails validation
/// yields a failed result carrying the validation error; nothing is drawn.
pub fn select<'a, P>(
    candidates: &'a [Candidate<P>],
    options: &ValidationOptions,
    rng: &mut dyn RandomSource,
) -> DrawResult<'a, P> {
    let table = build_weight_table(candidates);
    match validate(&table, options) {
        Ok(table) => draw(table, rng),
        Err(failure) => {
            let considered = table.entries().len();
            DrawResult::failed(DrawDiagnostics {
                ledger: failure.diagnostics,
                considered,
                roll: None,
                random_source: None,
                failure: Some(DrawFailure::Validation {
                    error: failure.error,
                }),
            })
        }
    }
}
