//! Advisory balance report for a draw-set.
//!
//! Read-only, for admin tooling. Rates are read with the same parser the
//! ledger uses, so a rate the ledger refuses is never counted here.
//! Floating point appears only in the summed percentages, which feed no
//! draw and no charge.

use crate::{
    fixed_point::{parse_rate, units_to_percent_f64, ParsedRate},
    ledger::Candidate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stated total within this many percentage points of 100 is balanced.
pub const BALANCE_EPSILON: f64 = 0.01;
pub const VERY_LOW_RATE: f64 = 1.0;
pub const VERY_HIGH_RATE: f64 = 50.0;

/// Expected band for the average rate of one rarity tier, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RarityGuideline {
    pub rarity: String,
    pub min_average: f64,
    pub max_average: f64,
}

impl RarityGuideline {
    pub fn new(rarity: &str, min_average: f64, max_average: f64) -> Self {
        Self {
            rarity: rarity.into(),
            min_average,
            max_average,
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("common", 10.0, 100.0),
            Self::new("rare", 2.0, 30.0),
            Self::new("epic", 0.5, 10.0),
            Self::new("legendary", 0.0, 3.0),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RarityStats {
    pub rarity: String,
    pub count: usize,
    pub total_percent: f64,
    pub average_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionReport {
    pub total_count: usize,
    pub total_percent: f64,
    pub balanced: bool,
    pub rarities: Vec<RarityStats>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Summarise `candidates`. `rarity_of` pulls the rarity tag out of a
/// payload; candidates without one are grouped as `"untagged"`.
pub fn distribution_report<P, F>(
    candidates: &[Candidate<P>],
    guidelines: &[RarityGuideline],
    rarity_of: F,
) -> DistributionReport
where
    F: Fn(&P) -> Option<&str>,
{
    let mut warnings = Vec::new();
    let mut total_percent = 0.0;
    let mut groups: BTreeMap<String, (usize, f64)> = BTreeMap::new();

    for candidate in candidates {
        let rate = match parse_rate(&candidate.probability_text) {
            ParsedRate::Weight(units) => units_to_percent_f64(units),
            ParsedRate::Negative(_) => {
                warnings.push(format!(
                    "{}: negative rate {:?} counts as 0%",
                    candidate.id, candidate.probability_text
                ));
                continue;
            }
            ParsedRate::Invalid(reason) => {
                warnings.push(format!(
                    "{}: rate {:?} is not a valid decimal percent ({reason:?})",
                    candidate.id, candidate.probability_text
                ));
                continue;
            }
        };
        total_percent += rate;

        if rate < VERY_LOW_RATE {
            warnings.push(format!("{}: very low rate {rate}%", candidate.id));
        } else if rate > VERY_HIGH_RATE {
            warnings.push(format!("{}: very high rate {rate}%", candidate.id));
        }

        let rarity = rarity_of(&candidate.payload).unwrap_or("untagged").to_string();
        let group = groups.entry(rarity).or_insert((0, 0.0));
        group.0 += 1;
        group.1 += rate;
    }

    let balanced = (total_percent - 100.0).abs() < BALANCE_EPSILON;
    if !balanced {
        warnings.push(format!(
            "rates sum to {total_percent:.7}%, not 100% (off by {:+.7})",
            total_percent - 100.0
        ));
    }

    let rarities: Vec<RarityStats> = groups
        .into_iter()
        .map(|(rarity, (count, sum))| RarityStats {
            rarity,
            count,
            total_percent: sum,
            average_percent: sum / count as f64,
        })
        .collect();

    let mut recommendations = Vec::new();
    for stats in &rarities {
        let Some(guide) = guidelines.iter().find(|g| g.rarity == stats.rarity) else {
            continue;
        };
        if stats.average_percent > guide.max_average {
            recommendations.push(format!(
                "{} average rate {:.4}% is high (max {}%), consider reducing",
                stats.rarity, stats.average_percent, guide.max_average
            ));
        } else if stats.average_percent < guide.min_average {
            recommendations.push(format!(
                "{} average rate {:.4}% is low (min {}%), consider raising",
                stats.rarity, stats.average_percent, guide.min_average
            ));
        }
    }
    if !balanced {
        recommendations.push(if total_percent > 100.0 {
            "lower one or more rates until the total is exactly 100%".to_string()
        } else {
            "raise one or more rates until the total is exactly 100%".to_string()
        });
    }

    DistributionReport {
        total_count: candidates.len(),
        total_percent,
        balanced,
        rarities,
        warnings,
        recommendations,
    }
}
