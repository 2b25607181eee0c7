//! Aggregation of classified probe results into the final suite report.
//!
//! Aggregation is pure and idempotent: the same classified inputs always
//! produce the same report. All fractional metrics are defined as 0.0 on
//! empty input rather than failing.

use crate::classifier::{Outcome, OutcomeCategory};
use crate::protocol::Protocol;
use crate::{ExecutionRecord, Probe, SuiteConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One probe's full lifecycle: what was sent, what came back, how it was
/// classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub probe: Probe,
    pub execution: ExecutionRecord,
    pub outcome: Outcome,
}

/// Per-category experimental-vs-control frequency comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDelta {
    pub experimental_fraction: f64,
    pub control_fraction: f64,
    /// `experimental_fraction - control_fraction`.
    pub delta: f64,
}

/// Delta-vs-control summary, present only when control probes were run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaVsControl {
    /// All seven categories, keyed in priority order for stable serialization.
    pub per_category: BTreeMap<OutcomeCategory, CategoryDelta>,
    /// True iff any category's absolute delta exceeds the configured
    /// divergence threshold (strictly).
    pub behavior_diverged: bool,
}

/// Summary over one suite run. Constructed once, immutable thereafter, and
/// safe to serialize verbatim: field names, nesting, and map key order are
/// stable across runs for the same logical inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub hypothesis: String,
    pub protocol: Protocol,
    /// Echo of the requested shape, for diffing historical reports.
    pub probe_count: usize,
    pub include_control: bool,
    /// Experimental results in generation ordinal order.
    pub experimental: Vec<ProbeReport>,
    /// Control results (at most one per run under the current orchestrator).
    pub control: Vec<ProbeReport>,
    /// Count of every category across experimental probes; all seven keys are
    /// always present, zero-filled.
    pub outcome_distribution: BTreeMap<OutcomeCategory, usize>,
    /// Category with the highest experimental count; ties go to the earlier
    /// priority category. `None` when there are no experimental probes.
    pub most_common_outcome: Option<OutcomeCategory>,
    /// Fraction of experimental probes sharing the most common outcome.
    pub stability_score: f64,
    /// Fraction of experimental probes whose outcome used a fallback path.
    pub fallback_rate: f64,
    /// Mean classification confidence over experimental probes.
    pub average_confidence: f64,
    pub delta_vs_control: Option<DeltaVsControl>,
}

fn distribution(reports: &[ProbeReport]) -> BTreeMap<OutcomeCategory, usize> {
    let mut counts: BTreeMap<OutcomeCategory, usize> =
        OutcomeCategory::ALL.iter().map(|c| (*c, 0)).collect();
    for report in reports {
        *counts.entry(report.outcome.category).or_insert(0) += 1;
    }
    counts
}

fn most_common(counts: &BTreeMap<OutcomeCategory, usize>) -> Option<OutcomeCategory> {
    let mut best: Option<(OutcomeCategory, usize)> = None;
    // BTreeMap iterates in priority order; strict comparison keeps the
    // earlier category on ties.
    for (category, count) in counts {
        if *count > 0 && best.map_or(true, |(_, best_count)| *count > best_count) {
            best = Some((*category, *count));
        }
    }
    best.map(|(category, _)| category)
}

/// Builds the suite report from classified experimental and control results.
///
/// `delta_vs_control` is only computed when control results exist; empty
/// experimental input yields zeroed metrics and no most-common outcome.
pub fn aggregate(
    hypothesis: &str,
    protocol: Protocol,
    experimental: Vec<ProbeReport>,
    control: Vec<ProbeReport>,
    config: &SuiteConfig,
) -> SuiteReport {
    let counts = distribution(&experimental);
    let most_common_outcome = most_common(&counts);
    let n = experimental.len();

    let (stability_score, fallback_rate, average_confidence) = if n == 0 {
        (0.0, 0.0, 0.0)
    } else {
        let top = most_common_outcome
            .and_then(|c| counts.get(&c).copied())
            .unwrap_or(0);
        let fallbacks = experimental
            .iter()
            .filter(|r| r.outcome.fallback_used)
            .count();
        let confidence_sum: f64 = experimental.iter().map(|r| r.outcome.confidence).sum();
        (
            top as f64 / n as f64,
            fallbacks as f64 / n as f64,
            confidence_sum / n as f64,
        )
    };

    let delta_vs_control = if control.is_empty() || n == 0 {
        None
    } else {
        let control_counts = distribution(&control);
        let control_n = control.len();
        let mut per_category = BTreeMap::new();
        let mut diverged = false;
        for category in OutcomeCategory::ALL {
            let experimental_fraction = counts[&category] as f64 / n as f64;
            let control_fraction = control_counts[&category] as f64 / control_n as f64;
            let delta = experimental_fraction - control_fraction;
            if delta.abs() > config.divergence_threshold {
                diverged = true;
            }
            per_category.insert(
                category,
                CategoryDelta {
                    experimental_fraction,
                    control_fraction,
                    delta,
                },
            );
        }
        Some(DeltaVsControl {
            per_category,
            behavior_diverged: diverged,
        })
    };

    SuiteReport {
        hypothesis: hypothesis.to_string(),
        protocol,
        probe_count: n,
        include_control: !control.is_empty(),
        experimental,
        control,
        outcome_distribution: counts,
        most_common_outcome,
        stability_score,
        fallback_rate,
        average_confidence,
        delta_vs_control,
    }
}

// Tests
