//! Recommendation calculator.
//!
//! A pure function from domain evidence and school thresholds to a
//! recommendation band. Bands are tried best-first and the first rule that
//! holds wins:
//!
//! 1. **Ready to admit**: every academic domain meets its threshold, mindset
//!    (if measured) is at least `mindset_floor`, and every lens (if measured)
//!    is at least `lens_floor`.
//! 2. **Ready with academic support**: English meets its threshold and every
//!    other academic domain is within `support_margin` points below.
//! 3. **Admit with language support**: English is within `support_margin`
//!    below its threshold and every other academic domain meets its own.
//! 4. **Consider with support**: every assessed academic domain is within
//!    `support_margin` below its threshold.
//! 5. **Not yet ready**: anything else, including no assessed academic domain.
//!
//! Rules 1–3 need all academic domains assessed. Every rule only gets easier
//! to satisfy as a score rises, so the band never worsens when one domain
//! improves. A score equal to its threshold meets it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScoringIssue;
use crate::model::{DomainScore, Domain, ThresholdTable, WritingEvaluation};
use crate::observer::ScoringObserver;
use crate::text::round1;

/// Detail prefix of the issue raised when a grade has no threshold for a domain.
pub const MISSING_THRESHOLD: &str = "no threshold configured";

/// Recommendation bands, ordered worst to best.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationBand {
    NotYetReady,
    ConsiderWithSupport,
    AdmitWithLanguageSupport,
    ReadyWithAcademicSupport,
    ReadyToAdmit,
}

impl fmt::Display for RecommendationBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecommendationBand::ReadyToAdmit => "Ready to admit",
            RecommendationBand::ReadyWithAcademicSupport => "Ready with academic support",
            RecommendationBand::AdmitWithLanguageSupport => "Admit with language support",
            RecommendationBand::ConsiderWithSupport => "Consider with support",
            RecommendationBand::NotYetReady => "Not yet ready",
        };
        f.write_str(s)
    }
}

/// Tunable limits for the band rules and the writing blend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Share of a domain's combined percentage taken from writing (0–1).
    pub writing_weight: f64,
    /// Points below threshold still treated as supportable.
    pub support_margin: f64,
    /// Minimum 0–4 mindset score for "ready to admit".
    pub mindset_floor: f64,
    /// Minimum 0–4 lens score for "ready to admit".
    pub lens_floor: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            writing_weight: 0.3,
            support_margin: 10.0,
            mindset_floor: 2.0,
            lens_floor: 1.0,
        }
    }
}

/// Evidence for one academic domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvidence {
    pub domain: Domain,
    /// MCQ percentage, when the domain had scorable items.
    pub mcq_pct: Option<f64>,
    /// Mean 0–4 writing score, when the domain had writing.
    pub writing_score: Option<f64>,
}

/// Everything the calculator looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationInput {
    pub grade: String,
    pub domains: Vec<DomainEvidence>,
    /// Mindset on the 0–4 scale.
    pub mindset: Option<f64>,
    /// Qualitative lenses on the 0–4 scale.
    pub lenses: BTreeMap<Domain, f64>,
    /// Upstream evidence already needs a human (e.g. an AI fallback).
    pub flagged_for_review: bool,
}

impl RecommendationInput {
    /// Gather evidence from MCQ domain scores and writing evaluations.
    pub fn from_scores(
        grade: &str,
        domain_scores: &[DomainScore],
        evaluations: &[WritingEvaluation],
    ) -> Self {
        let writing_mean = |domain: Domain| {
            let scores: Vec<f64> = evaluations
                .iter()
                .filter(|e| e.domain == domain)
                .map(|e| e.score)
                .collect();
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
        };

        let domains = Domain::ACADEMIC
            .into_iter()
            .map(|domain| DomainEvidence {
                domain,
                mcq_pct: domain_scores
                    .iter()
                    .find(|d| d.domain == domain && d.assessed)
                    .map(|d| d.pct),
                writing_score: writing_mean(domain),
            })
            .collect();

        let mindset = domain_scores
            .iter()
            .find(|d| d.domain == Domain::Mindset && d.assessed)
            .and_then(|d| d.scaled);

        let lenses = Domain::ALL
            .into_iter()
            .filter(|d| d.is_lens())
            .filter_map(|d| writing_mean(d).map(|score| (d, score)))
            .collect();

        Self {
            grade: grade.to_string(),
            domains,
            mindset,
            lenses,
            flagged_for_review: evaluations.iter().any(|e| e.needs_manual_review),
        }
    }
}

/// Per-domain audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainOutcome {
    pub domain: Domain,
    pub mcq_pct: Option<f64>,
    /// Writing score converted to a percentage.
    pub writing_pct: Option<f64>,
    /// Blended percentage, one decimal.
    pub combined_pct: Option<f64>,
    pub threshold: Option<f64>,
    /// `combined_pct - threshold`, one decimal.
    pub delta: Option<f64>,
    pub assessed: bool,
    pub meets_threshold: bool,
}

/// Output of the calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub domains: Vec<DomainOutcome>,
    pub overall_academic_pct: f64,
    pub band: RecommendationBand,
    pub mindset_score: Option<f64>,
    #[serde(default)]
    pub lens_scores: BTreeMap<Domain, f64>,
    pub narrative: String,
    /// One line per rule check, in evaluation order.
    pub rationale: Vec<String>,
    pub requires_manual_review: bool,
}

impl RecommendationResult {
    pub fn domain(&self, domain: Domain) -> Option<&DomainOutcome> {
        self.domains.iter().find(|d| d.domain == domain)
    }
}

/// Blend MCQ and writing evidence into one percentage.
pub fn combine(mcq_pct: Option<f64>, writing_score: Option<f64>, writing_weight: f64) -> Option<f64> {
    let writing_pct = writing_score.map(|s| s.clamp(0.0, 4.0) / 4.0 * 100.0);
    let w = writing_weight.clamp(0.0, 1.0);
    match (mcq_pct, writing_pct) {
        (Some(m), Some(wr)) => Some(round1(m * (1.0 - w) + wr * w)),
        (Some(m), None) => Some(round1(m)),
        (None, Some(wr)) => Some(round1(wr)),
        (None, None) => None,
    }
}

/// Compute the recommendation.
pub fn calculate(
    input: &RecommendationInput,
    thresholds: &ThresholdTable,
    config: &RecommendationConfig,
    observer: &dyn ScoringObserver,
) -> RecommendationResult {
    let mut outcomes = Vec::new();
    for evidence in &input.domains {
        let combined = combine(evidence.mcq_pct, evidence.writing_score, config.writing_weight);
        let threshold = thresholds.threshold(&input.grade, evidence.domain);
        if combined.is_some() && threshold.is_none() {
            observer.on_issue(&ScoringIssue::MissingConfiguration {
                domain: evidence.domain,
                detail: format!("{MISSING_THRESHOLD} for grade '{}'", input.grade),
            });
        }
        let delta = match (combined, threshold) {
            (Some(pct), Some(t)) => Some(round1(pct - t)),
            _ => None,
        };
        outcomes.push(DomainOutcome {
            domain: evidence.domain,
            mcq_pct: evidence.mcq_pct,
            writing_pct: evidence
                .writing_score
                .map(|s| round1(s.clamp(0.0, 4.0) / 4.0 * 100.0)),
            combined_pct: combined,
            threshold,
            delta,
            assessed: delta.is_some(),
            meets_threshold: delta.is_some_and(|d| d >= 0.0),
        });
    }

    let assessed: Vec<&DomainOutcome> = outcomes.iter().filter(|o| o.assessed).collect();
    let overall_academic_pct = if assessed.is_empty() {
        0.0
    } else {
        round1(assessed.iter().filter_map(|o| o.combined_pct).sum::<f64>() / assessed.len() as f64)
    };
    let all_assessed = Domain::ACADEMIC
        .iter()
        .all(|d| outcomes.iter().any(|o| o.domain == *d && o.assessed));

    let (band, rationale) = select_band(&assessed, all_assessed, input, config);
    let requires_manual_review = input.flagged_for_review || !all_assessed;
    let narrative = narrative(band, overall_academic_pct, &outcomes, &rationale);

    RecommendationResult {
        domains: outcomes,
        overall_academic_pct,
        band,
        mindset_score: input.mindset,
        lens_scores: input.lenses.clone(),
        narrative,
        rationale,
        requires_manual_review,
    }
}

fn delta(o: &DomainOutcome) -> f64 {
    o.delta.unwrap_or(f64::NEG_INFINITY)
}

fn select_band(
    assessed: &[&DomainOutcome],
    all_assessed: bool,
    input: &RecommendationInput,
    config: &RecommendationConfig,
) -> (RecommendationBand, Vec<String>) {
    let mut rationale = Vec::new();
    if assessed.is_empty() {
        rationale.push("No academic domain could be assessed.".to_string());
        return (RecommendationBand::NotYetReady, rationale);
    }

    let within_margin = |o: &&&DomainOutcome| delta(o) >= -config.support_margin;
    let meets = |o: &&&DomainOutcome| delta(o) >= 0.0;
    let (language, others): (Vec<&&DomainOutcome>, Vec<&&DomainOutcome>) =
        assessed.iter().partition(|o| o.domain.is_language());

    if !all_assessed {
        rationale.push(
            "Not every academic domain was assessed; the best available band is consider with support."
                .to_string(),
        );
    } else {
        let mindset_ok = input.mindset.map_or(true, |m| m >= config.mindset_floor);
        let lenses_ok = input.lenses.values().all(|s| *s >= config.lens_floor);
        if assessed.iter().all(|o| delta(o) >= 0.0) && mindset_ok && lenses_ok {
            rationale.push("All academic thresholds met with sufficient mindset and lens scores.".into());
            return (RecommendationBand::ReadyToAdmit, rationale);
        }
        if !mindset_ok {
            rationale.push(format!(
                "Mindset below the {:.1} floor required to be ready to admit.",
                config.mindset_floor
            ));
        }
        if !lenses_ok {
            rationale.push(format!(
                "A qualitative lens is below the {:.1} floor required to be ready to admit.",
                config.lens_floor
            ));
        }

        if language.iter().all(meets) && others.iter().all(within_margin) {
            rationale.push(format!(
                "English meets its threshold and other domains are within {:.1} points.",
                config.support_margin
            ));
            return (RecommendationBand::ReadyWithAcademicSupport, rationale);
        }
        if language.iter().all(within_margin) && others.iter().all(meets) {
            rationale.push(format!(
                "Other domains meet their thresholds and English is within {:.1} points.",
                config.support_margin
            ));
            return (RecommendationBand::AdmitWithLanguageSupport, rationale);
        }
    }

    if assessed.iter().all(|o| delta(o) >= -config.support_margin) {
        rationale.push(format!(
            "Every assessed domain is within {:.1} points of its threshold.",
            config.support_margin
        ));
        return (RecommendationBand::ConsiderWithSupport, rationale);
    }

    let below: Vec<String> = assessed
        .iter()
        .filter(|o| delta(o) < -config.support_margin)
        .map(|o| o.domain.display_name().to_string())
        .collect();
    rationale.push(format!(
        "More than {:.1} points below threshold in: {}.",
        config.support_margin,
        below.join(", ")
    ));
    (RecommendationBand::NotYetReady, rationale)
}

fn narrative(
    band: RecommendationBand,
    overall: f64,
    outcomes: &[DomainOutcome],
    rationale: &[String],
) -> String {
    let mut parts = vec![format!(
        "Recommendation: {band}. Overall academic score {overall:.1}%."
    )];
    for o in outcomes {
        let line = match (o.combined_pct, o.threshold, o.delta) {
            (Some(pct), Some(t), Some(d)) => format!(
                "{} {pct:.1}% against a threshold of {t:.1}% ({d:+.1}).",
                o.domain.display_name()
            ),
            (Some(pct), None, _) => format!(
                "{} {pct:.1}% with no configured threshold (not assessed).",
                o.domain.display_name()
            ),
            _ => format!("{} not assessed.", o.domain.display_name()),
        };
        parts.push(line);
    }
    if let Some(last) = rationale.last() {
        parts.push(last.clone());
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{NoopObserver, RecordingObserver};
    use crate::test_support::fixture_thresholds;
    use std::sync::OnceLock;

    fn input(english: f64, maths: f64, reasoning: f64) -> RecommendationInput {
        let ev = |domain, pct| DomainEvidence {
            domain,
            mcq_pct: Some(pct),
            writing_score: None,
        };
        RecommendationInput {
            grade: "7".into(),
            domains: vec![
                ev(Domain::English, english),
                ev(Domain::Mathematics, maths),
                ev(Domain::Reasoning, reasoning),
            ],
            mindset: Some(3.0),
            lenses: BTreeMap::new(),
            flagged_for_review: false,
        }
    }

    fn thresholds() -> &'static ThresholdTable {
        static TABLE: OnceLock<ThresholdTable> = OnceLock::new();
        TABLE.get_or_init(fixture_thresholds)
    }

    fn band(input: &RecommendationInput) -> RecommendationBand {
        calculate(
            input,
            thresholds(),
            &RecommendationConfig::default(),
            &NoopObserver,
        )
        .band
    }

    #[test]
    fn english_delta_example() {
        // 9 of 14 correct.
        let pct = crate::scorer::pct(9, 14);
        assert_eq!(pct, 64.3);
        let result = calculate(
            &input(pct, 70.0, 60.0),
            &fixture_thresholds(),
            &RecommendationConfig::default(),
            &NoopObserver,
        );
        let english = result.domain(Domain::English).unwrap();
        assert_eq!(english.threshold, Some(55.0));
        assert_eq!(english.delta, Some(9.3));
        assert!(english.meets_threshold);
        assert_eq!(result.band, RecommendationBand::ReadyToAdmit);
        assert_eq!(result.overall_academic_pct, 64.8);
    }

    #[test]
    fn equal_to_threshold_meets() {
        let result = calculate(
            &input(55.0, 60.0, 50.0),
            &fixture_thresholds(),
            &RecommendationConfig::default(),
            &NoopObserver,
        );
        assert!(result.domains.iter().all(|d| d.delta == Some(0.0) && d.meets_threshold));
        assert_eq!(result.band, RecommendationBand::ReadyToAdmit);
    }

    #[test]
    fn band_rules() {
        // Maths 5 below: supportable.
        assert_eq!(band(&input(60.0, 55.0, 55.0)), RecommendationBand::ReadyWithAcademicSupport);
        // English 5 below, others meet.
        assert_eq!(band(&input(50.0, 65.0, 55.0)), RecommendationBand::AdmitWithLanguageSupport);
        // Everyone a little below.
        assert_eq!(band(&input(50.0, 55.0, 45.0)), RecommendationBand::ConsiderWithSupport);
        // Reasoning far below.
        assert_eq!(band(&input(70.0, 70.0, 20.0)), RecommendationBand::NotYetReady);

        let mut low_mindset = input(70.0, 70.0, 70.0);
        low_mindset.mindset = Some(1.0);
        assert_eq!(band(&low_mindset), RecommendationBand::ReadyWithAcademicSupport);

        let mut weak_lens = input(70.0, 70.0, 70.0);
        weak_lens.lenses.insert(Domain::Values, 0.5);
        assert_eq!(band(&weak_lens), RecommendationBand::ReadyWithAcademicSupport);
    }

    #[test]
    fn band_is_monotonic_in_each_domain() {
        let grid = [0.0, 20.0, 40.0, 45.0, 49.9, 50.0, 54.0, 55.0, 59.0, 60.0, 65.0, 80.0, 100.0];
        for &e in &grid {
            for &m in &grid {
                for &r in &grid {
                    let base = band(&input(e, m, r));
                    for &up in grid.iter().filter(|&&x| x > e) {
                        assert!(band(&input(up, m, r)) >= base, "english {e}->{up} at {m},{r}");
                    }
                    for &up in grid.iter().filter(|&&x| x > m) {
                        assert!(band(&input(e, up, r)) >= base, "maths {m}->{up} at {e},{r}");
                    }
                    for &up in grid.iter().filter(|&&x| x > r) {
                        assert!(band(&input(e, m, up)) >= base, "reasoning {r}->{up} at {e},{m}");
                    }
                }
            }
        }
    }

    #[test]
    fn writing_blends_into_domain_pct() {
        assert_eq!(combine(Some(80.0), Some(2.0), 0.3), Some(71.0));
        assert_eq!(combine(None, Some(3.0), 0.3), Some(75.0));
        assert_eq!(combine(Some(64.3), None, 0.3), Some(64.3));
        assert_eq!(combine(None, None, 0.3), None);
    }

    #[test]
    fn missing_threshold_marks_domain_not_assessed() {
        let mut i = input(70.0, 70.0, 70.0);
        i.grade = "12".into();
        let observer = RecordingObserver::new();
        let result = calculate(
            &i,
            &fixture_thresholds(),
            &RecommendationConfig::default(),
            &observer,
        );
        assert_eq!(result.band, RecommendationBand::NotYetReady);
        assert!(result.requires_manual_review);
        assert!(result.domains.iter().all(|d| !d.assessed));
        assert_eq!(observer.issues().len(), 3);
        assert_eq!(result.overall_academic_pct, 0.0);
    }

    #[test]
    fn unassessed_domain_caps_band_and_flags_review() {
        let mut i = input(80.0, 80.0, 80.0);
        i.domains[2].mcq_pct = None;
        let result = calculate(
            &i,
            &fixture_thresholds(),
            &RecommendationConfig::default(),
            &NoopObserver,
        );
        assert_eq!(result.band, RecommendationBand::ConsiderWithSupport);
        assert!(result.requires_manual_review);
        assert_eq!(result.overall_academic_pct, 80.0);
    }

    #[test]
    fn evidence_from_scores_averages_writing() {
        use crate::model::{EvaluationSource, WritingBand};
        let scores = vec![
            DomainScore {
                domain: Domain::English,
                correct: 3,
                total: 4,
                pct: 75.0,
                assessed: true,
                scaled: None,
            },
            DomainScore {
                domain: Domain::Mindset,
                correct: 1,
                total: 2,
                pct: 50.0,
                assessed: true,
                scaled: Some(2.0),
            },
        ];
        let eval = |domain, score, review| WritingEvaluation {
            domain,
            band: WritingBand::for_score(score),
            score,
            content_narrative: String::new(),
            writing_narrative: String::new(),
            threshold_comment: String::new(),
            needs_manual_review: review,
            source: EvaluationSource::Ai,
        };
        let evaluations = vec![
            eval(Domain::English, 3.0, false),
            eval(Domain::English, 2.0, false),
            eval(Domain::Creativity, 1.5, true),
        ];
        let i = RecommendationInput::from_scores("7", &scores, &evaluations);
        assert_eq!(i.domains[0].mcq_pct, Some(75.0));
        assert_eq!(i.domains[0].writing_score, Some(2.5));
        assert_eq!(i.domains[1].mcq_pct, None);
        assert_eq!(i.mindset, Some(2.0));
        assert_eq!(i.lenses.get(&Domain::Creativity), Some(&1.5));
        assert!(i.flagged_for_review);
    }

    #[test]
    fn narrative_explains_deltas() {
        let result = calculate(
            &input(64.3, 70.0, 40.0),
            &fixture_thresholds(),
            &RecommendationConfig::default(),
            &NoopObserver,
        );
        assert!(result
            .narrative
            .starts_with("Recommendation: Ready with academic support."));
        assert!(result.narrative.contains("English 64.3% against a threshold of 55.0% (+9.3)."));
        assert!(result.narrative.contains("Reasoning 40.0% against a threshold of 50.0% (-10.0)."));
    }
}
