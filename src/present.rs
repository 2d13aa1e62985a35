use serde::Serialize;

use crate::analysis::{AnalysisVerdict, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictCategory {
    Relevant,
    Irrelevant,
    HighlyRelevant,
    Unknown,
}

impl VerdictCategory {
    fn css_class(self) -> Option<&'static str> {
        match self {
            Self::Relevant => Some("relevant"),
            Self::Irrelevant => Some("irrelevant"),
            Self::HighlyRelevant => Some("highly-relevant"),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriterionRow {
    pub criterion: String,
    pub met: bool,
    pub explanation: String,
    pub status: &'static str,
}

/// Everything needed to draw a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderInstructions {
    pub category: VerdictCategory,
    pub label: String,
    pub css_class: Option<&'static str>,
    /// Width of the confidence bar, 0-100.
    pub confidence_percent: u8,
    pub confidence_label: String,
    pub rows: Vec<CriterionRow>,
    pub reasoning: String,
}

pub fn present(verdict: &AnalysisVerdict) -> RenderInstructions {
    let category = match verdict.verdict {
        Some(Verdict::Relevant) => VerdictCategory::Relevant,
        Some(Verdict::Irrelevant) => VerdictCategory::Irrelevant,
        Some(Verdict::HighlyRelevant) => VerdictCategory::HighlyRelevant,
        Some(Verdict::Unrecognized(_)) | None => VerdictCategory::Unknown,
    };
    // Unrecognized labels are shown as the model wrote them.
    let label = verdict
        .verdict
        .as_ref()
        .map(Verdict::label)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or("UNKNOWN");

    let confidence = verdict.confidence.map(|c| c.clamp(0, 100) as u8);

    let rows = verdict
        .criteria_assessment
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|item| {
            let met = item.met.unwrap_or(false);
            CriterionRow {
                criterion: item.criterion.clone().unwrap_or_default(),
                met,
                explanation: item.explanation.clone().unwrap_or_default(),
                status: if met { "met" } else { "not-met" },
            }
        })
        .collect();

    RenderInstructions {
        category,
        label: label.to_string(),
        css_class: category.css_class(),
        confidence_percent: confidence.unwrap_or(0),
        confidence_label: confidence
            .map(|c| format!("{}%", c))
            .unwrap_or_else(|| "N/A".to_string()),
        rows,
        reasoning: verdict.reasoning.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CriterionAssessment;

    #[test]
    fn test_full_verdict() {
        let verdict = AnalysisVerdict {
            verdict: Some(Verdict::HighlyRelevant),
            confidence: Some(88),
            criteria_assessment: Some(vec![
                CriterionAssessment {
                    criterion: Some("Topic".into()),
                    met: Some(true),
                    explanation: Some("Directly on topic".into()),
                },
                CriterionAssessment {
                    criterion: Some("Sample size".into()),
                    met: Some(false),
                    explanation: Some("n=12".into()),
                },
            ]),
            reasoning: Some("Strong match.".into()),
        };
        let r = present(&verdict);
        assert_eq!(r.category, VerdictCategory::HighlyRelevant);
        assert_eq!(r.label, "HIGHLY RELEVANT");
        assert_eq!(r.css_class, Some("highly-relevant"));
        assert_eq!(r.confidence_percent, 88);
        assert_eq!(r.confidence_label, "88%");
        assert_eq!(r.rows.len(), 2);
        assert_eq!(r.rows[0].status, "met");
        assert_eq!(r.rows[1].criterion, "Sample size");
        assert_eq!(r.rows[1].status, "not-met");
        assert_eq!(r.reasoning, "Strong match.");
    }

    #[test]
    fn test_empty_verdict_renders_without_rows() {
        let r = present(&AnalysisVerdict::default());
        assert_eq!(r.category, VerdictCategory::Unknown);
        assert_eq!(r.label, "UNKNOWN");
        assert_eq!(r.css_class, None);
        assert_eq!(r.confidence_percent, 0);
        assert_eq!(r.confidence_label, "N/A");
        assert!(r.rows.is_empty());
        assert_eq!(r.reasoning, "");

        let r = present(&AnalysisVerdict {
            criteria_assessment: Some(vec![]),
            ..Default::default()
        });
        assert!(r.rows.is_empty());
    }

    #[test]
    fn test_unrecognized_label_is_kept() {
        let r = present(&AnalysisVerdict {
            verdict: Some(Verdict::Unrecognized("PARTIALLY RELEVANT".into())),
            ..Default::default()
        });
        assert_eq!(r.category, VerdictCategory::Unknown);
        assert_eq!(r.label, "PARTIALLY RELEVANT");
        assert_eq!(r.css_class, None);

        let r = present(&AnalysisVerdict {
            verdict: Some(Verdict::Unrecognized("  ".into())),
            ..Default::default()
        });
        assert_eq!(r.label, "UNKNOWN");
    }

    #[test]
    fn test_confidence_is_clamped() {
        let high = present(&AnalysisVerdict { confidence: Some(140), ..Default::default() });
        assert_eq!(high.confidence_percent, 100);
        let low = present(&AnalysisVerdict { confidence: Some(-5), ..Default::default() });
        assert_eq!(low.confidence_percent, 0);
    }

    #[test]
    fn test_partial_rows() {
        let r = present(&AnalysisVerdict {
            verdict: Some(Verdict::Irrelevant),
            criteria_assessment: Some(vec![CriterionAssessment::default()]),
            ..Default::default()
        });
        assert_eq!(r.css_class, Some("irrelevant"));
        assert_eq!(r.rows[0], CriterionRow {
            criterion: String::new(),
            met: false,
            explanation: String::new(),
            status: "not-met",
        });
    }
}
