//! Emergency triage from the fluid-overload percentage.
//!
//! A pure mapping from one clinical number to everything the queue board
//! derives from it: the emergency flag, a priority score, a staff-facing
//! label, an advisory note and the recommended dialysis solution. The
//! label thresholds apply to the priority *score*, not to the percentage;
//! both layers are load-bearing and must stay as they are.

use capdq_types::FluidOverload;
use serde::Serialize;

/// Percentage at or above which a patient is classified as an emergency.
pub const EMERGENCY_THRESHOLD: f64 = 40.0;
/// Percentage at or above which the high-priority band starts.
pub const HIGH_THRESHOLD: f64 = 50.0;
/// Percentage at or above which the critical band starts.
pub const CRITICAL_THRESHOLD: f64 = 70.0;

/// Staff-facing urgency label, derived from the priority score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriorityLabel {
    Critical,
    High,
    Medium,
    Normal,
}

impl PriorityLabel {
    fn from_score(score: u8) -> Self {
        if score >= 15 {
            PriorityLabel::Critical
        } else if score >= 10 {
            PriorityLabel::High
        } else if score >= 5 {
            PriorityLabel::Medium
        } else {
            PriorityLabel::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PriorityLabel::Critical => "Critical",
            PriorityLabel::High => "High",
            PriorityLabel::Medium => "Medium",
            PriorityLabel::Normal => "Normal",
        }
    }
}

impl std::fmt::Display for PriorityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended PD solution strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SolutionRecommendation {
    /// Colour-coded bag label as printed on the board.
    pub label: &'static str,
    /// Exchange guidance accompanying the label.
    pub guidance: &'static str,
}

/// Everything the board derives from one fluid-overload reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub is_emergency: bool,
    /// Urgency score; higher is more urgent. Drives consultation order.
    pub priority: u8,
    pub label: PriorityLabel,
    pub advisory: &'static str,
    pub solution: SolutionRecommendation,
}

/// Classifies a fluid-overload reading.
///
/// Total over all inputs: an unavailable metric arrives as 0.0 (see
/// [`FluidOverload`]) and classifies as Normal. The 40-49 and 50-69 bands
/// both recommend the 2.5% bag; only the guidance wording differs between
/// them.
pub fn evaluate(percentage: FluidOverload) -> RiskAssessment {
    let value = percentage.value();

    let (priority, advisory, solution) = if value >= CRITICAL_THRESHOLD {
        (
            15,
            "Critical fluid overload. Immediate attention required.",
            SolutionRecommendation {
                label: "RED(4.25%)",
                guidance: "Start 4.25% dextrose exchanges until the overload resolves.",
            },
        )
    } else if value >= HIGH_THRESHOLD {
        (
            10,
            "High fluid overload. Priority consultation advised.",
            SolutionRecommendation {
                label: "GREEN(2.5%)",
                guidance: "Use 2.5% dextrose exchanges for faster fluid removal.",
            },
        )
    } else if value >= EMERGENCY_THRESHOLD {
        (
            5,
            "Moderate fluid overload. Requires attention.",
            SolutionRecommendation {
                label: "GREEN(2.5%)",
                guidance: "Use 2.5% dextrose exchanges and reassess at the next exchange.",
            },
        )
    } else {
        (
            0,
            "Fluid status normal. Routine consultation.",
            SolutionRecommendation {
                label: "YELLOW(1.5%)",
                guidance: "Maintain 1.5% dextrose exchanges.",
            },
        )
    };

    RiskAssessment {
        is_emergency: value >= EMERGENCY_THRESHOLD,
        priority,
        label: PriorityLabel::from_score(priority),
        advisory,
        solution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assess(value: f64) -> RiskAssessment {
        evaluate(FluidOverload::new(value))
    }

    #[test]
    fn priority_is_monotone_in_percentage() {
        let grid: Vec<f64> = (0..=1100).map(|i| i as f64 / 10.0).collect();
        for pair in grid.windows(2) {
            let (lower, upper) = (assess(pair[0]), assess(pair[1]));
            assert!(
                lower.priority <= upper.priority,
                "priority regressed between {} and {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn emergency_boundary_is_exactly_forty() {
        assert!(!assess(39.999).is_emergency);
        assert!(assess(40.0).is_emergency);
    }

    #[test]
    fn solution_boundary_is_exactly_seventy() {
        assert_eq!(assess(69.999).solution.label, "GREEN(2.5%)");
        assert_eq!(assess(70.0).solution.label, "RED(4.25%)");
    }

    #[test]
    fn priority_scores_match_brackets() {
        assert_eq!(assess(0.0).priority, 0);
        assert_eq!(assess(39.999).priority, 0);
        assert_eq!(assess(40.0).priority, 5);
        assert_eq!(assess(49.999).priority, 5);
        assert_eq!(assess(50.0).priority, 10);
        assert_eq!(assess(69.999).priority, 10);
        assert_eq!(assess(70.0).priority, 15);
        assert_eq!(assess(130.0).priority, 15);
    }

    #[test]
    fn labels_follow_the_score_not_the_percentage() {
        assert_eq!(assess(75.0).label, PriorityLabel::Critical);
        assert_eq!(assess(55.0).label, PriorityLabel::High);
        assert_eq!(assess(45.0).label, PriorityLabel::Medium);
        assert_eq!(assess(10.0).label, PriorityLabel::Normal);
    }

    #[test]
    fn green_bands_share_the_label_but_not_the_guidance() {
        let moderate = assess(45.0);
        let high = assess(55.0);
        assert_eq!(moderate.solution.label, high.solution.label);
        assert_ne!(moderate.solution.guidance, high.solution.guidance);
        assert_ne!(moderate.advisory, high.advisory);
    }

    #[test]
    fn unavailable_reading_classifies_as_normal() {
        let assessment = evaluate(FluidOverload::ZERO);
        assert!(!assessment.is_emergency);
        assert_eq!(assessment.label, PriorityLabel::Normal);
        assert_eq!(assessment.solution.label, "YELLOW(1.5%)");
    }
}
