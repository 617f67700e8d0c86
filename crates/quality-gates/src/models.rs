//! Quality Gate Models
//!
//! Verdict taxonomy for the second-pass critic and the per-slot outcome of
//! the retry loop.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Score at or above which a finding is approved.
pub const DEFAULT_APPROVAL_THRESHOLD: u8 = 75;

/// Kind of defect the critic found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// Relevant exam data was not analyzed
    MissingDataAnalysis,
    /// Vague answer without specifics
    GenericResponse,
    /// Claim not backed by the provided data
    UnsupportedClaim,
    /// Recommendations incomplete or not actionable
    IncompleteRecommendations,
    /// Prescription or dosing problem
    MedicationIssues,
    Other,
}

impl std::fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueCategory::MissingDataAnalysis => write!(f, "missing_data_analysis"),
            IssueCategory::GenericResponse => write!(f, "generic_response"),
            IssueCategory::UnsupportedClaim => write!(f, "unsupported_claim"),
            IssueCategory::IncompleteRecommendations => write!(f, "incomplete_recommendations"),
            IssueCategory::MedicationIssues => write!(f, "medication_issues"),
            IssueCategory::Other => write!(f, "other"),
        }
    }
}

/// How serious an issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Desirable improvement
    Minor,
    /// Gap that compromises the analysis
    Major,
    /// Could harm the patient or cause a wrong diagnosis
    Critical,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueSeverity::Minor => write!(f, "minor"),
            IssueSeverity::Major => write!(f, "major"),
            IssueSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// One problem reported by the critic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationIssue {
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub description: String,
    /// Specific suggestion on how to fix the problem
    pub suggestion: String,
}

/// Outcome of validating one finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// 0-100
    pub score: u8,
    pub approved: bool,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
    #[serde(default)]
    pub feedback: String,
    /// The verdict was produced because the validator itself failed
    #[serde(default)]
    pub fail_open: bool,
}

impl ValidationVerdict {
    /// Verdict from a critic score. Approval is decided here, from the score
    /// alone.
    pub fn scored(
        score: u8,
        threshold: u8,
        issues: Vec<ValidationIssue>,
        feedback: impl Into<String>,
    ) -> Self {
        let score = score.min(100);
        Self {
            score,
            approved: score >= threshold,
            issues,
            feedback: feedback.into(),
            fail_open: false,
        }
    }

    /// Approval issued because the validator could not produce a verdict.
    pub fn fail_open(cause: impl std::fmt::Display) -> Self {
        Self {
            score: 0,
            approved: true,
            issues: Vec::new(),
            feedback: format!("validator unavailable: {}", cause),
            fail_open: true,
        }
    }

    /// Highest issue severity, if any issue was reported.
    pub fn worst_severity(&self) -> Option<IssueSeverity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

/// How a slot's retry loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// The critic approved the finding
    Approved,
    /// The validator failed; the finding was accepted unreviewed
    FailOpen,
    /// Rejected on the last permitted attempt; the last finding was kept
    Exhausted,
    /// The analyzer produced a placeholder; nothing was reviewed
    Unavailable,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalState::Approved => write!(f, "approved"),
            TerminalState::FailOpen => write!(f, "fail_open"),
            TerminalState::Exhausted => write!(f, "exhausted"),
            TerminalState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Summary of one slot's retry loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotResolution {
    pub terminal: TerminalState,
    /// Analyzer invocations made (1 + retries used)
    pub attempts: u32,
    /// Score of the last critic verdict, when the critic produced one
    pub last_score: Option<u8>,
}

impl SlotResolution {
    /// Resolution for a slot that never reached the retry loop (cancelled,
    /// task failure).
    pub fn unavailable(attempts: u32) -> Self {
        Self {
            terminal: TerminalState::Unavailable,
            attempts,
            last_score: None,
        }
    }
}
