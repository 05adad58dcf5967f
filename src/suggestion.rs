//! Safety-monotonic suggestions derived from admitted ghosts.
//!
//! Peers may only ever propose stricter behaviour. That rule is carried by
//! the types: [`Direction`] has a single variant, the threshold, latency and
//! risk-level fields are single-variant enums, and [`Action`] can only be
//! built through the three tightening constructors. There is no value of
//! these types that describes a loosening.

use serde::{Deserialize, Serialize};

use crate::ghost::{Ghost, GuardianAction};
use crate::policy::MeshPolicy;

/// Source label for suggestions created by packet import.
pub const MESH_IMPORT_SOURCE: &str = "mesh_import";

/// Direction of a proposed change. Only tightening exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The change can only make enforcement stricter.
    SaferOnly,
}

/// Threshold a `tighten_threshold` action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdField {
    /// Manipulation score above which the guardian halts.
    ManipulationScoreCutoff,
}

/// Latency bound a `tighten_latency` action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyField {
    /// Longest tolerated time to halt, in milliseconds.
    MaxHaltLatencyMs,
}

/// Risk classification a pattern can be raised to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Highest risk class.
    High,
}

/// What an [`Action`] proposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Lower a score cutoff.
    TightenThreshold {
        /// Targeted threshold.
        field: ThresholdField,
        /// Proposed cutoff in `[0, 1]`.
        new_value: f64,
    },
    /// Require a faster halt.
    TightenLatency {
        /// Targeted latency bound.
        field: LatencyField,
        /// Proposed maximum in milliseconds.
        new_value: u32,
    },
    /// Classify a pattern as high risk.
    SetHighRiskPattern {
        /// Category label.
        pattern: String,
        /// Risk class to assign.
        risk_level: RiskLevel,
    },
}

/// One bounded tightening proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    kind: ActionKind,
    direction: Direction,
}

impl Action {
    /// Propose a manipulation score cutoff, clamped to `[0, 1]` and kept to
    /// four decimals. The stored value never exceeds `new_value`: when the
    /// nearest four-decimal step lies above it, the step below is used. A
    /// non-finite input proposes the strictest cutoff.
    pub fn tighten_threshold(new_value: f64) -> Self {
        let clamped = if new_value.is_finite() {
            new_value.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let steps = (clamped * 10_000.0).round();
        let mut cutoff = steps / 10_000.0;
        if cutoff > clamped {
            cutoff = (steps - 1.0) / 10_000.0;
        }
        Self::safer(ActionKind::TightenThreshold {
            field: ThresholdField::ManipulationScoreCutoff,
            new_value: cutoff.clamp(0.0, clamped),
        })
    }

    /// Propose a maximum halt latency.
    pub fn tighten_latency(max_halt_latency_ms: u32) -> Self {
        Self::safer(ActionKind::TightenLatency {
            field: LatencyField::MaxHaltLatencyMs,
            new_value: max_halt_latency_ms,
        })
    }

    /// Propose classifying `pattern` as high risk.
    pub fn high_risk_pattern(pattern: impl Into<String>) -> Self {
        Self::safer(ActionKind::SetHighRiskPattern {
            pattern: pattern.into(),
            risk_level: RiskLevel::High,
        })
    }

    fn safer(kind: ActionKind) -> Self {
        Self {
            kind,
            direction: Direction::SaferOnly,
        }
    }

    /// What this action proposes.
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Direction tag carried on the wire.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether the action is tagged `safer_only`.
    pub fn is_safer_only(&self) -> bool {
        matches!(self.direction, Direction::SaferOnly)
    }
}

/// Review state of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    /// Waiting for an operator.
    PendingHumanReview,
    /// Approved; the operator still has to edit live configuration.
    AppliedPendingManualMerge,
}

/// A proposed tightening awaiting human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pattern: String,
    proposed_at: i64,
    source: String,
    #[serde(default)]
    notes: Vec<String>,
    #[serde(default)]
    actions: Vec<Action>,
    status: SuggestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    applied_at: Option<i64>,
}

impl Suggestion {
    /// Empty pending suggestion for `pattern`.
    pub fn new(pattern: impl Into<String>, source: impl Into<String>, proposed_at: i64) -> Self {
        Self {
            pattern: pattern.into(),
            proposed_at,
            source: source.into(),
            notes: Vec::new(),
            actions: Vec::new(),
            status: SuggestionStatus::PendingHumanReview,
            applied_at: None,
        }
    }

    /// Append an action with its explanatory note.
    pub fn push(&mut self, action: Action, note: impl Into<String>) {
        self.actions.push(action);
        self.notes.push(note.into());
    }

    /// Category label the suggestion concerns.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Creation time in epoch seconds.
    pub fn proposed_at(&self) -> i64 {
        self.proposed_at
    }

    /// Where the evidence came from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Human-readable rationale, one line per action.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Proposed actions in derivation order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Current review state.
    pub fn status(&self) -> SuggestionStatus {
        self.status
    }

    /// When an operator approved it, if they have.
    pub fn applied_at(&self) -> Option<i64> {
        self.applied_at
    }

    /// Normalize for queueing: keep only `safer_only` actions and reset the
    /// review state. Returns `None` when no action survives.
    pub(crate) fn into_reviewable(mut self) -> Option<Self> {
        self.actions.retain(Action::is_safer_only);
        if self.actions.is_empty() {
            return None;
        }
        self.status = SuggestionStatus::PendingHumanReview;
        self.applied_at = None;
        Some(self)
    }

    /// Flip to approved. Returns false if already approved with a timestamp.
    pub(crate) fn mark_applied(&mut self, at: i64) -> bool {
        match (self.status, self.applied_at) {
            (SuggestionStatus::AppliedPendingManualMerge, Some(_)) => false,
            (SuggestionStatus::AppliedPendingManualMerge, None) => {
                self.applied_at = Some(at);
                true
            }
            (SuggestionStatus::PendingHumanReview, _) => {
                self.status = SuggestionStatus::AppliedPendingManualMerge;
                self.applied_at = Some(at);
                true
            }
        }
    }
}

/// Turn one admitted ghost into a tightening suggestion.
///
/// - a manipulation score proposes `max(0, score - margin)` as the cutoff;
/// - a halt latency proposes matching or beating the peer's reaction time;
/// - a halt marks the pattern high risk.
///
/// The result may carry zero actions; callers discard those.
pub fn derive(ghost: &Ghost, policy: &MeshPolicy, proposed_at: i64) -> Suggestion {
    let mut suggestion = Suggestion::new(ghost.pattern(), MESH_IMPORT_SOURCE, proposed_at);

    if let Some(score) = ghost.manipulation_score() {
        let cutoff = (score - policy.manipulation_margin()).max(0.0);
        let action = Action::tighten_threshold(cutoff);
        let proposed = match action.kind() {
            ActionKind::TightenThreshold { new_value, .. } => *new_value,
            _ => cutoff,
        };
        suggestion.push(
            action,
            format!("Observed halt at manipulation_score≈{score:.3}; propose cutoff {proposed:.3}."),
        );
    }

    if let Some(ms) = ghost.halt_latency_ms() {
        suggestion.push(
            Action::tighten_latency(ms),
            format!("Peer halted in {ms}ms; propose matching or faster."),
        );
    }

    if ghost.guardian_action() == GuardianAction::Halt {
        suggestion.push(
            Action::high_risk_pattern(ghost.pattern()),
            "Pattern was hard-stopped by peer guardian; mark as high-risk by default.",
        );
    }

    suggestion
}
