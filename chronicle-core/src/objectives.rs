//! Chapter objectives and the gate that decides whether a story may move on.

use crate::arc::StoryArc;
use crate::state::StoryState;
use tracing::debug;

/// Narrative volume (before pacing) that must be exceeded before stale
/// objectives are pruned.
pub const PRUNE_NARRATIVE_THRESHOLD: usize = 20;

/// Pending objectives at or below this count are never pruned.
pub const MIN_PENDING_FOR_PRUNE: usize = 5;

/// Share of pending objectives kept by a prune, before pacing.
pub const RETENTION_RATE: f64 = 0.5;

/// Pruning never leaves fewer pending objectives than this.
pub const MIN_RETAINED_OBJECTIVES: usize = 3;

/// Add a pending objective to the active chapter.
///
/// Returns `false` when the text is blank or the chapter already tracks it.
pub fn add_objective(state: &mut StoryState, objective: &str) -> bool {
    state.current_chapter.push_pending(objective)
}

/// Move an exact-match pending objective into the completed list.
///
/// Completing something that is not pending is a no-op.
pub fn complete_objective(state: &mut StoryState, objective: &str) -> bool {
    state.current_chapter.mark_completed(objective)
}

/// Drop the oldest pending objectives once the story has moved well past
/// them. Returns how many were removed.
pub fn prune_objectives(state: &mut StoryState) -> usize {
    let multiplier = state.effective_pace().multiplier();
    let pending = state.current_chapter.pending_objectives().len();
    let narrative = state.narrative_history.len();

    if pending <= MIN_PENDING_FOR_PRUNE
        || (narrative as f64) <= PRUNE_NARRATIVE_THRESHOLD as f64 * multiplier
    {
        return 0;
    }

    let target = ((pending as f64 * RETENTION_RATE / multiplier).ceil() as usize)
        .max(MIN_RETAINED_OBJECTIVES)
        .min(pending);
    let dropped = state.current_chapter.drop_oldest_pending(pending - target);

    if !dropped.is_empty() {
        debug!(removed = dropped.len(), kept = target, "pruned stale objectives");
    }
    dropped.len()
}

/// Minimum progress an arc needs before its chapter may close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcRequirements {
    pub min_narrative_exchanges: usize,
    pub min_completed_objectives: usize,
}

impl ArcRequirements {
    /// Unscaled requirements for an arc.
    pub fn base(arc: StoryArc) -> Self {
        let (min_narrative_exchanges, min_completed_objectives) = match arc {
            StoryArc::Introduction => (5, 1),
            StoryArc::RisingAction => (8, 2),
            StoryArc::Climax => (6, 2),
            StoryArc::FallingAction => (5, 1),
            StoryArc::Resolution => (4, 1),
        };
        Self {
            min_narrative_exchanges,
            min_completed_objectives,
        }
    }

    /// Requirements scaled by the pacing multiplier, rounded up.
    pub fn scaled(arc: StoryArc, multiplier: f64) -> Self {
        let base = Self::base(arc);
        let scale = |n: usize| (n as f64 * multiplier).ceil() as usize;
        Self {
            min_narrative_exchanges: scale(base.min_narrative_exchanges),
            min_completed_objectives: scale(base.min_completed_objectives),
        }
    }
}

/// Whether the current chapter may progress, and what is missing if not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArcReadiness {
    pub can_progress: bool,
    pub missing_reasons: Vec<String>,
}

/// Check the current arc's requirements against the story so far.
pub fn meets_arc_requirements(state: &StoryState) -> ArcReadiness {
    let arc = state.current_chapter.arc();
    let required = ArcRequirements::scaled(arc, state.effective_pace().multiplier());
    let mut missing_reasons = Vec::new();

    let exchanges = state.narrative_history.len();
    if exchanges < required.min_narrative_exchanges {
        missing_reasons.push(format!(
            "Need {} narrative exchanges in the {arc} arc (have {exchanges})",
            required.min_narrative_exchanges
        ));
    }

    let completed = state.current_chapter.completed_objectives().len();
    if completed < required.min_completed_objectives {
        missing_reasons.push(format!(
            "Need {} completed objectives in the {arc} arc (have {completed})",
            required.min_completed_objectives
        ));
    }

    if matches!(arc, StoryArc::RisingAction | StoryArc::Climax) && state.combat_encounters == 0 {
        missing_reasons.push(format!(
            "The {arc} arc needs at least one combat encounter"
        ));
    }

    if arc == StoryArc::Resolution
        && !state.chapters.iter().any(|c| c.arc() == StoryArc::Climax)
    {
        missing_reasons.push("Resolution needs a completed climax chapter".to_string());
    }

    ArcReadiness {
        can_progress: missing_reasons.is_empty(),
        missing_reasons,
    }
}
