//! The five-stage story arc machine.
//!
//! Arcs cycle strictly in order:
//!
//! ```text
//! introduction → rising-action → climax → falling-action → resolution ─┐
//!      ▲                                                               │
//!      └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! A chapter advances once three quarters of its objectives are complete
//! (and the objective tracker agrees the arc's requirements are met). The
//! closed chapter is archived and a new one opens in the next arc.

use crate::state::{Chapter, StoryState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Share of a chapter's objectives that must be complete before it advances.
pub const ADVANCE_RATIO: f64 = 0.75;

/// How many recent choices the repetition check looks at.
const REPEAT_WINDOW: usize = 5;

/// How often one normalized choice must recur within the window.
const REPEAT_THRESHOLD: usize = 3;

/// Narrative stage of a chapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum StoryArc {
    #[default]
    Introduction,
    RisingAction,
    Climax,
    FallingAction,
    Resolution,
}

impl StoryArc {
    pub const ALL: [StoryArc; 5] = [
        StoryArc::Introduction,
        StoryArc::RisingAction,
        StoryArc::Climax,
        StoryArc::FallingAction,
        StoryArc::Resolution,
    ];

    /// The arc that follows this one. Resolution wraps back to introduction.
    pub fn next(&self) -> StoryArc {
        match self {
            StoryArc::Introduction => StoryArc::RisingAction,
            StoryArc::RisingAction => StoryArc::Climax,
            StoryArc::Climax => StoryArc::FallingAction,
            StoryArc::FallingAction => StoryArc::Resolution,
            StoryArc::Resolution => StoryArc::Introduction,
        }
    }

    /// Parse a label. Unknown labels map to introduction.
    pub fn parse(label: &str) -> StoryArc {
        match label.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "rising-action" => StoryArc::RisingAction,
            "climax" => StoryArc::Climax,
            "falling-action" => StoryArc::FallingAction,
            "resolution" => StoryArc::Resolution,
            _ => StoryArc::Introduction,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoryArc::Introduction => "introduction",
            StoryArc::RisingAction => "rising-action",
            StoryArc::Climax => "climax",
            StoryArc::FallingAction => "falling-action",
            StoryArc::Resolution => "resolution",
        }
    }

    /// Title given to a chapter opened in this arc.
    pub fn title(&self) -> &'static str {
        match self {
            StoryArc::Introduction => "The Beginning",
            StoryArc::RisingAction => "Rising Tensions",
            StoryArc::Climax => "The Climax",
            StoryArc::FallingAction => "The Aftermath",
            StoryArc::Resolution => "Resolution",
        }
    }

    /// Summary given to a chapter opened in this arc.
    pub fn summary(&self) -> &'static str {
        match self {
            StoryArc::Introduction => "A new journey begins as the world and its people take shape.",
            StoryArc::RisingAction => "Complications mount and the stakes grow higher.",
            StoryArc::Climax => "Every thread pulls tight as the decisive confrontation arrives.",
            StoryArc::FallingAction => "The dust settles and the consequences come into view.",
            StoryArc::Resolution => "Loose ends are tied and the tale draws to a close.",
        }
    }

    /// Steady-state direction for the narrator while a chapter sits in this arc.
    pub fn guidance(&self) -> &'static str {
        match self {
            StoryArc::Introduction => {
                "Establish the setting, introduce key characters, and hint at the central conflict."
            }
            StoryArc::RisingAction => {
                "Escalate the conflict with new obstacles and reveal deeper motives."
            }
            StoryArc::Climax => {
                "Bring the central conflict to a head. Choices now carry the highest stakes."
            }
            StoryArc::FallingAction => {
                "Show the consequences of the climax and let the characters react to them."
            }
            StoryArc::Resolution => {
                "Resolve the remaining threads and give the player a sense of closure."
            }
        }
    }
}

impl From<String> for StoryArc {
    fn from(label: String) -> Self {
        StoryArc::parse(&label)
    }
}

impl std::fmt::Display for StoryArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Instruction used when no arc-pair guidance is mapped.
pub const GENERIC_TRANSITION_GUIDANCE: &str =
    "Continue the story naturally from where it left off, keeping established details consistent.";

/// Narrative instructions for moving from `prev` to `new`.
pub fn transition_guidance(prev: StoryArc, new: StoryArc) -> &'static str {
    match (prev, new) {
        (StoryArc::Introduction, StoryArc::RisingAction) => {
            "The opening is over. Introduce a complication that disrupts the status quo and \
             forces the player to commit to a path."
        }
        (StoryArc::RisingAction, StoryArc::Climax) => {
            "Tension peaks. Bring the main antagonist or threat into direct confrontation \
             and make the coming choice decisive."
        }
        (StoryArc::Climax, StoryArc::FallingAction) => {
            "The decisive moment has passed. Describe its immediate aftermath and what it \
             cost, and let the pace slow."
        }
        (StoryArc::FallingAction, StoryArc::Resolution) => {
            "Start tying up loose ends. Revisit characters met along the way and show how \
             they have changed."
        }
        (StoryArc::Resolution, StoryArc::Introduction) => {
            "A chapter of the saga has closed. Open a fresh adventure that grows out of the \
             world as it now stands, with a new hook for the player."
        }
        _ => GENERIC_TRANSITION_GUIDANCE,
    }
}

/// True when at least three quarters of the chapter's objectives are done.
/// A chapter with no objectives never advances on its own.
pub fn should_advance(chapter: &Chapter) -> bool {
    let total = chapter.objective_count();
    if total == 0 {
        return false;
    }
    let completed = chapter.completed_objectives().len() as f64;
    completed / total as f64 >= ADVANCE_RATIO
}

/// The result of moving a campaign into its next arc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcTransition {
    pub from: StoryArc,
    pub to: StoryArc,
    /// Title of the chapter that was closed.
    pub closed_chapter: String,
    pub guidance: &'static str,
}

/// Archive the current chapter and open one in the next arc.
pub fn advance_chapter(state: &mut StoryState) -> ArcTransition {
    let from = state.current_chapter.arc();
    let to = from.next();
    let closed_chapter = state.current_chapter.title.clone();

    state.replace_chapter(Chapter::new(to.title(), to.summary(), to));

    info!(from = %from, to = %to, chapter = %closed_chapter, "story arc advanced");

    ArcTransition {
        from,
        to,
        closed_chapter,
        guidance: transition_guidance(from, to),
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_choice(choice: &str) -> String {
    choice
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when the player keeps making the same choice: one normalized choice
/// appears at least three times among the last five.
pub fn is_repeating(state: &StoryState) -> bool {
    let mut counts: HashMap<String, usize> = HashMap::new();
    state
        .choices()
        .iter()
        .rev()
        .take(REPEAT_WINDOW)
        .map(|c| normalize_choice(c))
        .filter(|c| !c.is_empty())
        .any(|c| {
            let count = counts.entry(c).or_insert(0);
            *count += 1;
            *count >= REPEAT_THRESHOLD
        })
}
