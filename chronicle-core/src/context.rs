//! Prompt context for the narrative generator.
//!
//! The AI client embeds these strings in its prompts; the engine never calls
//! the client itself.

use crate::arc::is_repeating;
use crate::objectives::meets_arc_requirements;
use crate::state::{Relationship, StoryState};

/// Narrative entries included in a recap.
const RECENT_NARRATIVE: usize = 3;

/// Player choices included in a recap.
const RECENT_CHOICES: usize = 5;

/// Characters listed in a recap.
const KEY_CHARACTERS: usize = 5;

/// Longest excerpt of a narrative entry, in characters.
const EXCERPT_CHARS: usize = 200;

/// A compact recap of where the story stands.
pub fn summarize_recent_events(state: &StoryState) -> String {
    let chapter = state.current_chapter();
    let mut summary = String::new();

    summary.push_str(&format!(
        "## Current Chapter: {} ({})\n{}\n",
        chapter.title,
        chapter.arc(),
        chapter.summary
    ));

    if !state.plot_summary().is_empty() {
        summary.push_str(&format!("\n## Plot So Far\n{}\n", state.plot_summary()));
    }

    let recent: Vec<_> = state
        .narrative_history()
        .iter()
        .rev()
        .take(RECENT_NARRATIVE)
        .collect();
    if !recent.is_empty() {
        summary.push_str("\n## Recent Events\n");
        for entry in recent.iter().rev() {
            summary.push_str(&format!("- {}\n", excerpt(entry)));
        }
    }

    let choices: Vec<_> = state.choices().iter().rev().take(RECENT_CHOICES).collect();
    if !choices.is_empty() {
        summary.push_str("\n## Recent Player Choices\n");
        for choice in choices.iter().rev() {
            summary.push_str(&format!("- {choice}\n"));
        }
    }

    if !chapter.pending_objectives().is_empty() {
        summary.push_str("\n## Open Objectives\n");
        for objective in chapter.pending_objectives() {
            summary.push_str(&format!("- {objective}\n"));
        }
    }

    let mut characters: Vec<_> = state.characters().iter().collect();
    characters.sort_by(|a, b| b.1.importance.cmp(&a.1.importance).then(a.0.cmp(b.0)));
    if !characters.is_empty() {
        summary.push_str("\n## Key Characters\n");
        for (name, info) in characters.into_iter().take(KEY_CHARACTERS) {
            summary.push_str(&format!(
                "- {name} ({}): {}\n",
                relationship_label(info.relationship),
                info.description
            ));
        }
    }

    if !state.themes().is_empty() {
        let mut themes: Vec<_> = state.themes().iter().map(String::as_str).collect();
        themes.sort_unstable();
        summary.push_str(&format!("\n## Themes\n{}\n", themes.join(", ")));
    }

    summary
}

/// Direction for the narrator in the current arc.
pub fn current_arc_guidance(state: &StoryState) -> String {
    let chapter = state.current_chapter();
    let arc = chapter.arc();
    let pace = state.effective_pace();

    let mut guidance = format!(
        "Story arc: {arc}. {}\nPacing: {}.",
        arc.guidance(),
        pace.name()
    );

    if let Some(next) = chapter.pending_objectives().first() {
        guidance.push_str(&format!("\nSteer toward the open objective: {next}."));
    }

    let readiness = meets_arc_requirements(state);
    if !readiness.can_progress {
        guidance.push_str("\nThe arc is not ready to conclude yet: ");
        guidance.push_str(&readiness.missing_reasons.join("; "));
        guidance.push('.');
    }

    if is_repeating(state) {
        guidance.push_str(
            "\nThe player keeps repeating the same action. Change the scene or introduce \
             a new development so the story does not stall.",
        );
    }

    guidance
}

fn relationship_label(relationship: Relationship) -> &'static str {
    match relationship {
        Relationship::Friendly => "friendly",
        Relationship::Neutral => "neutral",
        Relationship::Hostile => "hostile",
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() > EXCERPT_CHARS {
        let truncated: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}
