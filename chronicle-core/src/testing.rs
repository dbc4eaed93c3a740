//! Testing utilities for the story engine.
//!
//! Builders for states and chapters in known shapes, shared by the unit
//! tests and the integration tests under `tests/`.

use crate::state::{
    CharacterInfo, CharacterTrait, Chapter, ConversationEntry, Relationship, Role, StoryPace,
    StoryState,
};

/// An introduction chapter with `pending` pending and `completed` completed
/// objectives, named "Pending objective N" and "Completed objective N"
/// (1-based, oldest first).
pub fn chapter_with_objectives(pending: usize, completed: usize) -> Chapter {
    let mut chapter = Chapter::opening();
    for i in 1..=completed {
        let objective = format!("Completed objective {i}");
        chapter.push_pending(&objective);
        chapter.mark_completed(&objective);
    }
    for i in 1..=pending {
        chapter.push_pending(&format!("Pending objective {i}"));
    }
    chapter
}

/// A fresh state holding `count` distinct narrative entries.
pub fn state_with_narrative(count: usize) -> StoryState {
    let mut state = StoryState::new();
    for i in 1..=count {
        state.push_narrative(&format!("Narrative beat {i}: the story moves on."));
    }
    state
}

/// A campaign with every field populated.
pub fn sample_state() -> StoryState {
    let mut state = state_with_narrative(3);

    state.push_conversation(ConversationEntry::new(Role::System, "You are the narrator."));
    state.push_conversation(ConversationEntry::new(Role::User, "I open the gate."));
    state.push_conversation(ConversationEntry::new(
        Role::Assistant,
        "The gate creaks open onto a moonlit courtyard.",
    ));

    state.push_choice("Open the gate");
    state.push_choice("Cross the courtyard");

    state.plot_stage = 2;
    state.plot_summary = "The hero has reached the old keep.".to_string();

    let mut archived = chapter_with_objectives(0, 2);
    archived.title = "Prologue".to_string();
    archived.locations.push("Village".to_string());
    state.chapters.push(archived);
    state.current_chapter = chapter_with_objectives(2, 1);
    state.current_chapter.locations.push("Old Keep".to_string());
    state.current_chapter.note_character("Mira");
    state
        .current_chapter
        .metadata
        .insert("weather".to_string(), serde_json::json!("stormy"));

    state.characters.insert(
        "Mira".to_string(),
        CharacterInfo::new("A wary ranger guarding the keep")
            .with_relationship(Relationship::Friendly)
            .with_importance(8)
            .with_last_seen("Old Keep"),
    );
    state.characters.insert(
        "The Warden".to_string(),
        CharacterInfo::new("Master of the keep")
            .with_relationship(Relationship::Hostile)
            .with_importance(10),
    );

    state
        .character_traits
        .push(CharacterTrait::new("Courage", 7, "Faces danger head-on"));
    state.themes.insert("betrayal".to_string());
    state.themes.insert("redemption".to_string());

    state.story_pace = Some(StoryPace::Slow);
    state.combat_encounters = 1;
    state
}
