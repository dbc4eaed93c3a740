//! StorySession - the one live story state and its save slot.
//!
//! The game loop owns a single `StorySession` and routes every mutation
//! through it. Each mutating call updates the in-memory state and then saves.
//! A failed save is logged and remembered, but play continues on the
//! in-memory state.

use crate::arc::{self, ArcTransition};
use crate::config::StoreConfig;
use crate::context;
use crate::objectives::{self, ArcReadiness};
use crate::persist::{PersistError, SaveOutcome, SaveStore};
use crate::state::{
    clamp_scale, CharacterInfo, CharacterTrait, Chapter, ConversationEntry, Role, StoryPace,
    StoryState,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Outcome of [`StorySession::evaluate_progress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The chapter closed and the story moved into the next arc.
    Advanced(ArcTransition),
    /// The chapter stays open.
    Holding(ArcReadiness),
}

/// A campaign in play.
pub struct StorySession {
    state: StoryState,
    store: SaveStore,
    last_save_error: Option<String>,
}

impl StorySession {
    /// Open the save slot described by `config`.
    ///
    /// Loads the saved campaign, falling back to the backup, and starts a
    /// fresh one when neither is usable.
    pub async fn open(config: StoreConfig) -> Self {
        let max_history = config.max_history_items;
        let store = SaveStore::new(config);
        let state = match store.load().await {
            Some(state) => {
                info!(
                    chapter = %state.current_chapter().title,
                    arc = %state.current_chapter().arc(),
                    "resumed saved story"
                );
                state
            }
            None => {
                info!("starting a new story");
                StoryState::with_max_history(max_history)
            }
        };

        Self::with_state(store, state)
    }

    /// Wrap an existing state. Nothing is read from disk.
    pub fn with_state(store: SaveStore, state: StoryState) -> Self {
        Self {
            state,
            store,
            last_save_error: None,
        }
    }

    // =========================================================================
    // Narrative and conversation
    // =========================================================================

    /// Record a piece of story text. Text already in the history is skipped.
    pub async fn add_narrative(&mut self, text: &str) -> bool {
        let added = self.state.push_narrative(text);
        self.persist().await;
        added
    }

    /// Record story text the combat resolver flagged as a fight.
    ///
    /// The encounter counts even when the text repeats an earlier entry.
    pub async fn add_combat_narrative(&mut self, text: &str) -> bool {
        let added = self.state.push_narrative(text);
        self.state.combat_encounters += 1;
        self.persist().await;
        added
    }

    /// Record a conversation message. A repeat of an existing message is skipped.
    pub async fn add_conversation(&mut self, role: Role, content: &str) -> bool {
        let added = self
            .state
            .push_conversation(ConversationEntry::new(role, content));
        self.persist().await;
        added
    }

    /// Record a raw player choice.
    pub async fn add_choice(&mut self, choice: &str) {
        self.state.push_choice(choice);
        self.persist().await;
    }

    /// Update the coarse plot markers.
    pub async fn update_plot(&mut self, stage: u32, summary: &str) {
        self.state.plot_stage = stage.max(1);
        self.state.plot_summary = summary.to_string();
        self.persist().await;
    }

    // =========================================================================
    // Chapters and objectives
    // =========================================================================

    /// Close the current chapter and open a new one in the same arc.
    pub async fn begin_new_chapter(&mut self, title: &str, summary: &str) {
        let arc = self.state.current_chapter().arc();
        self.state.replace_chapter(Chapter::new(title, summary, arc));
        info!(chapter = %title, arc = %arc, "new chapter begun");
        self.persist().await;
    }

    pub async fn add_objective(&mut self, objective: &str) -> bool {
        let added = objectives::add_objective(&mut self.state, objective);
        self.persist().await;
        added
    }

    /// Complete a pending objective. Unknown objectives are ignored.
    pub async fn complete_objective(&mut self, objective: &str) -> bool {
        let completed = objectives::complete_objective(&mut self.state, objective);
        if !completed {
            debug!(objective, "no pending objective to complete");
        }
        self.persist().await;
        completed
    }

    /// Prune stale objectives and advance the arc when the chapter is done.
    ///
    /// Call once per narrative turn.
    pub async fn evaluate_progress(&mut self) -> Progress {
        objectives::prune_objectives(&mut self.state);

        let readiness = objectives::meets_arc_requirements(&self.state);
        let progress = if arc::should_advance(self.state.current_chapter()) && readiness.can_progress
        {
            Progress::Advanced(arc::advance_chapter(&mut self.state))
        } else {
            Progress::Holding(readiness)
        };

        self.persist().await;
        progress
    }

    // =========================================================================
    // Characters, traits, themes and pace
    // =========================================================================

    /// Insert or replace a character. Importance is clamped to 1..=10 and a
    /// blank `last_seen` is filled with the current chapter title.
    pub async fn add_or_update_character(&mut self, name: &str, mut info: CharacterInfo) {
        info.importance = clamp_scale(info.importance);
        if info.last_seen.trim().is_empty() {
            info.last_seen = self.state.current_chapter().title.clone();
        }
        self.state.characters.insert(name.to_string(), info);
        self.state.current_chapter.note_character(name);
        self.persist().await;
    }

    /// Insert or replace a trait by name. Level is clamped to 1..=10.
    pub async fn update_character_trait(&mut self, name: &str, level: u8, description: &str) {
        let updated = CharacterTrait::new(name, level, description);
        match self
            .state
            .character_traits
            .iter_mut()
            .find(|t| t.name == name)
        {
            Some(existing) => *existing = updated,
            None => self.state.character_traits.push(updated),
        }
        self.persist().await;
    }

    pub async fn add_theme(&mut self, theme: &str) -> bool {
        let theme = theme.trim();
        let added = !theme.is_empty() && self.state.themes.insert(theme.to_string());
        self.persist().await;
        added
    }

    /// Choose the campaign's pace. Only the first choice sticks.
    pub async fn set_story_pace(&mut self, pace: StoryPace) -> bool {
        let chosen = self.state.story_pace.is_none();
        if chosen {
            self.state.story_pace = Some(pace);
        } else {
            debug!(requested = pace.name(), "story pace already chosen");
        }
        self.persist().await;
        chosen
    }

    // =========================================================================
    // Reset and saving
    // =========================================================================

    /// Throw the campaign away. Without confirmation nothing happens.
    ///
    /// The fresh state is written over the save and the backup is deleted so
    /// the old campaign cannot come back on the next start. When the fresh
    /// state cannot be written the save is removed instead. Returns `false`,
    /// keeping the current campaign, if neither works.
    pub async fn reset(&mut self, confirmed: bool) -> bool {
        if !confirmed {
            debug!("reset requested without confirmation");
            return false;
        }

        let fresh = StoryState::with_max_history(self.store.config().max_history_items);

        if let Err(e) = self.store.overwrite(&fresh).await {
            warn!(error = %e, "failed to write fresh state during reset; removing save");
            if let Err(e) = self.store.remove_save().await {
                self.record_save_error(e);
                return false;
            }
        }
        self.state = fresh;
        self.last_save_error = None;

        if let Err(e) = self.store.clear_backup().await {
            warn!(error = %e, "failed to delete backup during reset");
        }

        info!("story reset");
        true
    }

    /// Save immediately and report the result.
    pub async fn save_now(&mut self) -> Result<SaveOutcome, PersistError> {
        let result = self.store.save(&self.state).await;
        match &result {
            Ok(_) => self.last_save_error = None,
            Err(e) => self.last_save_error = Some(e.to_string()),
        }
        result
    }

    /// The most recent save failure, cleared by the next successful save.
    pub fn last_save_error(&self) -> Option<&str> {
        self.last_save_error.as_deref()
    }

    async fn persist(&mut self) {
        match self.store.save(&self.state).await {
            Ok(_) => self.last_save_error = None,
            Err(e) => self.record_save_error(e),
        }
    }

    fn record_save_error(&mut self, error: PersistError) {
        warn!(error = %error, "failed to save story state; continuing in memory");
        self.last_save_error = Some(error.to_string());
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn state(&self) -> &StoryState {
        &self.state
    }

    pub fn store(&self) -> &SaveStore {
        &self.store
    }

    pub fn narrative_history(&self) -> &[String] {
        self.state.narrative_history()
    }

    pub fn conversation_history(&self) -> &[ConversationEntry] {
        self.state.conversation_history()
    }

    pub fn choices(&self) -> &[String] {
        self.state.choices()
    }

    pub fn plot_stage(&self) -> u32 {
        self.state.plot_stage()
    }

    pub fn plot_summary(&self) -> &str {
        self.state.plot_summary()
    }

    pub fn current_chapter(&self) -> &Chapter {
        self.state.current_chapter()
    }

    pub fn chapters(&self) -> &[Chapter] {
        self.state.chapters()
    }

    pub fn characters(&self) -> &HashMap<String, CharacterInfo> {
        self.state.characters()
    }

    pub fn character_traits(&self) -> &[CharacterTrait] {
        self.state.character_traits()
    }

    pub fn themes(&self) -> &HashSet<String> {
        self.state.themes()
    }

    pub fn story_pace(&self) -> Option<StoryPace> {
        self.state.story_pace()
    }

    /// Whether the current arc's requirements are met.
    pub fn readiness(&self) -> ArcReadiness {
        objectives::meets_arc_requirements(&self.state)
    }

    /// Whether the player keeps making the same choice.
    pub fn is_repeating(&self) -> bool {
        arc::is_repeating(&self.state)
    }

    /// Recap for the narrative generator's prompt.
    pub fn summarize_recent_events(&self) -> String {
        context::summarize_recent_events(&self.state)
    }

    /// Arc direction for the narrative generator's prompt.
    pub fn current_arc_guidance(&self) -> String {
        context::current_arc_guidance(&self.state)
    }
}
