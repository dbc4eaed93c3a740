//! The in-memory story state for a single campaign.
//!
//! `StoryState` owns everything the game remembers about the unfolding
//! story: the narrative and conversation logs, the active chapter and its
//! archive, characters, traits, themes and the campaign's pacing. It is
//! mutated through [`crate::session::StorySession`]; the persistence layer
//! converts it to and from its on-disk form.

use crate::arc::StoryArc;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

/// Default bound on both history logs.
pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 50;

/// Number of leading characters that identify a history entry.
pub const SIGNATURE_CHARS: usize = 100;

/// Speaker of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
}

impl ConversationEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Identity used for deduplication: role plus the first
    /// [`SIGNATURE_CHARS`] characters of the content.
    pub fn signature(&self) -> String {
        format!("{}:{}", self.role.as_str(), text_signature(&self.content))
    }
}

/// Identity of a narrative entry: its first [`SIGNATURE_CHARS`] characters.
pub fn text_signature(text: &str) -> String {
    text.chars().take(SIGNATURE_CHARS).collect()
}

/// How a character feels about the player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Friendly,
    #[default]
    Neutral,
    Hostile,
}

/// A named character the story has introduced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterInfo {
    pub description: String,
    #[serde(default)]
    pub relationship: Relationship,
    #[serde(default)]
    pub last_seen: String,
    /// 1 (background extra) to 10 (central figure).
    #[serde(default = "default_importance", deserialize_with = "deserialize_scale")]
    pub importance: u8,
}

fn default_importance() -> u8 {
    5
}

impl CharacterInfo {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            relationship: Relationship::Neutral,
            last_seen: String::new(),
            importance: default_importance(),
        }
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationship = relationship;
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_last_seen(mut self, last_seen: impl Into<String>) -> Self {
        self.last_seen = last_seen.into();
        self
    }
}

/// A trait of the player character, such as "Courage 7".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterTrait {
    pub name: String,
    /// 1 to 10.
    #[serde(deserialize_with = "deserialize_scale")]
    pub level: u8,
    #[serde(default)]
    pub description: String,
}

impl CharacterTrait {
    pub fn new(name: impl Into<String>, level: u8, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: clamp_scale(level),
            description: description.into(),
        }
    }
}

/// Clamp a value onto the 1..=10 scale used by importance and trait levels.
pub fn clamp_scale(value: u8) -> u8 {
    value.clamp(1, 10)
}

/// Read a 1..=10 scale value from any JSON number, rounding fractions.
fn deserialize_scale<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().clamp(1.0, 10.0) as u8)
}

/// Per-campaign pacing, chosen once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StoryPace {
    Fast,
    #[default]
    Medium,
    Slow,
}

impl StoryPace {
    /// Scales how much narrative and how many objectives progression needs.
    pub fn multiplier(&self) -> f64 {
        match self {
            StoryPace::Fast => 0.5,
            StoryPace::Medium => 1.0,
            StoryPace::Slow => 1.5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoryPace::Fast => "FAST",
            StoryPace::Medium => "MEDIUM",
            StoryPace::Slow => "SLOW",
        }
    }
}

/// A bounded slice of the story with its own objectives and arc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    arc: StoryArc,
    #[serde(default)]
    pending_objectives: Vec<String>,
    #[serde(default)]
    completed_objectives: Vec<String>,
    /// Names of characters who appear in this chapter.
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Chapter {
    /// Open a chapter in the given arc. Only the arc engine and the state
    /// constructors pick the arc.
    pub(crate) fn new(title: impl Into<String>, summary: impl Into<String>, arc: StoryArc) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            arc,
            pending_objectives: Vec::new(),
            completed_objectives: Vec::new(),
            characters: Vec::new(),
            locations: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// The default opening chapter of a campaign.
    pub fn opening() -> Self {
        let arc = StoryArc::Introduction;
        Self::new(arc.title(), arc.summary(), arc)
    }

    pub fn arc(&self) -> StoryArc {
        self.arc
    }

    pub fn pending_objectives(&self) -> &[String] {
        &self.pending_objectives
    }

    pub fn completed_objectives(&self) -> &[String] {
        &self.completed_objectives
    }

    pub fn objective_count(&self) -> usize {
        self.pending_objectives.len() + self.completed_objectives.len()
    }

    /// Add a pending objective. Blank text and objectives already tracked in
    /// either list are ignored.
    pub(crate) fn push_pending(&mut self, objective: &str) -> bool {
        let objective = objective.trim();
        if objective.is_empty() || self.has_objective(objective) {
            return false;
        }
        self.pending_objectives.push(objective.to_string());
        true
    }

    /// Move an exact-match pending objective into the completed list.
    pub(crate) fn mark_completed(&mut self, objective: &str) -> bool {
        match self.pending_objectives.iter().position(|o| o == objective) {
            Some(index) => {
                let done = self.pending_objectives.remove(index);
                self.completed_objectives.push(done);
                true
            }
            None => false,
        }
    }

    /// Drop the `count` oldest pending objectives.
    pub(crate) fn drop_oldest_pending(&mut self, count: usize) -> Vec<String> {
        let count = count.min(self.pending_objectives.len());
        self.pending_objectives.drain(..count).collect()
    }

    fn has_objective(&self, objective: &str) -> bool {
        self.pending_objectives.iter().any(|o| o == objective)
            || self.completed_objectives.iter().any(|o| o == objective)
    }

    /// Repair a chapter read from disk: an objective that shows up in both
    /// lists counts as completed, and duplicates within a list collapse.
    pub(crate) fn normalize_objectives(&mut self) {
        let mut seen = HashSet::new();
        self.completed_objectives.retain(|o| seen.insert(o.clone()));
        self.pending_objectives.retain(|o| seen.insert(o.clone()));
    }

    pub(crate) fn note_character(&mut self, name: &str) {
        if !self.characters.iter().any(|c| c == name) {
            self.characters.push(name.to_string());
        }
    }
}

impl Default for Chapter {
    fn default() -> Self {
        Self::opening()
    }
}

/// Everything the engine knows about one campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryState {
    pub(crate) narrative_history: Vec<String>,
    pub(crate) conversation_history: Vec<ConversationEntry>,
    pub(crate) choices: Vec<String>,
    pub(crate) plot_stage: u32,
    pub(crate) plot_summary: String,
    pub(crate) current_chapter: Chapter,
    pub(crate) chapters: Vec<Chapter>,
    pub(crate) characters: HashMap<String, CharacterInfo>,
    pub(crate) character_traits: Vec<CharacterTrait>,
    pub(crate) themes: HashSet<String>,
    pub(crate) max_history_items: usize,
    pub(crate) story_pace: Option<StoryPace>,
    pub(crate) combat_encounters: u32,
}

impl StoryState {
    /// A fresh campaign: empty logs, plot stage 1, one introduction chapter.
    pub fn new() -> Self {
        Self::with_max_history(DEFAULT_MAX_HISTORY_ITEMS)
    }

    pub fn with_max_history(max_history_items: usize) -> Self {
        Self {
            narrative_history: Vec::new(),
            conversation_history: Vec::new(),
            choices: Vec::new(),
            plot_stage: 1,
            plot_summary: String::new(),
            current_chapter: Chapter::opening(),
            chapters: Vec::new(),
            characters: HashMap::new(),
            character_traits: Vec::new(),
            themes: HashSet::new(),
            max_history_items: max_history_items.max(1),
            story_pace: None,
            combat_encounters: 0,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn narrative_history(&self) -> &[String] {
        &self.narrative_history
    }

    pub fn conversation_history(&self) -> &[ConversationEntry] {
        &self.conversation_history
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn plot_stage(&self) -> u32 {
        self.plot_stage
    }

    pub fn plot_summary(&self) -> &str {
        &self.plot_summary
    }

    pub fn current_chapter(&self) -> &Chapter {
        &self.current_chapter
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn characters(&self) -> &HashMap<String, CharacterInfo> {
        &self.characters
    }

    pub fn character(&self, name: &str) -> Option<&CharacterInfo> {
        self.characters.get(name)
    }

    pub fn character_traits(&self) -> &[CharacterTrait] {
        &self.character_traits
    }

    pub fn themes(&self) -> &HashSet<String> {
        &self.themes
    }

    pub fn max_history_items(&self) -> usize {
        self.max_history_items
    }

    /// The chosen pace, if the player has picked one.
    pub fn story_pace(&self) -> Option<StoryPace> {
        self.story_pace
    }

    /// The pace used for gating; unset campaigns run at medium pace.
    pub fn effective_pace(&self) -> StoryPace {
        self.story_pace.unwrap_or_default()
    }

    pub fn combat_encounters(&self) -> u32 {
        self.combat_encounters
    }

    /// Completed objectives across the active and archived chapters.
    pub fn total_completed_objectives(&self) -> usize {
        self.chapters
            .iter()
            .chain(std::iter::once(&self.current_chapter))
            .map(|c| c.completed_objectives.len())
            .sum()
    }

    /// True when nothing has happened yet. An empty state must never
    /// overwrite a real save, nor be accepted as progress on load.
    pub fn is_empty(&self) -> bool {
        self.narrative_history.is_empty()
            && self.conversation_history.is_empty()
            && self.choices.is_empty()
            && self.plot_stage <= 1
    }

    /// True when `self` shows strictly more progress than `other`.
    pub fn has_more_progress_than(&self, other: &StoryState) -> bool {
        self.narrative_history.len() > other.narrative_history.len()
            || self.conversation_history.len() > other.conversation_history.len()
            || self.total_completed_objectives() > other.total_completed_objectives()
    }

    // =========================================================================
    // Mutation (crate-internal; the session is the public entry point)
    // =========================================================================

    /// Append narrative text unless an entry with the same signature exists.
    pub(crate) fn push_narrative(&mut self, text: &str) -> bool {
        let signature = text_signature(text);
        if text.trim().is_empty()
            || self
                .narrative_history
                .iter()
                .any(|n| text_signature(n) == signature)
        {
            return false;
        }
        self.narrative_history.push(text.to_string());
        evict_oldest(&mut self.narrative_history, self.max_history_items);
        true
    }

    pub(crate) fn push_conversation(&mut self, entry: ConversationEntry) -> bool {
        let signature = entry.signature();
        if self
            .conversation_history
            .iter()
            .any(|e| e.signature() == signature)
        {
            return false;
        }
        self.conversation_history.push(entry);
        evict_oldest(&mut self.conversation_history, self.max_history_items);
        true
    }

    pub(crate) fn push_choice(&mut self, choice: &str) {
        self.choices.push(choice.to_string());
    }

    /// Archive the active chapter and make `next` the active one.
    pub(crate) fn replace_chapter(&mut self, next: Chapter) -> &Chapter {
        let closed = std::mem::replace(&mut self.current_chapter, next);
        self.chapters.push(closed);
        &self.current_chapter
    }

    /// Re-apply the history bound, e.g. after loading an older save.
    pub(crate) fn enforce_history_bound(&mut self) {
        evict_oldest(&mut self.narrative_history, self.max_history_items);
        evict_oldest(&mut self.conversation_history, self.max_history_items);
    }
}

impl Default for StoryState {
    fn default() -> Self {
        Self::new()
    }
}

fn evict_oldest<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}
