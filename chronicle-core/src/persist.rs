//! Durable save/load of the story state.
//!
//! One save slot is one canonical JSON file plus a `.bak` copy of the last
//! good save. Writes land in a uniquely named temp file and are renamed onto
//! the canonical path, so an interrupted save never leaves a half-written
//! file behind. Loads fall back to the backup when the canonical file is
//! unreadable or carries less progress than the backup. An unreadable
//! canonical file is copied to `.corrupt` before a new save replaces it.

use crate::config::StoreConfig;
use crate::state::{
    text_signature, CharacterInfo, CharacterTrait, Chapter, ConversationEntry, StoryPace,
    StoryState,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid save format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: expected at most {expected}, found {found}")]
    VersionMismatch { expected: u32, found: f64 },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

impl PersistError {
    fn is_not_found(&self) -> bool {
        matches!(self, PersistError::Io(e) if e.kind() == ErrorKind::NotFound)
    }
}

/// What a call to [`SaveStore::save`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The state was written to the canonical path.
    Written,
    /// The state was empty and nothing was written.
    SkippedEmpty,
}

/// The on-disk envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedStory {
    /// Save format version.
    #[serde(deserialize_with = "deserialize_version")]
    pub version: u32,

    /// RFC 3339 time of the save.
    pub saved_at: String,

    pub state: PersistedState,
}

impl SavedStory {
    pub fn new(state: &StoryState) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            state: PersistedState::from(state),
        }
    }

    /// Check the envelope shape before trusting any of it.
    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let envelope = value
            .as_object()
            .ok_or_else(|| PersistError::InvalidFormat("save is not a JSON object".into()))?;

        let version = envelope
            .get("version")
            .and_then(|v| v.as_f64())
            .filter(|v| *v >= 0.0)
            .ok_or_else(|| PersistError::InvalidFormat("version is not a number".into()))?;
        if version > f64::from(SAVE_VERSION) {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: version,
            });
        }

        let saved_at = envelope
            .get("savedAt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PersistError::InvalidFormat("savedAt is not a string".into()))?
            .to_string();

        let state = envelope
            .get("state")
            .filter(|s| s.is_object())
            .cloned()
            .ok_or_else(|| PersistError::InvalidFormat("state is not an object".into()))?;

        Ok(Self {
            version: version.round() as u32,
            saved_at,
            state: serde_json::from_value(state)?,
        })
    }

    /// Rebuild the in-memory state, repairing duplicated history.
    pub fn into_state(self) -> StoryState {
        StoryState::from(self.state)
    }
}

/// Serializable form of [`StoryState`].
///
/// The characters map becomes a name-ordered JSON object and the theme set a
/// sorted array, so identical states produce identical files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    pub narrative_history: Vec<String>,
    pub conversation_history: Vec<ConversationEntry>,
    pub choices: Vec<String>,
    pub plot_stage: u32,
    pub plot_summary: String,
    pub current_chapter: Chapter,
    pub chapters: Vec<Chapter>,
    pub characters: BTreeMap<String, CharacterInfo>,
    pub character_traits: Vec<CharacterTrait>,
    pub themes: Vec<String>,
    pub max_history_items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_pace: Option<StoryPace>,
    pub combat_encounters: u32,
}

impl Default for PersistedState {
    fn default() -> Self {
        PersistedState::from(&StoryState::new())
    }
}

impl From<&StoryState> for PersistedState {
    fn from(state: &StoryState) -> Self {
        let mut themes: Vec<String> = state.themes.iter().cloned().collect();
        themes.sort();

        Self {
            narrative_history: state.narrative_history.clone(),
            conversation_history: state.conversation_history.clone(),
            choices: state.choices.clone(),
            plot_stage: state.plot_stage,
            plot_summary: state.plot_summary.clone(),
            current_chapter: state.current_chapter.clone(),
            chapters: state.chapters.clone(),
            characters: state
                .characters
                .iter()
                .map(|(name, info)| (name.clone(), info.clone()))
                .collect(),
            character_traits: state.character_traits.clone(),
            themes,
            max_history_items: state.max_history_items,
            story_pace: state.story_pace,
            combat_encounters: state.combat_encounters,
        }
    }
}

impl From<PersistedState> for StoryState {
    fn from(saved: PersistedState) -> Self {
        let mut current_chapter = saved.current_chapter;
        current_chapter.normalize_objectives();
        let mut chapters = saved.chapters;
        for chapter in &mut chapters {
            chapter.normalize_objectives();
        }

        let mut state = StoryState {
            narrative_history: dedup_narrative(&saved.narrative_history),
            conversation_history: dedup_conversation(&saved.conversation_history),
            choices: saved.choices,
            plot_stage: saved.plot_stage.max(1),
            plot_summary: saved.plot_summary,
            current_chapter,
            chapters,
            characters: saved.characters.into_iter().collect(),
            character_traits: dedup_traits(saved.character_traits),
            themes: saved
                .themes
                .into_iter()
                .filter(|t| !t.trim().is_empty())
                .collect(),
            max_history_items: saved.max_history_items.max(1),
            story_pace: saved.story_pace,
            combat_encounters: saved.combat_encounters,
        };
        state.enforce_history_bound();
        state
    }
}

/// Read the format version from any non-negative JSON number.
fn deserialize_version<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().max(0.0) as u32)
}

/// Drop narrative entries whose first 100 characters repeat an earlier
/// entry. Order is preserved and the first occurrence wins.
pub fn dedup_narrative(entries: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert(text_signature(e)))
        .cloned()
        .collect()
}

/// Drop conversation entries whose role and first 100 characters repeat an
/// earlier entry.
pub fn dedup_conversation(entries: &[ConversationEntry]) -> Vec<ConversationEntry> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert(e.signature()))
        .cloned()
        .collect()
}

/// Trait names are unique; the last entry for a name wins.
fn dedup_traits(traits: Vec<CharacterTrait>) -> Vec<CharacterTrait> {
    let mut unique: Vec<CharacterTrait> = Vec::with_capacity(traits.len());
    for t in traits {
        match unique.iter_mut().find(|u| u.name == t.name) {
            Some(existing) => *existing = t,
            None => unique.push(t),
        }
    }
    unique
}

/// Header of a save file, read without building the state.
#[derive(Debug, Clone)]
pub struct SaveInfo {
    pub path: PathBuf,
    pub version: u32,
    pub saved_at: String,
}

/// Save slot on the local file system.
#[derive(Debug, Clone)]
pub struct SaveStore {
    config: StoreConfig,
}

impl SaveStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn save_path(&self) -> PathBuf {
        self.config.save_path()
    }

    pub fn backup_path(&self) -> PathBuf {
        self.config.backup_path()
    }

    pub fn corrupt_path(&self) -> PathBuf {
        self.config.corrupt_path()
    }

    /// Save the state, backing up the previous save first.
    ///
    /// An empty state is never written, so a freshly constructed state cannot
    /// clobber a real campaign.
    pub async fn save(&self, state: &StoryState) -> Result<SaveOutcome, PersistError> {
        if state.is_empty() {
            debug!("skipping save of empty story state");
            return Ok(SaveOutcome::SkippedEmpty);
        }

        self.backup().await?;
        self.write(state).await?;
        debug!(path = %self.save_path().display(), "story state saved");
        Ok(SaveOutcome::Written)
    }

    /// Write the state without the empty-state guard or the backup step.
    ///
    /// Only a confirmed reset should need this.
    pub async fn overwrite(&self, state: &StoryState) -> Result<(), PersistError> {
        self.write(state).await
    }

    /// Copy the canonical save to the backup path.
    ///
    /// Does nothing when there is no canonical save. A canonical file that
    /// does not parse never replaces the backup; it is copied to the
    /// `.corrupt` path instead so the next write cannot destroy it.
    pub async fn backup(&self) -> Result<(), PersistError> {
        let canonical = self.save_path();
        if !fs::try_exists(&canonical).await.unwrap_or(false) {
            return Ok(());
        }

        if let Err(e) = read_envelope(&canonical).await {
            let corrupt = self.corrupt_path();
            warn!(
                error = %e,
                path = %corrupt.display(),
                "canonical save is unreadable; keeping existing backup and setting it aside"
            );
            fs::copy(&canonical, &corrupt).await?;
            return Ok(());
        }

        let backup = self.backup_path();
        let (from, to) = (canonical.as_path(), backup.as_path());
        let delay = self.config.retry_delay;
        with_retries(
            "backup copy",
            self.config.retry_attempts,
            move |attempt| delay * attempt,
            move || async move { fs::copy(from, to).await.map(|_| ()) },
        )
        .await
    }

    /// Load the saved state.
    ///
    /// Returns `None` when there is no usable save, in which case the caller
    /// starts a fresh campaign. A missing canonical file means no save, even
    /// when a backup is still on disk.
    pub async fn load(&self) -> Option<StoryState> {
        let primary = match read_envelope(&self.save_path()).await {
            Ok(saved) => saved.into_state(),
            Err(e) if e.is_not_found() => {
                debug!("no canonical save found");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "canonical save is unreadable; trying backup");
                return self.load_backup().await;
            }
        };

        if !primary.is_empty() {
            return Some(primary);
        }

        let recovered = self
            .load_backup()
            .await
            .filter(|backup| backup.has_more_progress_than(&primary));
        if recovered.is_some() {
            warn!("canonical save was empty; recovered progress from backup");
        }
        recovered
    }

    /// Read only the envelope header of the canonical save.
    pub async fn peek(&self) -> Result<SaveInfo, PersistError> {
        let path = self.save_path();
        let content = fs::read_to_string(&path).await?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Partial {
            #[serde(deserialize_with = "deserialize_version")]
            version: u32,
            saved_at: String,
        }

        let partial: Partial = serde_json::from_str(&content)?;
        Ok(SaveInfo {
            path,
            version: partial.version,
            saved_at: partial.saved_at,
        })
    }

    /// Delete the backup file. A missing backup is not an error.
    pub async fn clear_backup(&self) -> Result<(), PersistError> {
        remove_if_present(&self.backup_path()).await
    }

    /// Delete the canonical save. A missing save is not an error.
    pub async fn remove_save(&self) -> Result<(), PersistError> {
        remove_if_present(&self.save_path()).await
    }

    async fn load_backup(&self) -> Option<StoryState> {
        match read_envelope(&self.backup_path()).await {
            Ok(saved) => Some(saved.into_state()).filter(|state| !state.is_empty()),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(error = %e, "backup save is unreadable");
                None
            }
        }
    }

    /// Serialize into a temp file, then rename it onto the canonical path.
    async fn write(&self, state: &StoryState) -> Result<(), PersistError> {
        fs::create_dir_all(&self.config.save_dir).await?;

        let content = serde_json::to_string_pretty(&SavedStory::new(state))?;
        let target = self.save_path();
        let temp = self
            .config
            .save_dir
            .join(format!("{}.{}.tmp", self.config.file_name, Uuid::new_v4()));

        if let Err(e) = fs::write(&temp, content).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        let (from, to) = (temp.as_path(), target.as_path());
        let delay = self.config.retry_delay;
        let renamed = with_retries(
            "rename",
            self.config.retry_attempts,
            move |_| delay,
            move || fs::rename(from, to),
        )
        .await;

        if renamed.is_err() {
            let _ = fs::remove_file(&temp).await;
        }
        renamed
    }
}

async fn remove_if_present(path: &Path) -> Result<(), PersistError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn read_envelope(path: &Path) -> Result<SavedStory, PersistError> {
    let content = fs::read_to_string(path).await?;
    SavedStory::from_json(&content)
}

/// Run a file operation up to `attempts` times, sleeping `delay(attempt)`
/// between failures.
async fn with_retries<D, F, Fut>(
    operation: &'static str,
    attempts: u32,
    delay: D,
    mut op: F,
) -> Result<(), PersistError>
where
    D: Fn(u32) -> Duration,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(source) if attempt >= attempts => {
                return Err(PersistError::RetriesExhausted {
                    operation,
                    attempts,
                    source,
                });
            }
            Err(e) => {
                warn!(operation, attempt, error = %e, "file operation failed; retrying");
                tokio::time::sleep(delay(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Role;
    use crate::testing::sample_state;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SaveStore {
        SaveStore::new(StoreConfig::new(dir.path()).with_retry_delay(Duration::from_millis(1)))
    }

    #[test]
    fn test_dedup_narrative_keeps_first() {
        let entries = vec![
            "You enter a cave.".to_string(),
            "A bat flutters past.".to_string(),
            "You enter a cave.".to_string(),
        ];
        let deduped = dedup_narrative(&entries);
        assert_eq!(deduped, ["You enter a cave.", "A bat flutters past."]);
        assert_eq!(dedup_narrative(&deduped), deduped);
    }

    #[test]
    fn test_dedup_conversation_is_role_aware() {
        let entries = vec![
            ConversationEntry::new(Role::User, "Hello"),
            ConversationEntry::new(Role::Assistant, "Hello"),
            ConversationEntry::new(Role::User, "Hello"),
        ];
        let deduped = dedup_conversation(&entries);
        assert_eq!(deduped.len(), 2);
        assert_eq!(dedup_conversation(&deduped), deduped);
    }

    #[test]
    fn test_envelope_shape_validation() {
        assert!(matches!(
            SavedStory::from_json("[]"),
            Err(PersistError::InvalidFormat(_))
        ));
        assert!(matches!(
            SavedStory::from_json(r#"{"version":"1","savedAt":"now","state":{}}"#),
            Err(PersistError::InvalidFormat(_))
        ));
        assert!(matches!(
            SavedStory::from_json(r#"{"version":1,"savedAt":5,"state":{}}"#),
            Err(PersistError::InvalidFormat(_))
        ));
        assert!(matches!(
            SavedStory::from_json(r#"{"version":1,"savedAt":"now","state":[]}"#),
            Err(PersistError::InvalidFormat(_))
        ));
        assert!(matches!(
            SavedStory::from_json(r#"{"version":9,"savedAt":"now","state":{}}"#),
            Err(PersistError::VersionMismatch { found, .. }) if found == 9.0
        ));
        assert!(matches!(
            SavedStory::from_json(r#"{"version":-1,"savedAt":"now","state":{}}"#),
            Err(PersistError::InvalidFormat(_))
        ));
        assert!(SavedStory::from_json(r#"{"version":1,"savedAt":"now","state":{}}"#).is_ok());
        let saved = SavedStory::from_json(r#"{"version":1.0,"savedAt":"now","state":{}}"#)
            .expect("a float version is still a number");
        assert_eq!(saved.version, 1);
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(SavedStory::new(&sample_state())).unwrap();
        assert_eq!(json["version"], 1);
        assert!(json["savedAt"].is_string());

        let state = &json["state"];
        assert_eq!(state["plotStage"], 2);
        assert_eq!(state["storyPace"], "SLOW");
        assert_eq!(state["maxHistoryItems"], 50);
        assert_eq!(state["currentChapter"]["arc"], "introduction");
        assert!(state["currentChapter"]["pendingObjectives"].is_array());
        assert_eq!(state["characters"]["Mira"]["relationship"], "friendly");
        assert_eq!(state["characters"]["Mira"]["lastSeen"], "Old Keep");
        assert_eq!(state["conversationHistory"][0]["role"], "system");
        assert_eq!(
            state["themes"],
            serde_json::json!(["betrayal", "redemption"])
        );
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let saved =
            SavedStory::from_json(r#"{"version":1,"savedAt":"now","state":{"choices":["Run"]}}"#)
                .unwrap();
        let state = saved.into_state();
        assert_eq!(state.choices(), ["Run"]);
        assert_eq!(state.plot_stage(), 1);
        assert_eq!(state.max_history_items(), 50);
        assert_eq!(state.combat_encounters(), 0);
        assert_eq!(state.story_pace(), None);
    }

    #[test]
    fn test_themes_unique_after_load() {
        let saved = SavedStory::from_json(
            r#"{"version":1,"savedAt":"now","state":{"themes":["loss","loss","hope"]}}"#,
        )
        .unwrap();
        assert_eq!(saved.into_state().themes().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_state_is_not_written() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);

        let outcome = store.save(&StoryState::new()).await.unwrap();

        assert_eq!(outcome, SaveOutcome::SkippedEmpty);
        assert!(!store.save_path().exists());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        let state = sample_state();

        assert_eq!(store.save(&state).await.unwrap(), SaveOutcome::Written);
        let loaded = store.load().await.expect("save should load");

        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_second_save_creates_backup() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        let mut state = sample_state();

        store.save(&state).await.unwrap();
        assert!(!store.backup_path().exists());

        state.push_choice("Climb the tower");
        store.save(&state).await.unwrap();

        let backup = fs::read_to_string(store.backup_path()).await.unwrap();
        let backed_up = SavedStory::from_json(&backup).unwrap().into_state();
        assert_eq!(backed_up.choices().len(), 2);
        assert_eq!(store.load().await.unwrap().choices().len(), 3);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        store.save(&sample_state()).await.unwrap();
        store.save(&sample_state()).await.unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".tmp"), "leftover temp file {name}");
        }
    }

    #[tokio::test]
    async fn test_corrupted_canonical_falls_back_to_backup() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        let state = sample_state();

        store.save(&state).await.unwrap();
        store.backup().await.unwrap();
        fs::write(store.save_path(), "{ this is not json").await.unwrap();

        let loaded = store.load().await.expect("backup should load");
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_corrupted_canonical_does_not_replace_backup() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);

        store.save(&sample_state()).await.unwrap();
        store.backup().await.unwrap();
        fs::write(store.save_path(), "garbage").await.unwrap();

        store.backup().await.unwrap();

        let backup = fs::read_to_string(store.backup_path()).await.unwrap();
        assert!(SavedStory::from_json(&backup).is_ok());
        let set_aside = fs::read_to_string(store.corrupt_path()).await.unwrap();
        assert_eq!(set_aside, "garbage");
    }

    #[tokio::test]
    async fn test_unreadable_save_is_kept_before_overwrite() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        fs::write(store.save_path(), "{\"version\": 1, \"savedAt\"")
            .await
            .unwrap();

        assert!(store.load().await.is_none());
        store.save(&sample_state()).await.unwrap();

        let set_aside = fs::read_to_string(store.corrupt_path()).await.unwrap();
        assert_eq!(set_aside, "{\"version\": 1, \"savedAt\"");
        assert!(!store.backup_path().exists());
        assert_eq!(store.load().await.unwrap(), sample_state());
    }

    #[tokio::test]
    async fn test_missing_canonical_ignores_backup() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        let mut state = sample_state();
        store.save(&state).await.unwrap();
        state.push_choice("Climb the tower");
        store.save(&state).await.unwrap();
        assert!(store.backup_path().exists());

        fs::remove_file(store.save_path()).await.unwrap();

        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_both_files_corrupted_yields_none() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        fs::write(store.save_path(), "garbage").await.unwrap();
        fs::write(store.backup_path(), "more garbage").await.unwrap();

        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        assert!(store_in(&dir).load().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_canonical_recovers_richer_backup() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        let state = sample_state();

        store.save(&state).await.unwrap();
        store.backup().await.unwrap();
        store.overwrite(&StoryState::new()).await.unwrap();

        let loaded = store.load().await.expect("backup progress should be recovered");
        assert_eq!(loaded.narrative_history(), state.narrative_history());
    }

    #[tokio::test]
    async fn test_empty_canonical_without_backup_yields_none() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        store.overwrite(&StoryState::new()).await.unwrap();

        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_duplicates_removed_on_load() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        let content = serde_json::json!({
            "version": 1,
            "savedAt": "2024-01-01T00:00:00Z",
            "state": {
                "narrativeHistory": ["You enter a cave.", "You enter a cave.", "It is dark."],
                "conversationHistory": [
                    {"role": "user", "content": "Look"},
                    {"role": "user", "content": "Look"}
                ],
                "plotStage": 1
            }
        });
        fs::write(store.save_path(), content.to_string()).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.narrative_history(), ["You enter a cave.", "It is dark."]);
        assert_eq!(loaded.conversation_history().len(), 1);
    }

    #[tokio::test]
    async fn test_peek_reads_header() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        store.save(&sample_state()).await.unwrap();

        let info = store.peek().await.unwrap();
        assert_eq!(info.version, SAVE_VERSION);
        assert!(chrono::DateTime::parse_from_rfc3339(&info.saved_at).is_ok());
    }

    #[tokio::test]
    async fn test_clear_backup_tolerates_missing_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        store.clear_backup().await.unwrap();

        fs::write(store.backup_path(), "x").await.unwrap();
        store.clear_backup().await.unwrap();
        assert!(!store.backup_path().exists());
    }

    #[tokio::test]
    async fn test_remove_save_tolerates_missing_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        store.remove_save().await.unwrap();

        store.save(&sample_state()).await.unwrap();
        store.remove_save().await.unwrap();
        assert!(!store.save_path().exists());
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_reported() {
        let mut calls = 0;
        let result = with_retries(
            "rename",
            3,
            |_| Duration::from_millis(1),
            || {
                calls += 1;
                async { Err(std::io::Error::new(ErrorKind::PermissionDenied, "locked")) }
            },
        )
        .await;

        assert_eq!(calls, 3);
        assert!(matches!(
            result,
            Err(PersistError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_transient_rename_failure_still_saves() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let from = dir.path().join("story_state.json.pending.tmp");
        let to = dir.path().join("story_state.json");
        fs::write(&from, "{}").await.unwrap();

        let mut calls = 0;
        let result = with_retries(
            "rename",
            3,
            |_| Duration::from_millis(1),
            || {
                calls += 1;
                let locked = calls < 3;
                let (from, to) = (from.clone(), to.clone());
                async move {
                    if locked {
                        Err(std::io::Error::new(ErrorKind::PermissionDenied, "locked"))
                    } else {
                        fs::rename(from, to).await
                    }
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls, 3);
        assert!(to.exists());
        assert!(!from.exists());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = store_in(&dir);
        // A non-empty directory at the canonical path makes every rename fail.
        fs::create_dir_all(store.save_path().join("occupied")).await.unwrap();

        let result = store.overwrite(&sample_state()).await;

        assert!(matches!(
            result,
            Err(PersistError::RetriesExhausted {
                operation: "rename",
                attempts: 3,
                ..
            })
        ));
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".tmp"), "leftover temp file {name}");
        }
    }
}
