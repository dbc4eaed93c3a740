//! Persistent story-state engine for AI-narrated role-playing games.
//!
//! This crate provides:
//! - The story state: narrative and conversation logs, chapters, objectives,
//!   characters, traits and themes
//! - A five-stage story arc machine with progression gating
//! - Crash-safe persistence with backup recovery
//! - Prompt context for the narrative generator
//!
//! # Quick Start
//!
//! ```ignore
//! use chronicle_core::{StoreConfig, StorySession};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut session = StorySession::open(StoreConfig::new("saves")).await;
//!
//!     session.add_narrative("You wake in a cold cell.").await;
//!     session.add_objective("Escape the dungeon").await;
//!
//!     let prompt_context = session.summarize_recent_events();
//!     println!("{prompt_context}");
//! }
//! ```

pub mod arc;
pub mod config;
pub mod context;
pub mod objectives;
pub mod persist;
pub mod session;
pub mod state;
pub mod testing;

// Primary public API
pub use arc::{ArcTransition, StoryArc};
pub use config::{ConfigError, StoreConfig};
pub use objectives::{ArcReadiness, ArcRequirements};
pub use persist::{PersistError, SaveOutcome, SaveStore, SavedStory};
pub use session::{Progress, StorySession};
pub use state::{
    CharacterInfo, CharacterTrait, Chapter, ConversationEntry, Relationship, Role, StoryPace,
    StoryState,
};
