//! Arc progression through the session API.

use chronicle_core::arc::{self, GENERIC_TRANSITION_GUIDANCE};
use chronicle_core::testing::chapter_with_objectives;
use chronicle_core::{Progress, StoreConfig, StoryArc, StoryPace, StorySession};
use std::time::Duration;
use tempfile::TempDir;

async fn open(dir: &TempDir) -> StorySession {
    StorySession::open(StoreConfig::new(dir.path()).with_retry_delay(Duration::from_millis(1)))
        .await
}

async fn narrate(session: &mut StorySession, turns: usize) {
    let start = session.narrative_history().len();
    for i in 0..turns {
        session
            .add_narrative(&format!("Turn {}: the tale unfolds further.", start + i + 1))
            .await;
    }
}

/// Add `total` objectives and complete the first `completed` of them.
async fn set_objectives(session: &mut StorySession, prefix: &str, total: usize, completed: usize) {
    for i in 1..=total {
        session.add_objective(&format!("{prefix} {i}")).await;
    }
    for i in 1..=completed {
        session.complete_objective(&format!("{prefix} {i}")).await;
    }
}

#[test]
fn test_three_pending_nine_completed_should_advance() {
    assert!(arc::should_advance(&chapter_with_objectives(3, 9)));
    assert!(!arc::should_advance(&chapter_with_objectives(0, 0)));
}

#[tokio::test]
async fn test_chapter_advances_to_rising_action() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut session = open(&dir).await;
    narrate(&mut session, 5).await;
    set_objectives(&mut session, "Goal", 12, 9).await;

    let transition = match session.evaluate_progress().await {
        Progress::Advanced(transition) => transition,
        Progress::Holding(readiness) => {
            panic!("expected the chapter to advance: {:?}", readiness.missing_reasons)
        }
    };
    assert_eq!(transition.from, StoryArc::Introduction);
    assert_eq!(transition.to, StoryArc::RisingAction);
    assert_ne!(transition.guidance, GENERIC_TRANSITION_GUIDANCE);

    assert_eq!(session.chapters().len(), 1);
    assert_eq!(session.chapters()[0].arc(), StoryArc::Introduction);
    assert_eq!(session.chapters()[0].completed_objectives().len(), 9);
    assert_eq!(session.current_chapter().arc(), StoryArc::RisingAction);
    assert_eq!(session.current_chapter().title, "Rising Tensions");
    assert_eq!(session.current_chapter().objective_count(), 0);

    // The transition is on disk.
    let resumed = open(&dir).await;
    assert_eq!(resumed.current_chapter().arc(), StoryArc::RisingAction);
    assert_eq!(resumed.chapters().len(), 1);
}

#[tokio::test]
async fn test_fast_pace_reports_missing_exchanges() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut session = open(&dir).await;
    session.set_story_pace(StoryPace::Fast).await;
    narrate(&mut session, 2).await;
    set_objectives(&mut session, "Goal", 1, 1).await;

    let readiness = session.readiness();
    assert!(!readiness.can_progress);
    assert!(readiness
        .missing_reasons
        .iter()
        .any(|r| r.contains("narrative exchanges")));

    match session.evaluate_progress().await {
        Progress::Holding(_) => {}
        other => panic!("expected to hold, got {other:?}"),
    }
    assert_eq!(session.current_chapter().arc(), StoryArc::Introduction);
}

#[tokio::test]
async fn test_full_cycle_returns_to_introduction() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut session = open(&dir).await;
    narrate(&mut session, 12).await;
    session.add_combat_narrative("Blades clash in the dark.").await;

    let expected = [
        StoryArc::RisingAction,
        StoryArc::Climax,
        StoryArc::FallingAction,
        StoryArc::Resolution,
        StoryArc::Introduction,
    ];
    for (round, arc) in expected.into_iter().enumerate() {
        set_objectives(&mut session, &format!("Round {round} goal"), 4, 4).await;
        match session.evaluate_progress().await {
            Progress::Advanced(transition) => assert_eq!(transition.to, arc),
            Progress::Holding(readiness) => {
                panic!("round {round} held: {:?}", readiness.missing_reasons)
            }
        }
    }

    assert_eq!(session.chapters().len(), 5);
    assert_eq!(session.current_chapter().title, "The Beginning");
}

#[tokio::test]
async fn test_rising_action_waits_for_combat() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut session = open(&dir).await;
    narrate(&mut session, 10).await;
    set_objectives(&mut session, "Intro", 1, 1).await;
    assert!(matches!(
        session.evaluate_progress().await,
        Progress::Advanced(_)
    ));

    set_objectives(&mut session, "Rising", 2, 2).await;
    assert!(matches!(
        session.evaluate_progress().await,
        Progress::Holding(_)
    ));

    session.add_combat_narrative("An ambush on the road!").await;
    assert!(matches!(
        session.evaluate_progress().await,
        Progress::Advanced(_)
    ));
    assert_eq!(session.current_chapter().arc(), StoryArc::Climax);
}

#[tokio::test]
async fn test_stale_objectives_are_pruned_during_evaluation() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut session = open(&dir).await;
    narrate(&mut session, 25).await;
    set_objectives(&mut session, "Errand", 10, 0).await;

    session.evaluate_progress().await;

    let pending = session.current_chapter().pending_objectives();
    assert_eq!(pending.len(), 5);
    assert_eq!(pending[0], "Errand 6");
}

#[tokio::test]
async fn test_repetition_shows_in_guidance() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut session = open(&dir).await;
    for choice in ["Search the room", "search the room.", "Wait", "SEARCH the room"] {
        session.add_choice(choice).await;
    }

    assert!(session.is_repeating());
    assert!(session.current_arc_guidance().contains("repeating"));
    assert!(session
        .summarize_recent_events()
        .contains("## Recent Player Choices"));
}
