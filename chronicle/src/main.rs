//! Chronicle save inspector.
//!
//! A headless tool for looking at, and resetting, the story save slot.
//!
//! ```bash
//! cargo run -p chronicle -- status
//! cargo run -p chronicle -- evaluate --dir ./saves
//! cargo run -p chronicle -- reset --yes
//! ```

use chronicle_core::{Progress, StoreConfig, StorySession};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chronicle=info,chronicle_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let Some(command) = find_command(&args) else {
        print_help();
        return Ok(());
    };

    let mut config = StoreConfig::from_env()?;
    if let Some(dir) = flag_value(&args, "--dir") {
        config.save_dir = dir.into();
    }

    debug!(dir = %config.save_dir.display(), "opening save slot");
    let mut session = StorySession::open(config).await;

    match command {
        "status" => print_status(&session).await,
        "evaluate" => {
            match session.evaluate_progress().await {
                Progress::Advanced(transition) => {
                    println!(
                        "Advanced from {} to {} (closed \"{}\")",
                        transition.from, transition.to, transition.closed_chapter
                    );
                    println!("Guidance: {}", transition.guidance);
                }
                Progress::Holding(readiness) => {
                    println!("Chapter continues.");
                    for reason in readiness.missing_reasons {
                        println!("  - {reason}");
                    }
                }
            }
            if let Some(error) = session.last_save_error() {
                eprintln!("Warning: progress was not saved: {error}");
            }
        }
        "reset" => {
            let confirmed = args.iter().any(|a| a == "--yes");
            if !confirmed {
                println!("Refusing to reset without --yes.");
            } else if session.reset(true).await {
                println!("Story reset. The previous campaign and its backup are gone.");
            } else {
                eprintln!(
                    "Reset failed: {}",
                    session.last_save_error().unwrap_or("the save could not be replaced")
                );
                std::process::exit(1);
            }
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn print_status(session: &StorySession) {
    let store = session.store();
    match store.peek().await {
        Ok(info) => println!(
            "Save: {} (version {}, saved {})",
            info.path.display(),
            info.version,
            info.saved_at
        ),
        Err(_) => println!("Save: none at {}", store.save_path().display()),
    }

    let chapter = session.current_chapter();
    println!();
    println!("Chapter: {} [{}]", chapter.title, chapter.arc());
    println!("  {}", chapter.summary);
    println!("Archived chapters: {}", session.chapters().len());
    println!(
        "Plot stage {}: {}",
        session.plot_stage(),
        session.plot_summary()
    );
    println!(
        "Pace: {}",
        session
            .story_pace()
            .map(|p| p.name())
            .unwrap_or("not chosen")
    );
    println!(
        "History: {} narrative, {} conversation, {} choices",
        session.narrative_history().len(),
        session.conversation_history().len(),
        session.choices().len()
    );

    println!();
    println!("Objectives:");
    for objective in chapter.pending_objectives() {
        println!("  [ ] {objective}");
    }
    for objective in chapter.completed_objectives() {
        println!("  [x] {objective}");
    }

    let readiness = session.readiness();
    println!();
    if readiness.can_progress {
        println!("Arc requirements met.");
    } else {
        println!("Arc requirements missing:");
        for reason in &readiness.missing_reasons {
            println!("  - {reason}");
        }
    }
    if session.is_repeating() {
        println!("The player is repeating the same choice.");
    }
}

/// Flags that consume the following argument.
const VALUE_FLAGS: &[&str] = &["--dir"];

/// The first argument that is neither a flag nor a flag's value.
fn find_command(args: &[String]) -> Option<&str> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
        } else if !arg.starts_with('-') {
            return Some(arg.as_str());
        }
    }
    None
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn print_help() {
    println!("Chronicle save inspector");
    println!();
    println!("USAGE:");
    println!("    chronicle <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    status              Show the current chapter, objectives and arc readiness");
    println!("    evaluate            Run one progress check and advance the arc if ready");
    println!("    reset --yes         Discard the campaign and its backup");
    println!();
    println!("OPTIONS:");
    println!("    --dir <PATH>        Save directory (default: $CHRONICLE_SAVE_DIR or ./saves)");
    println!("    -h, --help          Show this help");
    println!();
    println!("Log level is read from RUST_LOG.");
}
