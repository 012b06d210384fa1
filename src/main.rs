use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use agents_council::{
    AgentsCouncil, CancelOutcome, Debate, DebateFilter, DebateStatus, DebateUpdate, Event,
    Settings,
};

#[derive(Parser)]
#[command(name = "agents-council", version)]
#[command(about = "Multi-agent LLM debates that run until the council agrees", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// SQLite database path (overrides the configured location)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered providers and whether they are usable
    Providers,

    /// Manage councils
    Council {
        #[command(subcommand)]
        action: CouncilAction,
    },

    /// List saved councils
    Councils,

    /// Run a debate and stream it to the terminal
    Debate {
        /// Council ID
        council_id: String,

        /// The question to debate
        topic: String,
    },

    /// List debates
    Debates {
        /// Show only debates of this council
        #[arg(long)]
        council: Option<String>,

        /// Show only debates with this status (pending, in_progress,
        /// consensus_reached, round_limit_reached, cancelled, error)
        #[arg(long)]
        status: Option<String>,
    },

    /// Show a debate with its rounds, summary and history
    Show {
        /// Debate ID
        debate_id: String,
    },

    /// Cancel a debate
    Cancel {
        /// Debate ID
        debate_id: String,
    },

    /// Delete a debate
    Delete {
        /// Debate ID
        debate_id: String,
    },

    /// Mark debates left unfinished by a crashed or killed process as error.
    /// Run it only while no other process is running debates.
    Recover,
}

#[derive(Subcommand)]
enum CouncilAction {
    /// Import a council from a TOML file
    Import {
        /// Path to the council TOML file
        file: PathBuf,
    },

    /// Delete a council
    Delete {
        /// Council ID
        council_id: String,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive("info".parse().expect("valid log directive"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load().unwrap_or_else(|e| {
        debug!(error = %e, "failed to load config, using defaults");
        Settings::default()
    });

    let app = AgentsCouncil::builder()
        .settings(settings)
        .sqlite_storage(cli.db)
        .context("failed to initialize storage")?
        .build()
        .context("failed to build agents council")?;

    match cli.command {
        Commands::Providers => {
            let available = app.available_providers();
            println!("{:<12} STATUS", "PROVIDER");
            println!("{}", "-".repeat(30));
            for name in app.registry().names() {
                let status = if available.contains(&name) {
                    "available"
                } else {
                    "unavailable"
                };
                println!("{:<12} {}", name, status);
            }
        }

        Commands::Council { action } => match action {
            CouncilAction::Import { file } => {
                let text = std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?;
                let council = app
                    .import_council(&text)
                    .await
                    .context("failed to import council")?;

                info!(council_id = %council.id, "imported council");
                println!(
                    "Imported council '{}' as {} ({} agents)",
                    council.name,
                    council.id,
                    council.agents.len()
                );
            }
            CouncilAction::Delete { council_id } => {
                app.delete_council(&council_id).await?;
                println!("Deleted council: {}", council_id);
            }
        },

        Commands::Councils => {
            let councils = app.councils().await?;
            if councils.is_empty() {
                println!("No councils found.");
                return Ok(());
            }

            println!(
                "{:<38} {:<7} {:<7} {:<9} NAME",
                "ID", "AGENTS", "ROUNDS", "THRESHOLD"
            );
            println!("{}", "-".repeat(80));
            for council in councils {
                println!(
                    "{:<38} {:<7} {:<7} {:<9} {}",
                    council.id,
                    council.agents.len(),
                    council.max_rounds,
                    council.consensus_threshold,
                    council.name
                );
            }
        }

        Commands::Debate { council_id, topic } => {
            let mut handle = app
                .create_debate(&council_id, &topic)
                .await
                .context("failed to start debate")?;
            println!("Debate {}", handle.debate_id());

            let mut interrupted = false;
            loop {
                tokio::select! {
                    update = handle.next_event() => match update {
                        Some(update) => print_update(&update),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c(), if !interrupted => {
                        interrupted = true;
                        eprintln!("Cancelling after the current round...");
                        handle.cancel();
                    }
                }
            }

            let debate = handle.wait().await?;
            if debate.status == DebateStatus::Error {
                anyhow::bail!(
                    "debate ended in error: {}",
                    debate.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Commands::Debates { council, status } => {
            let status_filter = match status {
                Some(ref s) => Some(
                    s.parse::<DebateStatus>()
                        .with_context(|| format!("invalid status filter: {}", s))?,
                ),
                None => None,
            };
            let filter = DebateFilter {
                council_id: council,
                status: status_filter,
            };

            let debates = app.debates(&filter).await?;
            if debates.is_empty() {
                println!("No debates found.");
                return Ok(());
            }

            println!("{:<10} {:<20} {:<6} TOPIC", "ID", "STATUS", "ROUND");
            println!("{}", "-".repeat(70));
            for debate in debates {
                println!("{}", debate);
            }
        }

        Commands::Show { debate_id } => {
            let debate = app.debate(&debate_id).await?;
            print_debate(&debate);

            let history = app.history(&debate_id).await?;
            if !history.is_empty() {
                println!("\nHistory:");
                for entry in history {
                    println!(
                        "  {} [{}] round {}: {}",
                        entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.status,
                        entry.round,
                        entry.message
                    );
                }
            }
        }

        Commands::Cancel { debate_id } => match app.cancel(&debate_id).await? {
            CancelOutcome::Requested => println!("Cancellation requested: {}", debate_id),
            CancelOutcome::Cancelled => println!("Cancelled debate: {}", debate_id),
            CancelOutcome::AlreadyFinished(status) => {
                println!("Debate {} already finished ({})", debate_id, status)
            }
        },

        Commands::Delete { debate_id } => {
            app.delete_debate(&debate_id).await?;
            println!("Deleted debate: {}", debate_id);
        }

        Commands::Recover => {
            let recovered = app.recover_interrupted().await?;
            info!(count = recovered.len(), "marked interrupted debates as error");
            if recovered.is_empty() {
                println!("No interrupted debates found.");
            }
            for debate_id in recovered {
                println!("Recovered debate: {}", debate_id);
            }
        }
    }

    Ok(())
}

fn print_update(update: &DebateUpdate) {
    match &update.event {
        Event::DebateStart {
            topic,
            agent_count,
            max_rounds,
            ..
        } => {
            println!(
                "Topic: {}\n{} agents, up to {} rounds",
                topic, agent_count, max_rounds
            );
        }
        Event::RoundStart { round } => {
            println!("\n=== Round {} ===", round);
        }
        Event::AgentThinking { agent_name, .. } => {
            debug!(agent = %agent_name, "thinking");
        }
        Event::AgentResponseChunk { .. } => {}
        Event::AgentResponse { response, .. } => {
            println!("\n[{} - {}]", response.agent_name, response.role);
            println!("{}", response.content);
            if let Some(ref reasoning) = response.reasoning {
                println!("Reasoning: {}", reasoning);
            }
        }
        Event::Vote {
            agent_name, vote, ..
        } => {
            println!("  {:<20} {}", agent_name, vote);
        }
        Event::RoundComplete {
            round,
            tally,
            consensus,
        } => {
            let outcome = if *consensus {
                "consensus"
            } else {
                "no consensus"
            };
            println!("Round {}: {} ({})", round, tally, outcome);
        }
        Event::DebateComplete {
            status,
            rounds,
            summary,
            pro_points,
            against_points,
            error_message,
        } => {
            println!("\nDebate finished: {} after {} rounds", status, rounds);
            if let Some(message) = error_message {
                println!("Error: {}", message);
            }
            if let Some(summary) = summary {
                println!("\n{}", summary);
            }
            print_points("Pro", pro_points.as_deref());
            print_points("Against", against_points.as_deref());
        }
    }
}

fn print_points(label: &str, points: Option<&[String]>) {
    let Some(points) = points.filter(|p| !p.is_empty()) else {
        return;
    };
    println!("\n{}:", label);
    for (i, point) in points.iter().enumerate() {
        println!("  {}. {}", i + 1, point);
    }
}

fn print_debate(debate: &Debate) {
    println!("Debate:   {}", debate.id);
    println!("Council:  {}", debate.council_id);
    println!("Topic:    {}", debate.topic);
    println!("Status:   {}", debate.status);
    println!("Rounds:   {}", debate.current_round);
    println!("Created:  {}", debate.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed) = debate.completed_at {
        println!("Finished: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(ref message) = debate.error_message {
        println!("Error:    {}", message);
    }

    for round in &debate.rounds {
        let tally = round.tally.unwrap_or_default();
        println!("\n=== Round {} ({}) ===", round.round_number, tally);
        for response in &round.responses {
            println!(
                "\n[{} - {}] {}",
                response.agent_name,
                response.role,
                response.effective_vote()
            );
            println!("{}", response.content);
        }
    }

    if let Some(ref summary) = debate.summary {
        println!("\nSummary:\n{}", summary);
    }
    print_points("Pro", debate.pro_points.as_deref());
    print_points("Against", debate.against_points.as_deref());
}
