use capdq_client::HttpQueueBackend;
use capdq_core::{
    CoreConfig, DEFAULT_POLL_INTERVAL, DEFAULT_SKIP_POSITIONS, QueueEngine, QueueStatus,
    TriagedEntry,
};
use capdq_types::NonEmptyText;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "capdq")]
#[command(about = "CAPD clinic queue engine CLI")]
struct Cli {
    /// Base URL of the external queue service
    #[arg(long, default_value = "http://localhost:8080/api")]
    backend_url: String,
    /// Bearer token attached to every backend call
    #[arg(long, default_value = "dev-token")]
    token: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the categorized queue board
    Board,
    /// Show who should be seen next
    Next,
    /// Start consultations for the top-ranked waiting patients
    Start,
    /// Update one entry's status
    Status {
        /// Queue entry identifier
        queue_id: i64,
        /// One of: waiting, in_progress, completed, cancelled
        status: String,
        /// Doctor to assign (required for in_progress)
        #[arg(long)]
        doctor: Option<i64>,
    },
    /// Push a waiting entry back in the order
    Skip {
        /// Queue entry identifier
        queue_id: i64,
    },
    /// Move a waiting emergency entry to the front
    Prioritize {
        /// Queue entry identifier
        queue_id: i64,
    },
    /// Hand a waiting emergency patient off to the emergency department
    Emergency {
        /// Queue entry identifier
        queue_id: i64,
    },
    /// Trigger the service-side emergency recomputation
    Recompute,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Arc::new(CoreConfig::new(
        cli.backend_url,
        NonEmptyText::new(cli.token)?,
        NonEmptyText::new("CAPD Clinic")?,
        DEFAULT_POLL_INTERVAL,
        DEFAULT_SKIP_POSITIONS,
    )?);
    let backend = Arc::new(HttpQueueBackend::new(&config)?);
    let engine = QueueEngine::new(backend, config);

    engine.refresh().await?;

    match cli.command {
        Some(Commands::Board) | None => {
            let board = engine.board().await;
            println!("Clinic time: {}", board.clinic_time.format("%Y-%m-%d %H:%M"));
            print_section("Waiting", &board.waiting);
            print_section("In progress", &board.in_progress);
            print_section("Completed", &board.completed);
            print_section("Cancelled", &board.cancelled);
            print_section("Emergency", &board.emergency);
            if board.available_doctors.is_empty() {
                println!("No doctors available.");
            } else {
                println!("Available doctors:");
                for doctor in &board.available_doctors {
                    println!("  {} ({})", doctor.name, doctor.specialization);
                }
            }
        }
        Some(Commands::Next) => {
            let next = engine.next_for_consultation().await;
            if next.is_empty() {
                println!("Nobody can be seen right now.");
            } else {
                for entry in next {
                    println!("#{} {}", entry.queue_number, entry.patient.display_name);
                }
            }
        }
        Some(Commands::Start) => {
            engine.start_queue().await?;
            println!("Consultations started.");
        }
        Some(Commands::Status {
            queue_id,
            status,
            doctor,
        }) => {
            let status = parse_status(&status)?;
            engine.update_status(queue_id, status, doctor).await?;
            println!("Queue {queue_id} is now {status}.");
        }
        Some(Commands::Skip { queue_id }) => {
            engine.skip(queue_id).await?;
            println!("Queue {queue_id} pushed back.");
        }
        Some(Commands::Prioritize { queue_id }) => {
            engine.prioritize_emergency(queue_id).await?;
            println!("Queue {queue_id} moved to the front.");
        }
        Some(Commands::Emergency { queue_id }) => {
            engine.send_to_emergency(queue_id).await?;
            println!("Queue {queue_id} handed off to the emergency department.");
        }
        Some(Commands::Recompute) => {
            engine.update_emergency_statuses().await?;
            println!("Emergency classifications recomputed.");
        }
    }

    Ok(())
}

fn parse_status(input: &str) -> anyhow::Result<QueueStatus> {
    match input {
        "waiting" => Ok(QueueStatus::Waiting),
        "in_progress" => Ok(QueueStatus::InProgress),
        "completed" => Ok(QueueStatus::Completed),
        "cancelled" => Ok(QueueStatus::Cancelled),
        other => anyhow::bail!(
            "unknown status '{other}' (expected waiting, in_progress, completed or cancelled)"
        ),
    }
}

fn print_section(title: &str, entries: &[TriagedEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("{title}:");
    for triaged in entries {
        let mut line = format!(
            "  #{} {} [{}]",
            triaged.entry.queue_number,
            triaged.entry.patient.display_name,
            triaged.assessment.label
        );
        if triaged.assessment.is_emergency {
            line.push_str(&format!(
                " {} - {}",
                triaged.assessment.solution.label, triaged.assessment.advisory
            ));
        }
        println!("{line}");
    }
}
