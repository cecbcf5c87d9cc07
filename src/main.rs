use std::io;
use std::process::ExitCode;

use tracing::{error, info, warn};

use leasestat::config::Config;
use leasestat::engine::{replay_subjects, Engine};
use leasestat::model::SubjectState;
use leasestat::wal::Wal;

const USAGE: &str = "usage: leasestat <check|compact|dump>";

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    leasestat::observability::init(config.metrics_port)?;

    let Some(command) = std::env::args().nth(1) else {
        eprintln!("{USAGE}");
        return Ok(ExitCode::from(2));
    };

    info!("wal: {}", config.wal_path().display());

    match command.as_str() {
        "check" => check(&config),
        "compact" => {
            let engine = Engine::open(&config)?;
            engine.compact_wal().await?;
            Ok(ExitCode::SUCCESS)
        }
        "dump" => {
            for ss in replayed_subjects(&config)? {
                for interval in &ss.intervals {
                    println!("{}", serde_json::to_string(interval)?);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        other => {
            eprintln!("unknown command {other:?}\n{USAGE}");
            Ok(ExitCode::from(2))
        }
    }
}

/// Subjects left by the WAL on disk, ordered by id. Never writes the file.
fn replayed_subjects(config: &Config) -> io::Result<Vec<SubjectState>> {
    let report = Wal::replay_report(&config.wal_path())?;
    if report.torn_tail {
        warn!("WAL has a torn trailing entry; it is ignored here and cut on the next open");
    }
    info!("{} events replayed", report.events.len());
    let mut subjects: Vec<SubjectState> = replay_subjects(&report.events).into_values().collect();
    subjects.sort_by_key(|ss| ss.id);
    Ok(subjects)
}

/// Verify every subject's timeline is a coalesced partition, read-only.
fn check(config: &Config) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let subjects = replayed_subjects(config)?;
    let mut faults = 0usize;
    for ss in &subjects {
        if let Err(fault) = ss.check_partition() {
            error!("subject {}: {fault}", ss.id);
            faults += 1;
        }
    }

    info!("checked {} subjects, {faults} faulty", subjects.len());
    Ok(if faults == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
