use std::path::PathBuf;

use ensemble_eval::replay::{replay_files, save_snapshot};
use ensemble_eval::{EvaluatorConfig, ProgressSummary};

fn usage() -> ! {
    eprintln!("Usage: ee_replay [--config <config.json>] <snapshot.json> <events.ndjson> [out.json]");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  ee_replay snapshot.json events.ndjson final.json");
    eprintln!();
    eprintln!("Log level is read from RUST_LOG (default: warn).");
    std::process::exit(2);
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<EvaluatorConfig, String> {
    let Some(path) = path else {
        return Ok(EvaluatorConfig::default());
    };
    let text = std::fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))?;
    EvaluatorConfig::from_json(&text).map_err(|e| format!("{}: {e}", path.display()))
}

fn main() {
    init_tracing();

    let mut args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut config_path = None;
    if args.first().map(String::as_str) == Some("--config") {
        if args.len() < 2 {
            usage();
        }
        args.remove(0);
        config_path = Some(PathBuf::from(args.remove(0)));
    }
    if args.len() < 2 || args.len() > 3 {
        usage();
    }

    let snapshot_path = PathBuf::from(args.remove(0));
    let events_path = PathBuf::from(args.remove(0));
    let out_path = if args.is_empty() {
        PathBuf::from("snapshot.out.json")
    } else {
        PathBuf::from(args.remove(0))
    };

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let outcome = match replay_files(&snapshot_path, &events_path, &config) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        applied = outcome.applied,
        skipped = outcome.skipped,
        "events replayed"
    );

    print!("{}", ProgressSummary::from_snapshot(&outcome.snapshot.export()));
    println!("{} events applied, {} skipped", outcome.applied, outcome.skipped);

    if let Err(e) = save_snapshot(&outcome.snapshot, &out_path) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    println!("{}", out_path.display());
}
