//! `checkindex` - verify the integrity of a Sarissa index directory.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use log::error;

use sarissa_check::check::{CheckIndex, CheckIndexConfig, Status};
use sarissa_check::error::Result;
use sarissa_check::storage::Storage;
use sarissa_check::storage::file::{FileStorage, FileStorageConfig};

/// Check a Sarissa index for corruption. The index is only read, never repaired.
#[derive(Parser, Debug, Clone)]
#[command(name = "checkindex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
struct CheckIndexArgs {
    /// Index directory
    index_dir: PathBuf,

    /// Only check this segment (may be repeated)
    #[arg(short = 's', long = "segment", value_name = "NAME")]
    segments: Vec<String>,

    /// Verbosity level; -v flushes every report line, -vv and -vvv raise the log level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the status tree as JSON instead of the progress report
    #[arg(long)]
    json: bool,

    /// Number of segments checked concurrently (0 = one per CPU core)
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Compare term vectors with postings
    #[arg(long)]
    cross_check_term_vectors: bool,
}

impl CheckIndexArgs {
    fn log_level(&self) -> &'static str {
        match self.verbose {
            0 | 1 => "warn",
            2 => "info",
            _ => "debug",
        }
    }
}

fn main() {
    let args = CheckIndexArgs::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level()))
        .init();

    match run(&args) {
        Ok(status) if status.clean => process::exit(0),
        Ok(_) => process::exit(1),
        Err(e) => {
            error!("check failed: {e}");
            eprintln!("Error: {e}");
            process::exit(2);
        }
    }
}

fn run(args: &CheckIndexArgs) -> Result<Status> {
    if !args.index_dir.is_dir() {
        return Err(sarissa_check::error::SarissaError::storage(format!(
            "{} is not a directory",
            args.index_dir.display()
        )));
    }

    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(
        &args.index_dir,
        FileStorageConfig::new(&args.index_dir),
    )?);
    let config = CheckIndexConfig::default()
        .with_threads(args.threads)
        .with_cross_check_term_vectors(args.cross_check_term_vectors);

    let mut checker = CheckIndex::with_config(storage, config)?;
    if !args.json {
        checker.set_report_sink(Some(Box::new(std::io::stdout())), args.verbose > 0);
    }

    let status = if args.segments.is_empty() {
        checker.check_index()
    } else {
        checker.check_segments(&args.segments)
    };
    checker.close()?;

    let status = status?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    }
    Ok(status)
}
