//! Bulk-load a tweets CSV export into the analytics database.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tweet_analytics_service::db::Db;
use tweet_analytics_service::importer::{self, ImportError};
use tweet_analytics_types::ImportSummary;

#[derive(Parser, Debug)]
#[command(name = "import-tweets", version, about = "Import a tweets CSV into the analytics database")]
struct Args {
    /// CSV file with a header row naming every tweets column
    csv_path: PathBuf,

    /// SQLite database path
    #[arg(long, env = "DATABASE_URL", default_value = "./tweets.db")]
    database: String,
}

fn run(args: &Args) -> Result<ImportSummary, ImportError> {
    log::info!("Opening database at: {}", args.database);
    let db = Db::open(&args.database, 1)?;
    importer::import_csv(&db, &args.csv_path)
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    match run(&args) {
        Ok(summary) => {
            match serde_json::to_string(&summary) {
                Ok(json) => println!("{}", json),
                Err(e) => log::warn!("Could not render summary: {}", e),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Import of {} failed: {}", args.csv_path.display(), e);
            ExitCode::FAILURE
        }
    }
}
