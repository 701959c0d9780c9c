use clap::{Parser, Subcommand};
use std::path::PathBuf;

use scout_scan::api::stats::ExportTarget;

mod cli;

#[derive(Parser)]
#[command(name = "scout-scan")]
#[command(about = "FRC scouting QR scanner and event stats exporter")]
#[command(version)]
struct Cli {
    /// Config file (JSON5); defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a sequence of images as if they were camera frames
    Scan {
        /// Image files, in capture order
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Where scans are stored (default: ~/.scoutops)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Simulated time between images in milliseconds
        #[arg(short, long, default_value = "2500")]
        interval_ms: u64,
    },

    /// Export an event from The Blue Alliance to CSV
    Tba {
        /// Event key, e.g. 2025mimil
        event: String,

        /// Base directory; files go to <out>/<event>_<timestamp>
        #[arg(short, long, default_value = "tba_data")]
        out: PathBuf,

        /// Refresh <out>/<event> in place instead of a new timestamped directory
        #[arg(short = 'u', long)]
        update_existing: bool,

        /// TBA read key (overrides the config file)
        #[arg(short = 'k', long, env = "TBA_API_KEY")]
        api_key: Option<String>,
    },

    /// Export an event from Statbotics to CSV
    Statbotics {
        /// Event key, e.g. 2025mimil
        event: String,

        /// Base directory; files go to <out>/<event>_<timestamp>
        #[arg(short, long, default_value = "statbotics_data")]
        out: PathBuf,

        /// Refresh <out>/<event> in place instead of a new timestamped directory
        #[arg(short = 'u', long)]
        update_existing: bool,
    },

    /// Print one match with prediction, result, team info, OPR and EPA as JSON
    Match {
        /// Match key, e.g. 2025mimil_qm12
        match_key: String,

        /// Also write <match>_combined.json, results.csv and Team_Insights.csv here
        #[arg(short, long)]
        save: Option<PathBuf>,

        /// TBA read key (overrides the config file)
        #[arg(short = 'k', long, env = "TBA_API_KEY")]
        api_key: Option<String>,
    },

    /// Write Team_Insights.csv (team info, OPR, EPA) for every team at an event
    Insights {
        /// Event key, e.g. 2025mimil
        event: String,

        /// Output directory
        #[arg(short, long, default_value = "match_data")]
        out: PathBuf,

        /// TBA read key (overrides the config file)
        #[arg(short = 'k', long, env = "TBA_API_KEY")]
        api_key: Option<String>,
    },

    /// Write a config file filled with defaults
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=scout_scan=debug
    scout_scan::init_logging();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            images,
            data_dir,
            interval_ms,
        } => cli::scan_images(config, images, data_dir, interval_ms),
        Commands::Tba {
            event,
            out,
            update_existing,
            api_key,
        } => {
            let target = ExportTarget::new(out, update_existing);
            cli::export_tba(&config, &event, &target, api_key.as_deref())
        }
        Commands::Statbotics {
            event,
            out,
            update_existing,
        } => cli::export_statbotics(&config, &event, &ExportTarget::new(out, update_existing)),
        Commands::Match {
            match_key,
            save,
            api_key,
        } => cli::print_match(&config, &match_key, api_key.as_deref(), save.as_deref()),
        Commands::Insights {
            event,
            out,
            api_key,
        } => cli::insights(&config, &event, &out, api_key.as_deref()),
        Commands::InitConfig { path } => cli::init_config(&path),
    }
}
