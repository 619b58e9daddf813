use clap::Parser;
use fleet_watch::cli::{self, Command};
use fleet_watch::config::{Config, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fleet_watch")]
#[command(about = "Cold-chain fleet monitor: liveness, alerts and trip reports", long_about = None)]
struct Args {
    /// Verbose output (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let args = Args::parse();

    // Set verbosity level (0-3)
    let verbosity = args.verbose.min(3);

    if let Err(e) = Config::ensure_data_directory() {
        eprintln!("Warning: cannot create {:?}: {}", Config::data_dir(), e);
    }
    fleet_watch::init_tracing(verbosity, Some(Config::log_file_path()));

    info!(
        "fleet_watch {} (built {}) by {}",
        Config::version(),
        Config::build_date(),
        Config::authors()
    );

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            error!("Config: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Received Ctrl-C, shutting down");
        on_signal.cancel();
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(code) = runtime.block_on(cli::run(args.command, settings, cancel)) {
        std::process::exit(code);
    }
}
