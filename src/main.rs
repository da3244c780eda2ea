use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info};

use mediashelf::scanner::ScanProgress;
use mediashelf::{logging, server, Config, Database, ScanOptions, Scanner};

enum Command {
    Serve,
    Scan { force_rescan: bool },
}

struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut command = None;
    let mut force_rescan = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("mediashelf {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--force-rescan" => force_rescan = true,
            "serve" if command.is_none() => command = Some("serve"),
            "scan" if command.is_none() => command = Some("scan"),
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let command = match command {
        Some("scan") => Command::Scan { force_rescan },
        _ if force_rescan => {
            eprintln!("Error: --force-rescan only applies to the scan command");
            std::process::exit(1);
        }
        _ => Command::Serve,
    };

    Cli {
        config_path,
        command,
    }
}

fn print_help() {
    println!(
        r#"mediashelf - media library catalog

USAGE:
    mediashelf [OPTIONS] [serve]
    mediashelf [OPTIONS] scan [--force-rescan]

COMMANDS:
    serve               Run the HTTP API (default)
    scan                Run one library scan and print the summary

OPTIONS:
    --config, -c PATH   Path to config file
    --force-rescan      Re-read embedded metadata for unchanged files
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    MEDIASHELF_CONFIG   Path to config file (overrides default location)
    MEDIASHELF_LOG      Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/mediashelf/config.toml"#
    );
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn run_scan(config: &Config, force_rescan: bool) -> Result<()> {
    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open catalog {}", config.db_path.display()))?;
    db.initialize()?;

    let scanner = Scanner::new(&config.library);
    let (tx, rx) = mpsc::channel();
    let reporter = thread::spawn(move || {
        for progress in rx {
            match progress {
                ScanProgress::Started { total_files } => info!("Found {} media files", total_files),
                ScanProgress::Scanning { current, total, path } => {
                    debug!("[{}/{}] {}", current, total, path)
                }
                ScanProgress::Completed { .. } | ScanProgress::Error { .. } => {}
            }
        }
    });

    let result = scanner.scan_libraries(&db, ScanOptions { force_rescan }, Some(tx));
    let _ = reporter.join();

    let summary = result.context("Library scan failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args();
    let config = load_config(cli.config_path.as_ref())?;

    match cli.command {
        Command::Scan { force_rescan } => {
            logging::init_stderr()?;
            run_scan(&config, force_rescan)
        }
        Command::Serve => {
            let _logging = logging::init(Some(Config::config_dir().join("logs")))?;
            info!("Using catalog at {}", config.db_path.display());
            server::serve(&config).await
        }
    }
}
