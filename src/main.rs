pub mod client;
pub mod config;
pub mod harvest;
pub mod models;
pub mod server;
pub mod token;
pub mod store {
    pub mod csv;
    pub mod log;
    pub mod registry;
}
pub mod services {
    pub mod dashboard;
    pub mod ingest;
}

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{error, info};

use crate::config::Config;
use crate::store::registry::BuildingRegistry;

const USAGE: &str = "usage: rainharvest [--env-file PATH] <command>

commands:
  ingest [--date YYYY-MM-DD]   fetch the day's rainfall and record it
                               (--date records under a past date, for backfill)
  serve                        run the dashboard web server
  qr                           write one QR code PNG per registry building";

#[derive(Debug)]
enum Command {
    Ingest { date: Option<NaiveDate> },
    Serve,
    Qr,
}

#[derive(Debug)]
struct Cli {
    env_file: Option<PathBuf>,
    command: Command,
}

fn parse_cli() -> Result<Cli, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    let mut command: Option<String> = None;
    let mut date: Option<NaiveDate> = None;

    while let Some(arg) = args.next() {
        let Some(s) = arg.to_str() else {
            return Err("argument contains invalid UTF-8".to_string());
        };
        match s {
            "--env-file" => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            "--date" => {
                if !matches!(command.as_deref(), Some("ingest")) {
                    return Err("`--date` is only valid after the `ingest` command".to_string());
                }
                if date.is_some() {
                    return Err("`--date` provided more than once".to_string());
                }
                let value = args
                    .next()
                    .and_then(|v| v.to_str().map(str::to_string))
                    .ok_or_else(|| "`--date` requires a YYYY-MM-DD argument".to_string())?;
                date = Some(
                    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                        .map_err(|_| format!("`--date` must be YYYY-MM-DD, got `{}`", value))?,
                );
            }
            "--help" | "-h" => return Err(USAGE.to_string()),
            other if command.is_none() && !other.starts_with('-') => {
                command = Some(other.to_string());
            }
            other => return Err(format!("unrecognised argument: {}\n\n{}", other, USAGE)),
        }
    }

    let command = match command.as_deref() {
        Some("ingest") => Command::Ingest { date },
        Some("serve") => Command::Serve,
        Some("qr") => Command::Qr,
        Some(other) => return Err(format!("unknown command: {}\n\n{}", other, USAGE)),
        None => return Err(USAGE.to_string()),
    };

    Ok(Cli { env_file, command })
}

/// Load a `.env` file. Values already present in the process environment win.
/// Supports comments, `export` prefixes and single/double quoted values.
fn load_env_file(path: &Path) -> Result<(), String> {
    let text =
        fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let assignment = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);

        let Some((key, raw_value)) = assignment.split_once('=') else {
            return Err(format!("{}:{}: missing '=' in assignment", path.display(), index + 1));
        };
        let key = key.trim();
        if key.is_empty() || key.chars().any(|c| c.is_whitespace()) {
            return Err(format!(
                "{}:{}: invalid environment variable name `{}`",
                path.display(),
                index + 1,
                key
            ));
        }

        let value = {
            let v = raw_value.trim();
            if (v.starts_with('"') && v.ends_with('"') && v.len() >= 2)
                || (v.starts_with('\'') && v.ends_with('\'') && v.len() >= 2)
            {
                v[1..v.len() - 1].to_string()
            } else {
                // Unquoted values stop at an inline comment.
                v.split('#').next().unwrap_or_default().trim_end().to_string()
            }
        };

        if std::env::var_os(key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }

    Ok(())
}

fn configure_env(cli_env_file: Option<&Path>) -> Result<Option<PathBuf>, String> {
    if let Some(path) = cli_env_file {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        load_env_file(path)?;
        return Ok(Some(path.to_path_buf()));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if default_path.is_file() {
        load_env_file(&default_path)?;
        Ok(Some(default_path))
    } else {
        Ok(None)
    }
}

fn run(command: Command) -> Result<(), String> {
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (data_dir={}, source_url={}, fetch_timeout={}s, listen_addr={})",
        cfg.data_dir.display(),
        cfg.source_url,
        cfg.fetch_timeout.as_secs(),
        cfg.listen_addr
    );

    match command {
        Command::Ingest { date } => cmd_ingest(&cfg, date),
        Command::Serve => cmd_serve(&cfg),
        Command::Qr => cmd_qr(&cfg),
    }
}

fn cmd_ingest(cfg: &Config, date: Option<NaiveDate>) -> Result<(), String> {
    let record =
        services::ingest::run(cfg, date).map_err(|e| format!("ingestion failed: {}", e))?;
    info!(
        "Ingestion complete: {} mm recorded for {}",
        record.rainfall_mm, record.date
    );
    Ok(())
}

fn load_registry(cfg: &Config) -> Result<BuildingRegistry, String> {
    let path = cfg.buildings_path();
    let registry = BuildingRegistry::load(&path)
        .map_err(|e| format!("building registry rejected: {}", e))?;
    info!(
        "Loaded {} building(s) from {}",
        registry.len(),
        path.display()
    );
    Ok(registry)
}

fn cmd_serve(cfg: &Config) -> Result<(), String> {
    // Refuse to serve a dashboard over invalid reference data.
    let registry = load_registry(cfg)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("tokio runtime failed to start: {}", e))?;
    runtime.block_on(server::serve(cfg, registry))
}

fn cmd_qr(cfg: &Config) -> Result<(), String> {
    let registry = load_registry(cfg)?;

    fs::create_dir_all(&cfg.qr_output_dir)
        .map_err(|e| format!("creating {} failed: {}", cfg.qr_output_dir.display(), e))?;

    for building in registry.buildings() {
        let access_token = token::token_for(&building.id);
        let url = token::dashboard_url(&cfg.dashboard_base_url, &access_token);
        let png = token::encode_link(&url)
            .map_err(|e| format!("QR for building {} failed: {}", building.id, e))?;

        let path = cfg.qr_output_dir.join(format!("{}.png", building.id));
        fs::write(&path, png).map_err(|e| format!("writing {} failed: {}", path.display(), e))?;
        info!("Wrote {} -> {}", path.display(), url);
    }

    info!("QR codes generated for {} building(s)", registry.len());
    Ok(())
}

fn main() {
    let cli = match parse_cli() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(2);
        }
    };

    let loaded_env = match configure_env(cli.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(path) = loaded_env.as_ref() {
        info!("Environment loaded from .env file: {}", path.display());
    }

    info!(
        "rainharvest {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
