use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use pageview_info::commands::{self, parse_metric, DEFAULT_TOP_LIMIT};
use pageview_info::config::Config;
use pageview_info::pageviews::{self, Metric, OriginalRequest};

#[derive(Parser, Debug)]
#[command(name = "pvi")]
#[command(about = "Page view statistics for wiki pages, served through a local cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pvi/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Project domain to query, e.g. en.wikipedia.org
  #[arg(short, long)]
  project: Option<String>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  /// Client IP to attribute upstream requests to (sent as X-Forwarded-For)
  #[arg(long)]
  forwarded_for: Option<String>,

  /// User agent of the originating client (sent as X-Original-User-Agent)
  #[arg(long)]
  original_user_agent: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Daily counts for one or more pages
  Page {
    #[arg(required = true)]
    titles: Vec<String>,
    /// Number of days (default: the configured maximum)
    #[arg(long)]
    days: Option<u32>,
    #[arg(long, default_value = "pageviews", value_parser = parse_metric)]
    metric: Metric,
    /// Start at this title (from a previous `continue`)
    #[arg(long = "continue")]
    continue_from: Option<String>,
  },
  /// Daily counts for the whole site
  Site {
    #[arg(long)]
    days: Option<u32>,
    #[arg(long, default_value = "pageviews", value_parser = parse_metric)]
    metric: Metric,
  },
  /// Most viewed pages of the last complete day
  Top {
    #[arg(long, default_value = "pageviews", value_parser = parse_metric)]
    metric: Metric,
    #[arg(long, default_value_t = DEFAULT_TOP_LIMIT)]
    limit: usize,
    #[arg(long, default_value_t = 0)]
    offset: usize,
  },
  /// Views of a page over the last 30 days
  Info { title: String },
  /// Which metrics are available for which data
  Supported,
}

/// Install the global subscriber. The returned guard flushes the log file
/// when dropped, so it must live until exit.
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  match log_file {
    Some(path) => {
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
      };
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
      Ok(None)
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let json =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", json);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging(args.log_file.as_deref())?;

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override project if specified on command line
  if let Some(project) = args.project {
    config.upstream.project = project;
  }

  let original_request = match (args.forwarded_for, args.original_user_agent) {
    (None, None) => None,
    (ip, user_agent) => Some(OriginalRequest { ip, user_agent }),
  };
  let service = pageviews::build_service(&config, original_request)?;
  let max_days = config.cache.max_days;

  match args.command {
    Command::Page {
      titles,
      days,
      metric,
      continue_from,
    } => {
      let days = commands::validate_days(days, max_days)?;
      let output =
        commands::page_views(&service, &titles, days, metric, continue_from.as_deref()).await?;
      print_json(&output)
    }
    Command::Site { days, metric } => {
      let days = commands::validate_days(days, max_days)?;
      print_json(&commands::site_views(&service, days, metric).await?)
    }
    Command::Top {
      metric,
      limit,
      offset,
    } => print_json(&commands::most_viewed(&service, metric, limit, offset).await?),
    Command::Info { title } => match commands::page_info(&service, &title).await? {
      Some(output) => print_json(&output),
      None => Err(eyre!("Page views are not available for this project")),
    },
    Command::Supported => print_json(&commands::supported_metrics(&service)),
  }
}
