//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use refinery_core::{ProgressReporter, ServiceContext, ServiceKind, ServiceReport, run_service};
use refinery_crawler::{Fetcher, get_valid_url};
use refinery_shared::deployment::{self, FunctionDeployment};
use refinery_shared::{AppConfig, config_file_path, init_config, load_config, load_config_from};
use refinery_storage::event_from_message;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Refinery: enrich company, person and domain records.
#[derive(Parser)]
#[command(
    name = "refinery",
    version,
    about = "Run the Refinery enrichment services.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.refinery/refinery.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one service on a pub/sub event.
    Run {
        /// Service name: the_refinery, clearbit, crawler, mobile_friendly,
        /// wordpress_plugin_lookup or email_provider_lookup.
        service: String,

        /// Event JSON file (`{"data": "<base64>"}`). Reads stdin when absent.
        #[arg(long)]
        event: Option<PathBuf>,

        /// The input is a plain request message rather than an encoded event.
        #[arg(long)]
        message: bool,

        /// Use the local warehouse and object store, and print messages
        /// instead of publishing them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve a domain to a reachable URL.
    ValidateUrl {
        /// Domain or URL to check.
        domain: String,
    },

    /// Print the cloud function deployment descriptors as TOML.
    Deployments,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "refinery=info",
        1 => "refinery=debug",
        _ => "refinery=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            service,
            event,
            message,
            dry_run,
        } => {
            let config = load(config_path.as_deref())?;
            cmd_run(config, &service, event.as_deref(), message, dry_run).await
        }
        Command::ValidateUrl { domain } => {
            let config = load(config_path.as_deref())?;
            cmd_validate_url(&config, &domain).await
        }
        Command::Deployments => {
            let config = load(config_path.as_deref())?;
            cmd_deployments(&config)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn load(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    config: AppConfig,
    service: &str,
    event_path: Option<&Path>,
    message: bool,
    dry_run: bool,
) -> Result<()> {
    let kind: ServiceKind = service.parse()?;

    let raw = match event_path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| eyre!("cannot read event file '{}': {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| eyre!("cannot read event from stdin: {e}"))?;
            buf
        }
    };
    let input: Value =
        serde_json::from_str(&raw).map_err(|e| eyre!("event is not valid JSON: {e}"))?;
    let event = if message {
        event_from_message(&input)
    } else {
        input
    };

    info!(service = %kind, dry_run, "running service");

    let reporter = CliProgress::new();
    let report = if dry_run {
        let (ctx, publisher) = ServiceContext::dry_run(config).await?;
        let report = run_service(kind, &ctx, &event, &reporter).await?;
        print_report(&report);
        for (topic, message) in publisher.messages() {
            println!("  -> {topic}");
            println!("{}", serde_json::to_string_pretty(&message)?);
        }
        report
    } else {
        let ctx = ServiceContext::from_config(config).await?;
        let report = run_service(kind, &ctx, &event, &reporter).await?;
        print_report(&report);
        report
    };

    if !report.row_errors.is_empty() {
        return Err(eyre!("{} row(s) were rejected", report.row_errors.len()));
    }
    Ok(())
}

fn print_report(report: &ServiceReport) {
    println!();
    println!("  Service:   {}", report.service);
    println!("  Rows:      {}", report.rows_inserted);
    println!("  Rejected:  {}", report.row_errors.len());
    for err in &report.row_errors {
        println!("    {}[{}]: {}", err.table, err.index, err.message);
    }
    println!("  Objects:   {}", report.objects_written.len());
    for name in &report.objects_written {
        println!("    {name}");
    }
    println!("  Published: {}", report.messages_published.len());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn rows_inserted(&self, table: &str, inserted: usize, rejected: usize) {
        self.spinner
            .set_message(format!("{table}: {inserted} inserted, {rejected} rejected"));
    }

    fn done(&self, _report: &ServiceReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Other commands
// ---------------------------------------------------------------------------

async fn cmd_validate_url(config: &AppConfig, domain: &str) -> Result<()> {
    let fetcher = Fetcher::new(&config.crawler)?;
    let check = get_valid_url(fetcher.client(), domain).await;
    println!("{check}");
    Ok(())
}

#[derive(Serialize)]
struct DeploymentEntry {
    full_name: String,
    #[serde(flatten)]
    function: FunctionDeployment,
}

#[derive(Serialize)]
struct Deployments {
    project: String,
    functions: Vec<DeploymentEntry>,
}

fn cmd_deployments(config: &AppConfig) -> Result<()> {
    println!("{}", render_deployments(config)?);
    Ok(())
}

fn render_deployments(config: &AppConfig) -> Result<String> {
    let project = config.gcp.project_id.clone();
    let functions = deployment::ALL
        .into_iter()
        .map(|function| DeploymentEntry {
            full_name: function.full_name(&project),
            function,
        })
        .collect();

    let doc = Deployments { project, functions };
    Ok(toml::to_string_pretty(&doc)?)
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    let source = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    println!("# {}", source.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "refinery",
            "-vv",
            "--config",
            "custom.toml",
            "run",
            "crawler",
            "--event",
            "event.json",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref(), Some(Path::new("custom.toml")));
        match cli.command {
            Command::Run {
                service,
                event,
                message,
                dry_run,
            } => {
                assert_eq!(service, "crawler");
                assert_eq!(event.as_deref(), Some(Path::new("event.json")));
                assert!(!message);
                assert!(dry_run);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn deployments_render_as_toml() {
        let mut config = AppConfig::default();
        config.gcp.project_id = "demo".into();
        let text = render_deployments(&config).unwrap();

        assert!(text.contains("project = \"demo\""));
        assert_eq!(text.matches("[[functions]]").count(), deployment::ALL.len());
        assert!(text.contains(&deployment::ALL[0].full_name("demo")));
        assert!(text.contains("name = \"the_refinery_crawler_service\""));
        assert!(text.contains("timeout = \"540s\""));
    }
}
