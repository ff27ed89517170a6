//! fwcheck - host firewall policy analyzer
//!
//! Answers "would the firewall allow this connection?" against a captured
//! policy snapshot, and explains which rules decided it.
//!
//! # Usage
//!
//! ```bash
//! fwcheck --snapshot policy.json analyze --protocol UDP --host 192.168.1.50 --port 21412
//! fwcheck analyze -p TCP --host 10.0.0.9 --local-port 28960 --json   # inbound
//! fwcheck rules --all                     # Every rule in the snapshot
//! fwcheck rules -p UDP --host 10.0.0.9    # Rules relevant to one attempt
//! fwcheck status                          # Firewall state, profiles, defaults
//! fwcheck config --init                   # Write the default config
//! fwcheck history -n 5                    # Recent recorded verdicts
//! ```
//!
//! `analyze` exits 0 when the connection is allowed, 1 when it is blocked and
//! 2 when the policy could not be evaluated.

use clap::{Parser, Subcommand};
use fwcheck::audit::AnalysisLog;
use fwcheck::config::{self, AppConfig};
use fwcheck::core::error::{Error, SourceErrorPattern};
use fwcheck::core::failsafe::Query;
use fwcheck::core::rule::Direction;
use fwcheck::core::snapshot::SnapshotSource;
use fwcheck::{ConnectionAttempt, FirewallAnalysisResult, FirewallAnalyzer};
use std::path::PathBuf;
use std::process::ExitCode;
use strum::IntoEnumIterator;

shadow_rs::shadow!(build);

const EXIT_BLOCKED: u8 = 1;
const EXIT_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "fwcheck")]
#[command(about = "Would the host firewall allow this connection?", long_about = None)]
#[command(version, long_version = build::CLAP_LONG_VERSION)]
struct Cli {
    /// Policy snapshot to analyse (overrides FWCHECK_SNAPSHOT and the config)
    #[arg(short, long, global = true, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Log per-rule filtering decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one connection attempt
    Analyze {
        /// TCP, UDP, or anything else for any protocol
        #[arg(short, long, default_value = "TCP")]
        protocol: String,
        /// Remote host (IP literal or name)
        #[arg(long)]
        host: String,
        /// Remote port; `*` for any
        #[arg(long, default_value = "*")]
        port: String,
        /// Local listening port; analyses an inbound connection when given
        #[arg(short, long, value_name = "PORT")]
        local_port: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List rules, either all of them or those relevant to an attempt
    Rules {
        /// List every rule in the snapshot
        #[arg(long, conflicts_with_all = ["host", "local_port"])]
        all: bool,
        #[arg(short, long, default_value = "TCP")]
        protocol: String,
        #[arg(long, required_unless_present = "all")]
        host: Option<String>,
        #[arg(long, default_value = "*")]
        port: String,
        #[arg(short, long, value_name = "PORT")]
        local_port: Option<String>,
    },
    /// Show firewall state, active profiles and default actions
    Status,
    /// Print the configuration
    Config {
        /// Write the current (or default) configuration to disk
        #[arg(long)]
        init: bool,
    },
    /// Show recently recorded verdicts
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
}

fn main() -> ExitCode {
    let _ = fwcheck::utils::ensure_dirs();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let app_config = config::load_config();
    match run(cli, &app_config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Error::Source(source) = &e {
                print_hints(&source.to_string());
            }
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let log_file = fwcheck::utils::get_state_dir()
        .and_then(|dir| std::fs::File::create(dir.join("fwcheck.log")).ok());
    match log_file {
        Some(file) => tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(file)
            .init(),
        None => tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn print_hints(message: &str) {
    let translation = SourceErrorPattern::match_error(message);
    eprintln!("{}", translation.user_message);
    for suggestion in &translation.suggestions {
        eprintln!("  - {suggestion}");
    }
}

fn analyzer(
    cli_snapshot: Option<PathBuf>,
    app_config: &AppConfig,
) -> Result<FirewallAnalyzer<SnapshotSource>, Error> {
    let path = app_config
        .resolve_snapshot(cli_snapshot.as_deref())
        .ok_or_else(|| {
            Error::Config(format!(
                "no policy snapshot: pass --snapshot, set {} or snapshot_path in {}",
                config::SNAPSHOT_ENV,
                config::config_path()
                    .map_or_else(|| "the config".to_string(), |p| p.display().to_string())
            ))
        })?;
    tracing::debug!("Using policy snapshot {}", path.display());
    Ok(FirewallAnalyzer::with_config(
        SnapshotSource::from_path(path),
        app_config.engine,
    ))
}

fn attempt(
    protocol: String,
    host: String,
    port: String,
    local_port: Option<String>,
) -> ConnectionAttempt {
    ConnectionAttempt {
        protocol,
        remote_host: host,
        remote_port: port,
        local_port,
    }
}

fn run(cli: Cli, app_config: &AppConfig) -> Result<ExitCode, Error> {
    match cli.command {
        Commands::Analyze {
            protocol,
            host,
            port,
            local_port,
            json,
        } => {
            let analyzer = analyzer(cli.snapshot, app_config)?;
            let result = analyzer.analyze(&attempt(protocol, host, port, local_port));

            if app_config.enable_analysis_log {
                fwcheck::audit::record(&result);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
            if let Some(message) = &result.error {
                print_hints(message);
            }

            Ok(if result.is_failure() {
                ExitCode::from(EXIT_FAILED)
            } else if result.is_allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_BLOCKED)
            })
        }
        Commands::Rules {
            all,
            protocol,
            host,
            port,
            local_port,
        } => {
            let analyzer = analyzer(cli.snapshot, app_config)?;
            if all {
                let rules = analyzer.engine().all_rules()?;
                println!("{} rule(s):", rules.len());
                for rule in &rules {
                    println!("  {rule}");
                }
                return Ok(ExitCode::SUCCESS);
            }

            let host = host.unwrap_or_default();
            let result = analyzer.analyze(&attempt(protocol, host, port, local_port));
            if let Some(message) = &result.error {
                eprintln!("Error: {message}");
                print_hints(message);
                return Ok(ExitCode::from(EXIT_FAILED));
            }
            println!(
                "{} relevant rule(s) for {} {} (profile {}):",
                result.relevant_rules.len(),
                result.direction,
                result.protocol,
                result.profile_name
            );
            print_rules(&result);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            let analyzer = analyzer(cli.snapshot, app_config)?;
            let engine = analyzer.engine();
            let profiles = engine.current_profiles();

            println!(
                "Firewall:        {}",
                if engine.firewall_state() { "enabled" } else { "disabled" }
            );
            println!("Active profiles: {profiles}");
            for profile in profiles.profiles() {
                let mask = profile.mask();
                println!(
                    "  {:<8} inbound {:<5} outbound {}",
                    profile.as_str(),
                    allow_or_block(engine.default_action(Direction::Inbound, mask)),
                    allow_or_block(engine.default_action(Direction::Outbound, mask)),
                );
            }
            match engine.all_rules() {
                Ok(rules) => println!(
                    "Rules:           {} ({} enabled)",
                    rules.len(),
                    rules.iter().filter(|r| r.enabled).count()
                ),
                Err(e) => println!("Rules:           unavailable ({e})"),
            }

            println!("Fail-safe defaults:");
            let fail_safe = engine.config().fail_safe;
            for query in Query::iter() {
                println!("  {:<18} {}", query.to_string(), fail_safe.describe(query));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { init } => {
            if init {
                config::save_config(app_config)?;
                if let Some(path) = config::config_path() {
                    println!("Wrote {}", path.display());
                }
            }
            println!("{}", serde_json::to_string_pretty(app_config)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::History { count } => {
            let log = AnalysisLog::new()?;
            let events = match log.read_recent(count) {
                Ok(events) => events,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    println!("No analyses recorded in {}", log.path().display());
                    if !app_config.enable_analysis_log {
                        println!("Set \"enable_analysis_log\": true in the config to record them.");
                    }
                    return Ok(ExitCode::SUCCESS);
                }
                Err(e) => return Err(e.into()),
            };

            for event in &events {
                println!(
                    "{} {} {} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    if event.allowed { "ALLOWED" } else { "BLOCKED" },
                    event.details,
                    event.error.as_deref().unwrap_or_default()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn allow_or_block(allowed: bool) -> &'static str {
    if allowed { "Allow" } else { "Block" }
}

fn print_result(result: &FirewallAnalysisResult) {
    let verdict = if result.is_allowed { "ALLOWED" } else { "BLOCKED" };
    match &result.deciding_rule {
        Some(rule) => println!("Verdict:    {verdict} ({}: {rule})", result.reason),
        None => println!("Verdict:    {verdict} ({})", result.reason),
    }
    if let Some(error) = &result.error {
        println!("Error:      {error}");
        return;
    }

    println!("Connection: {} {}", result.direction, result.protocol);
    println!(
        "Firewall:   {}",
        if result.firewall_enabled { "enabled" } else { "disabled" }
    );
    println!(
        "Interface:  {} (profile {})",
        result.interface_index, result.profile_name
    );
    println!(
        "Defaults:   inbound {}, outbound {}",
        allow_or_block(result.default_inbound_allowed),
        allow_or_block(result.default_outbound_allowed)
    );
    println!("Relevant rules ({}):", result.relevant_rules.len());
    print_rules(result);
    if !result.self_rules.is_empty() {
        println!("Rules for this executable: {}", result.self_rules.join(", "));
    }
    println!("Analysis:   {}", result.analysis_id);
}

fn print_rules(result: &FirewallAnalysisResult) {
    for rule in &result.relevant_rules {
        let marker = if result.deciding_rule.as_deref() == Some(rule.name.as_str()) {
            '*'
        } else {
            ' '
        };
        println!("  {marker} {rule}");
    }
}
