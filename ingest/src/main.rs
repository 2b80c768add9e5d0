use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError};
use ingest_store::IssueId;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use telemetry::TelemetryError;

mod commands;
mod config;
mod simulate;
mod telemetry;

#[derive(Parser)]
#[command(name = "ingest", about = "Event ingest data layer")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, short, default_value = "ingest.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Create the database schema.
    InitDb,
    /// Create an organization, project, key and issue to play with.
    Seed(SeedArgs),
    /// Authenticate an event for a project.
    Resolve(ResolveArgs),
    /// Append text to an issue's search vector.
    Append(AppendArgs),
    /// Run concurrent appends against one issue and report the result.
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct SeedArgs {
    #[arg(long, default_value = "Acme")]
    organization: String,
    #[arg(long, default_value = "backend")]
    project: String,
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    organization_throttle_rate: u8,
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    project_throttle_rate: u8,
    /// Create the organization with event intake suspended.
    #[arg(long)]
    not_accepting_events: bool,
    #[arg(long, default_value = "Untitled issue")]
    issue_title: String,
}

#[derive(Args)]
struct ResolveArgs {
    #[arg(long)]
    project_id: u64,
    /// The public key. Without it the key is looked up in --query and --auth-header.
    #[arg(long)]
    key: Option<String>,
    /// Request query string, e.g. `sentry_key=...&sentry_version=7`.
    #[arg(long)]
    query: Option<String>,
    /// Value of the `X-Sentry-Auth` header.
    #[arg(long)]
    auth_header: Option<String>,
}

#[derive(Args)]
struct AppendArgs {
    #[arg(long)]
    issue_id: IssueId,
    #[arg(long, conflicts_with = "event", required_unless_present = "event")]
    text: Option<String>,
    /// Event payload (JSON) to extract the search text from.
    #[arg(long)]
    event: Option<PathBuf>,
}

#[derive(Args)]
struct SimulateArgs {
    /// Issue to append to. A fresh project and issue are seeded when omitted.
    #[arg(long)]
    issue_id: Option<IssueId>,
    #[arg(long, default_value_t = 8)]
    workers: usize,
    #[arg(long, default_value_t = 100)]
    events_per_worker: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Store(#[from] ingest_store::StoreError),
    #[error(transparent)]
    Auth(#[from] event_auth::AuthSourceError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("issue {0} does not exist")]
    UnknownIssue(IssueId),
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::from_file(&cli.config)?;
    let _telemetry = telemetry::init(&config.common)?;

    match cli.command {
        CliCommand::InitDb => commands::init_db(&config),
        CliCommand::Seed(args) => {
            let store = commands::open_store(&config)?;
            let seeded = commands::seed(
                &store,
                &commands::SeedOptions {
                    organization: args.organization,
                    project: args.project,
                    organization_throttle_rate: args.organization_throttle_rate,
                    project_throttle_rate: args.project_throttle_rate,
                    accepting_events: !args.not_accepting_events,
                    issue_title: args.issue_title,
                },
            )?;
            print_json(&seeded)
        }
        CliCommand::Resolve(args) => {
            let store = commands::open_store(&config)?;
            let output = commands::resolve(
                store,
                &config,
                &commands::ResolveOptions {
                    project_id: args.project_id,
                    key: args.key,
                    query: args.query,
                    auth_header: args.auth_header,
                },
            )?;
            print_json(&output)
        }
        CliCommand::Append(args) => {
            let store = commands::open_store(&config)?;
            let input = match (&args.text, &args.event) {
                (_, Some(path)) => commands::AppendInput::EventFile(path),
                (Some(text), None) => commands::AppendInput::Text(text),
                (None, None) => commands::AppendInput::Text(""),
            };
            let output = commands::append(&store, &config, args.issue_id, input)?;
            print_json(&output)
        }
        CliCommand::Simulate(args) => {
            let issue_id = match args.issue_id {
                Some(issue_id) => issue_id,
                None => {
                    let store = commands::open_store(&config)?;
                    let options = commands::SeedOptions {
                        organization: "Simulation".into(),
                        project: "simulation".into(),
                        organization_throttle_rate: 0,
                        project_throttle_rate: 0,
                        accepting_events: true,
                        issue_title: "Simulated issue".into(),
                    };
                    commands::seed(&store, &options)?.issue_id
                }
            };

            let runtime = tokio::runtime::Runtime::new()?;
            let report = runtime.block_on(simulate::simulate(
                &config,
                issue_id,
                args.workers,
                args.events_per_worker,
            ))?;
            print_json(&report)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from([
            "ingest", "--config", "x.yaml", "append", "--issue-id", "3", "--text", "hi",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.yaml"));
        let CliCommand::Append(args) = cli.command else {
            panic!("expected append");
        };
        assert_eq!(args.issue_id, 3);
        assert_eq!(args.text.as_deref(), Some("hi"));

        assert!(Cli::try_parse_from(["ingest", "append", "--issue-id", "3"]).is_err());
        assert!(
            Cli::try_parse_from(["ingest", "seed", "--organization-throttle-rate", "101"]).is_err()
        );
    }
}
