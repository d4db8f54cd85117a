//! scriptgate CLI
//!
//! Runs, checks and renders scripts against a fixture deployment.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod fixture;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Result, WrapErr};
use fixture::{Deployment, Fixture};
use scriptgate_core::{CancelFlag, Parameters, UserId};
use scriptgate_gateway::{CallerContext, DEFAULT_MAX_DELEGATION_DEPTH};
use scriptgate_runtime::{modules, Availability, Mode, RunnerConfig, ScriptRunner};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scriptgate")]
#[command(about = "scriptgate - sandboxed query scripts with access-checked delegation", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script
    Run {
        /// Path to script file
        #[arg(short, long)]
        file: PathBuf,
        /// Placeholder bindings as a JSON object (secure mode)
        #[arg(short, long)]
        params: Option<String>,
        /// Deployment fixture
        #[arg(long)]
        fixture: Option<PathBuf>,
        /// Runner configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Invoking user id
        #[arg(short, long)]
        user: Option<i64>,
        /// Render placeholders and run in secure mode
        #[arg(long)]
        secure: bool,
    },
    /// Compile a script without running it
    Check {
        /// Path to script file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Show the rendered source and slot table of a script
    Render {
        /// Path to script file
        #[arg(short, long)]
        file: PathBuf,
        /// Placeholder bindings as a JSON object
        #[arg(short, long)]
        params: Option<String>,
    },
    /// List host capabilities and native modules
    Capabilities,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match cli.command {
        Commands::Run {
            file,
            params,
            fixture,
            config,
            user,
            secure,
        } => run(&file, params.as_deref(), fixture.as_deref(), config.as_deref(), user, secure).await,
        Commands::Check { file } => {
            let source = read_script(&file)?;
            let runner = ScriptRunner::new(RunnerConfig::default());
            let compiled = runner.check(&source)?;
            let mode = if compiled.is_secure() { Mode::Secure } else { Mode::Standard };
            println!("{}: ok ({mode} mode)", file.display());
            Ok(())
        }
        Commands::Render { file, params } => {
            let source = read_script(&file)?;
            let parameters = parse_params(params.as_deref())?;
            let rendered = ScriptRunner::new(RunnerConfig::default()).render(&source, &parameters);
            let out = json!({
                "source": rendered.source(),
                "slots": rendered.table(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Commands::Capabilities => {
            let runner = ScriptRunner::new(RunnerConfig::default());
            for capability in runner.registry().available(Mode::Standard) {
                let modes = match capability.availability {
                    Availability::Everywhere => "all",
                    Availability::StandardOnly => "standard",
                };
                println!("{:<26} {:<9} {}", capability.name, modes, capability.summary);
            }
            println!();
            println!("native modules: {}", modules::names().collect::<Vec<_>>().join(", "));
            Ok(())
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scriptgate=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(
    file: &Path,
    params: Option<&str>,
    fixture: Option<&Path>,
    config: Option<&Path>,
    user: Option<i64>,
    secure: bool,
) -> Result<()> {
    let source = read_script(file)?;
    let parameters = parse_params(params)?;
    let config = match config {
        Some(path) => {
            RunnerConfig::from_file(path).wrap_err_with(|| format!("reading config {}", path.display()))?
        }
        None => RunnerConfig::default(),
    };
    let fixture = match fixture {
        Some(path) => Fixture::from_file(path)?,
        None => Fixture::default(),
    };
    let max_depth = config.max_delegation_depth.unwrap_or(DEFAULT_MAX_DELEGATION_DEPTH);
    let Deployment { gateway, scripts } = fixture.build(max_depth)?;
    info!(data_sources = scripts.len(), max_depth, "deployment ready");

    let runner = Arc::new(ScriptRunner::new(config));
    runner.attach_gateway(&gateway);

    let cancel = CancelFlag::new();
    let caller = CallerContext::new(user.map(UserId)).with_cancel(cancel.clone());
    let worker_runner = Arc::clone(&runner);
    let mut worker = tokio::task::spawn_blocking(move || {
        if secure {
            worker_runner.run_secure_script(&source, &parameters, &caller)
        } else {
            worker_runner.run_script(&source, &caller)
        }
    });

    let outcome = tokio::select! {
        joined = &mut worker => joined?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("interrupt received, cancelling script");
            cancel.cancel();
            worker.await?
        }
    };

    match outcome.into_pair() {
        (Some(json), _) => {
            println!("{json}");
            Ok(())
        }
        (None, Some(error)) => bail!(error),
        (None, None) => bail!("script produced neither a result nor an error"),
    }
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("reading script {}", path.display()))
}

fn parse_params(params: Option<&str>) -> Result<Parameters> {
    match params {
        Some(text) => serde_json::from_str(text).wrap_err("--params must be a JSON object"),
        None => Ok(Parameters::new()),
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
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "scriptgate", "run", "--file", "s.py", "--params", "{\"a\": 1}", "--user", "4", "--secure",
        ]);
        match cli.command {
            Commands::Run {
                file,
                params,
                user,
                secure,
                fixture,
                ..
            } => {
                assert_eq!(file, PathBuf::from("s.py"));
                assert_eq!(params.as_deref(), Some("{\"a\": 1}"));
                assert_eq!(user, Some(4));
                assert!(secure);
                assert!(fixture.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_params() {
        let params = parse_params(Some(r#"{"tenant": 3, "name": "x"}"#)).unwrap();
        assert_eq!(params.get("tenant"), Some(&json!(3)));
        assert!(parse_params(None).unwrap().is_empty());
        assert!(parse_params(Some("[1, 2]")).is_err());
    }

    #[tokio::test]
    async fn test_run_with_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("report.py");
        std::fs::write(
            &script,
            "add_result_column(result, 'n', 'N', TYPE_INTEGER)\nadd_result_row(result, {'n': $[[n]]})\n",
        )
        .unwrap();
        let result = run(&script, Some(r#"{"n": 3}"#), None, None, None, true).await;
        assert!(result.is_ok());

        let failing = dir.path().join("fail.py");
        std::fs::write(&failing, "get_query_result(1)\n").unwrap();
        let err = run(&failing, None, None, None, None, false).await.unwrap_err();
        assert!(err.to_string().starts_with("NoCachedResult"));
    }
}
