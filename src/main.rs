use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use netgrade::config::{
    DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_CONVERGENCE_TIMEOUT_SECS, DEFAULT_REROUTE_TIMEOUT_SECS,
    DEFAULT_RUN_TIMEOUT_SECS,
};
use netgrade::harness::EXIT_INFRASTRUCTURE;
use netgrade::live::OUTPUT_TARGET;
use netgrade::report::{self, GradeReport};
use netgrade::{Assignment, Fixtures, GraderConfig, RunGuard, harness};
use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "netgrade",
    author,
    version,
    disable_version_flag = true,
    about = "Grade an emulated multi-AS RIP/BGP network",
    override_usage = "netgrade [OPTIONS] ID"
)]
struct Cli {
    /// Print the version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    print_version: bool,

    /// Assignment directory name under --root
    #[arg(required_unless_present_any = ["print_version", "dump_fixtures"])]
    id: Option<String>,

    /// Log the output of every command run inside a node
    #[arg(long = "show-output")]
    show_output: bool,
    /// Directory holding one sub-directory per assignment
    #[arg(long = "root", default_value = ".")]
    root: PathBuf,
    /// Expectation fixtures (JSON); the built-in table is used otherwise
    #[arg(long = "fixtures")]
    fixtures: Option<PathBuf>,
    /// Write a JSON grade report to this file
    #[arg(long = "report")]
    report: Option<PathBuf>,
    /// Print the effective fixtures as JSON and exit
    #[arg(long = "dump-fixtures")]
    dump_fixtures: bool,

    /// Seconds to wait for routing tables to settle
    #[arg(long = "convergence-timeout", default_value_t = DEFAULT_CONVERGENCE_TIMEOUT_SECS)]
    convergence_timeout: u64,
    /// Seconds to wait for a reroute after a link changes state
    #[arg(long = "reroute-timeout", default_value_t = DEFAULT_REROUTE_TIMEOUT_SECS)]
    reroute_timeout: u64,
    /// Seconds before a single command inside a node is killed
    #[arg(long = "command-timeout", default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS)]
    command_timeout: u64,
    /// Seconds before the whole run is abandoned
    #[arg(long = "run-timeout", default_value_t = DEFAULT_RUN_TIMEOUT_SECS)]
    run_timeout: u64,
    /// Prefix for namespace names (lets concurrent runs coexist)
    #[arg(long = "ns-prefix")]
    ns_prefix: Option<String>,
}

fn init_tracing(show_output: bool) {
    let default = if show_output {
        format!("info,{OUTPUT_TARGET}=debug")
    } else {
        format!("info,{OUTPUT_TARGET}=off")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_fixtures(path: Option<&PathBuf>) -> Result<Fixtures> {
    match path {
        Some(p) => Fixtures::load(p),
        None => Ok(Fixtures::assignment_two()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(args.show_output);

    if args.print_version {
        let version = env!("CARGO_PKG_VERSION");
        let git_hash = env!("GIT_HASH");
        let git_branch = env!("GIT_BRANCH");
        let git_dirty = env!("GIT_DIRTY");

        println!(
            "{} ({}@{}{}) [{}]",
            version,
            git_branch,
            git_hash,
            git_dirty,
            env!("CARGO_PKG_NAME")
        );
        return ExitCode::SUCCESS;
    }

    match grade(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_INFRASTRUCTURE)
        }
    }
}

async fn grade(args: Cli) -> Result<u8> {
    let fixtures = load_fixtures(args.fixtures.as_ref())?;
    if args.dump_fixtures {
        println!("{}", serde_json::to_string_pretty(&fixtures)?);
        return Ok(0);
    }

    let id = args.id.context("missing assignment id")?;
    let assignment = Assignment::new(&id, &args.root)?;
    let config = GraderConfig::from_cli(
        args.convergence_timeout,
        args.reroute_timeout,
        args.command_timeout,
        args.run_timeout,
        args.ns_prefix,
    );
    let guard = RunGuard::new(config.run_timeout);

    // Ctrl-C only trips the guard; the grading thread notices between
    // commands and tears the network down itself.
    let interrupt = guard.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current command");
            interrupt.cancel();
        }
    });

    info!("({id}) GRADING");
    let worker_id = id.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let _span = info_span!("grade", id = %worker_id).entered();
        harness::run(&assignment, &fixtures, &config, &guard)
    })
    .await
    .context("grading thread panicked")??;

    report::log_summary(&id, &outcome);
    if let Some(path) = &args.report {
        GradeReport::new(&id, &outcome).write(path)?;
        info!(path = %path.display(), "report written");
    }
    Ok(outcome.grade.exit_code())
}
