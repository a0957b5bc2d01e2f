mod display;

use std::sync::Arc;

use pull_request_fixer::{
    GitHubApi, LogProgress, NoProgress, ProgressTracker, RunSpec, Target, Verbosity, parse_args,
    run_organization, run_pull_request, setup_github_client,
};
use tracing::info;

use display::{display_blocked_prs, display_fix_reports, display_summary};

fn handle_clap_help_version(clap_err: &clap::Error) -> ! {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        _ => {
            eprint!("{clap_err}");
            std::process::exit(2);
        }
    }
}

fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(spec: RunSpec, verbosity: Verbosity) -> anyhow::Result<()> {
    let api: Arc<dyn GitHubApi> = Arc::new(setup_github_client(spec.token.clone())?);
    let mut stdout = std::io::stdout();

    let summary = match &spec.target {
        Target::Organization(organization) => {
            let progress: Arc<dyn ProgressTracker> = match verbosity {
                Verbosity::Quiet => Arc::new(NoProgress),
                _ => Arc::new(LogProgress::new()),
            };
            let summary =
                run_organization(api, organization, &spec.options, progress).await?;
            if verbosity != Verbosity::Quiet {
                display_blocked_prs(&summary.blocked, &mut stdout)?;
            }
            summary
        }
        Target::PullRequest { repository, number } => {
            info!(repository = %repository, number, "Fixing pull request");
            run_pull_request(api, repository.clone(), *number, &spec.options).await?
        }
    };

    if verbosity != Verbosity::Quiet {
        display_fix_reports(&summary.reports, &mut stdout)?;
        display_summary(&summary, &mut stdout)?;
    }

    if summary.errors > 0 {
        anyhow::bail!("{} pull request(s) could not be fixed", summary.errors);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (spec, verbosity) = match parse_args(std::env::args()) {
        Ok(result) => result,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                handle_clap_help_version(clap_err);
            } else {
                return Err(err);
            }
        }
    };

    init_tracing(spec.log_filter(verbosity));
    run(spec, verbosity).await
}
