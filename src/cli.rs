use anyhow::{Context, Result, bail};
use clap::{Args, Parser, ValueEnum};
use regex::Regex;

use crate::{
    fixer::FixOptions,
    github::parse_pr_url,
    transform::{FileRule, LineRule},
    types::RepositoryRef,
    workflow::{DEFAULT_WORKERS, MAX_WORKERS, RunOptions},
};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

/// What a run operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Organization(String),
    PullRequest {
        repository: RepositoryRef,
        number: u64,
    },
}

impl Target {
    /// Accepts an organization name, an organization URL or a pull request URL.
    pub fn parse(target: &str) -> Result<Self> {
        let target = target.trim_end_matches('/');

        if target.contains("/pull/") || target.contains("/pulls/") {
            let (repository, number) = parse_pr_url(target)?;
            return Ok(Target::PullRequest { repository, number });
        }

        if let Some((_, path)) = target.split_once("github.com/") {
            let organization = path.split('/').next().unwrap_or_default();
            if organization.is_empty() {
                bail!("No organization in URL: '{}'", target);
            }
            return Ok(Target::Organization(organization.to_string()));
        }

        if target.is_empty() {
            bail!("Target must not be empty");
        }
        Ok(Target::Organization(target.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// A fully validated invocation.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub target: Target,
    pub token: Option<String>,
    pub options: RunOptions,
    pub log_level: LogLevel,
}

impl RunSpec {
    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn log_filter(&self, verbosity: Verbosity) -> &'static str {
        match verbosity {
            Verbosity::Quiet => "error",
            Verbosity::Verbose => "debug",
            Verbosity::Normal => self.log_level.as_filter(),
        }
    }
}

#[derive(Args, Default, Debug)]
struct FileArgs {
    /// Regex selecting the pull request files to rewrite
    #[arg(long, help_heading = "File fixes", value_name = "REGEX")]
    pub file_pattern: Option<String>,

    /// Regex matched against each line of the selected files
    #[arg(long, help_heading = "File fixes", value_name = "REGEX")]
    pub search: Option<String>,

    /// Replacement for --search matches (supports $1 style groups)
    #[arg(long, help_heading = "File fixes", value_name = "TEXT")]
    pub replace: Option<String>,

    /// Remove lines matching --search instead of replacing
    #[arg(long, help_heading = "File fixes")]
    pub remove_lines: bool,

    /// Only remove lines after a line matching this regex
    #[arg(long, help_heading = "File fixes", value_name = "REGEX")]
    pub context_start: Option<String>,

    /// Stop removing lines at a line matching this regex
    #[arg(long, help_heading = "File fixes", value_name = "REGEX")]
    pub context_end: Option<String>,
}

#[derive(Parser, Default, Debug)]
#[command(
    name = "pull-request-fixer",
    about = "Find blocked pull requests across a GitHub organization and fix their metadata and files"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
struct CliArgs {
    /// Organization name, organization URL or pull request URL
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// GitHub token (defaults to GITHUB_TOKEN, GH_TOKEN, then 'gh auth token')
    #[arg(short = 't', long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Set the PR title to the first commit's subject
    #[arg(long)]
    pub fix_title: bool,

    /// Set the PR body to the first commit's body, without trailers
    #[arg(long)]
    pub fix_body: bool,

    /// Include draft pull requests in the scan
    #[arg(long)]
    pub include_drafts: bool,

    /// Report what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Parallel workers for scanning and fixing
    #[arg(
        short = 'j',
        long,
        default_value_t = DEFAULT_WORKERS,
        value_parser = parse_workers,
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Enable debug logging
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors and suppress the report
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Log level used when neither --verbose nor --quiet is given
    #[arg(long, value_enum, default_value_t = LogLevel::Info, value_name = "LEVEL")]
    pub log_level: LogLevel,

    #[command(flatten)]
    pub files: FileArgs,
}

fn parse_workers(value: &str) -> std::result::Result<usize, String> {
    let workers: usize = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if !(1..=MAX_WORKERS).contains(&workers) {
        return Err(format!("must be between 1 and {MAX_WORKERS}"));
    }
    Ok(workers)
}

fn compile(flag: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("Invalid regex for {flag}: '{pattern}'"))
}

impl CliArgs {
    pub fn validate(&self) -> Result<()> {
        let files = &self.files;

        if !self.fix_title && !self.fix_body && files.file_pattern.is_none() {
            bail!("Nothing to do: specify --fix-title, --fix-body or --file-pattern");
        }

        if files.file_pattern.is_some() {
            if files.search.is_none() {
                bail!("--file-pattern requires --search");
            }
            if !files.remove_lines && files.replace.is_none() {
                bail!("--file-pattern requires --replace unless --remove-lines is given");
            }
        } else if files.search.is_some() || files.replace.is_some() || files.remove_lines {
            bail!("--search, --replace and --remove-lines require --file-pattern");
        }

        if !files.remove_lines && (files.context_start.is_some() || files.context_end.is_some()) {
            bail!("--context-start and --context-end require --remove-lines");
        }

        Ok(())
    }

    fn file_rule(&self) -> Result<Option<FileRule>> {
        let files = &self.files;
        let (Some(file_pattern), Some(search)) = (&files.file_pattern, &files.search) else {
            return Ok(None);
        };

        let file_pattern = compile("--file-pattern", file_pattern)?;
        let search = compile("--search", search)?;
        let rule = if files.remove_lines {
            LineRule::RemoveLines {
                pattern: search,
                context_start: files
                    .context_start
                    .as_deref()
                    .map(|p| compile("--context-start", p))
                    .transpose()?,
                context_end: files
                    .context_end
                    .as_deref()
                    .map(|p| compile("--context-end", p))
                    .transpose()?,
            }
        } else {
            LineRule::Replace {
                search,
                replacement: files.replace.clone().unwrap_or_default(),
            }
        };

        Ok(Some(FileRule { file_pattern, rule }))
    }

    fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }
}

fn build_run_spec(cli: CliArgs) -> Result<(RunSpec, Verbosity)> {
    cli.validate()?;

    let target = Target::parse(&cli.target)?;
    let file_rule = cli.file_rule()?;
    let verbosity = cli.verbosity();

    let options = RunOptions {
        fix: FixOptions {
            fix_title: cli.fix_title,
            fix_body: cli.fix_body,
            dry_run: cli.dry_run,
            file_rule,
        },
        include_drafts: cli.include_drafts,
        workers: cli.workers,
    };

    Ok((
        RunSpec {
            target,
            token: cli.token,
            options,
            log_level: cli.log_level,
        },
        verbosity,
    ))
}

pub fn parse_args<I, T>(args: I) -> Result<(RunSpec, Verbosity)>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;
    build_run_spec(cli)
}
