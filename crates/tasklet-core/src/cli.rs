use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::ViewFilter;
use crate::task::Priority;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasklet",
    version,
    about = "Tasklet: a small personal to-do list",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task
    Add(AddArgs),
    /// Show tasks and the summary counters
    List(ViewArgs),
    /// Toggle a task between pending and completed
    #[command(alias = "toggle")]
    Done { id: u64 },
    /// Remove a task
    Delete {
        id: u64,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
    /// Run a control action as emitted in rendered markup, e.g. `toggle:17`
    Action {
        action: String,
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
    /// Check once for tasks due tomorrow
    Remind,
    /// Check for due-tomorrow tasks on an interval
    Watch {
        /// Seconds between checks; defaults to `reminder.interval`
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many checks
        #[arg(long)]
        count: Option<u64>,
    },
    /// Write the list markup
    Render {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Print total, pending and completed counts
    Stats,
    /// Print the collection as JSON
    Export,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(short = 'c', long)]
    pub category: Option<String>,

    #[arg(short = 'p', long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()))]
    pub priority: Option<Priority>,

    /// YYYY-MM-DD, today or tomorrow
    #[arg(long)]
    pub date: Option<String>,

    /// HH:MM
    #[arg(long)]
    pub time: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    #[arg(
        short = 'f',
        long = "filter",
        default_value = "all",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<ViewFilter>())
    )]
    pub filter: ViewFilter,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` tokens out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<OsString> {
        raw.iter().map(OsString::from).collect()
    }

    #[test]
    fn extracts_positional_rc_overrides() {
        let pre = preprocess_args(&args(&["tasklet", "rc.profile=simple", "list", "rc.color:off"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["tasklet", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.profile".to_string(), "simple".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn parses_add_with_options() {
        let cli = GlobalCli::parse_from(args(&[
            "tasklet", "add", "Read", "chapter", "3", "-p", "high", "--date", "tomorrow",
        ]));
        let Some(Command::Add(add)) = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(add.title.join(" "), "Read chapter 3");
        assert_eq!(add.priority, Some(Priority::High));
        assert_eq!(add.date.as_deref(), Some("tomorrow"));
    }

    #[test]
    fn parses_list_filter_and_rc_flag() {
        let cli = GlobalCli::parse_from(args(&[
            "tasklet", "--rc", "color=off", "list", "--filter", "completed",
        ]));
        assert_eq!(cli.rc_overrides.len(), 1);
        assert_eq!(cli.rc_overrides[0].key, "color");
        let Some(Command::List(view)) = cli.command else {
            panic!("expected list command");
        };
        assert_eq!(view.filter, ViewFilter::Completed);
    }

    #[test]
    fn rejects_unknown_filter() {
        let parsed =
            GlobalCli::try_parse_from(args(&["tasklet", "list", "--filter", "overdue"]));
        assert!(parsed.is_err());
    }
}
