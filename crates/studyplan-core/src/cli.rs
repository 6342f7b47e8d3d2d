use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::prefs::Theme;
use crate::query::{PriorityFilter, StatusFilter};
use crate::task::TaskId;

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
    name = "studyplan",
    version,
    about = "Study planner: tasks, due dates, progress and reminders",
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
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task.
    Add {
        title: Option<String>,
        #[arg(long, short = 's')]
        subject: Option<String>,
        /// YYYY-MM-DD, today, tomorrow or a weekday name.
        #[arg(long, short = 'd')]
        date: Option<String>,
        /// HH:MM or h:mm am/pm.
        #[arg(long, short = 't')]
        time: Option<String>,
        #[arg(long, short = 'p')]
        priority: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Change fields of an existing task.
    Edit {
        id: TaskId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, short = 's')]
        subject: Option<String>,
        #[arg(long, short = 'd')]
        date: Option<String>,
        #[arg(long, short = 't')]
        time: Option<String>,
        #[arg(long, short = 'p')]
        priority: Option<String>,
        /// Pass an empty string to clear.
        #[arg(long)]
        description: Option<String>,
    },
    /// Toggle a task between pending and completed.
    Done { id: TaskId },
    Delete {
        id: TaskId,
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Delete every completed task.
    ClearCompleted {
        #[arg(long, short = 'y')]
        yes: bool,
    },
    List {
        #[arg(long, value_enum, default_value_t = PriorityFilter::All)]
        priority: PriorityFilter,
        #[arg(long, value_enum, default_value_t = StatusFilter::All)]
        status: StatusFilter,
        /// date, priority or subject; anything else keeps creation order.
        #[arg(long, default_value = "date")]
        sort: String,
    },
    /// All tasks in due order.
    Timeline,
    /// Counts, percent complete and a motivational line.
    Stats {
        /// Seed for the quote pick, for reproducible output.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run one reminder scan now.
    Remind,
    /// Scan for reminders on the configured interval until interrupted.
    Watch {
        /// Stop after this many scans.
        #[arg(long)]
        ticks: Option<usize>,
    },
    Theme {
        #[command(subcommand)]
        action: Option<ThemeAction>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ThemeAction {
    Show,
    Toggle,
    Set {
        #[arg(value_enum)]
        theme: Theme,
    },
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

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = GlobalCli::try_parse_from([
            "studyplan",
            "list",
            "--status",
            "pending",
            "--sort",
            "subject",
            "-vv",
            "--rc",
            "display.color=off",
        ])
        .expect("parse");

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.rc_overrides.len(), 1);
        assert_eq!(cli.rc_overrides[0].key, "display.color");
        match cli.command {
            Some(Command::List { status, sort, .. }) => {
                assert_eq!(status, StatusFilter::Pending);
                assert_eq!(sort, "subject");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_filter_values_are_rejected() {
        assert!(GlobalCli::try_parse_from(["studyplan", "list", "--status", "someday"]).is_err());
        assert!(GlobalCli::try_parse_from(["studyplan", "list", "--priority", "urgent"]).is_err());
    }

    #[test]
    fn parses_add_and_theme() {
        let cli = GlobalCli::try_parse_from([
            "studyplan", "add", "Essay", "-s", "English", "-d", "tomorrow", "-t", "18:00", "-p", "low",
        ])
        .expect("parse add");
        assert!(matches!(cli.command, Some(Command::Add { title: Some(ref t), .. }) if t == "Essay"));

        let cli = GlobalCli::try_parse_from(["studyplan", "theme", "set", "dark"]).expect("parse theme");
        assert!(matches!(
            cli.command,
            Some(Command::Theme {
                action: Some(ThemeAction::Set { theme: Theme::Dark })
            })
        ));
    }

    #[test]
    fn rejects_bad_task_id() {
        assert!(GlobalCli::try_parse_from(["studyplan", "done", "abc"]).is_err());
    }
}
