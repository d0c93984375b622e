//! Command-line interface definition.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::marble::Verb;

/// Top-level CLI entry point.
#[derive(Parser, Debug)]
#[command(
    name = "realitymarble",
    about = "Collect configuration files into a reality marble and project them back as symlinks",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Options accepted by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Path to the reality marble
    #[arg(
        short = 'r',
        long = "reality-marble",
        env = "REALITY_MARBLE",
        default_value = "~/customizations",
        global = true
    )]
    pub reality_marble: PathBuf,

    /// Show debug output and dump the loaded configuration
    #[arg(short, long, global = true)]
    pub debug: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Move files into the reality marble and replace them with symlinks
    Collect(FilesOpts),
    /// Turn managed symlinks back into files and remove them from the marble
    Drop(FilesOpts),
    /// Link files from the reality marble into place
    Project(FilesOpts),
    /// Replace managed symlinks with copies, keeping the marble intact
    Materialize(FilesOpts),
    /// Create new files in the reality marble, edit them and link them
    Touch(FilesOpts),
    /// Print a shell completion script
    Completions(CompletionsOpts),
    /// Perform one filesystem change with the current privileges (used by sudo retries)
    #[command(hide = true)]
    RunElevated(RunElevatedOpts),
}

impl Command {
    /// The marble verb for this subcommand, if it is one.
    #[must_use]
    pub const fn verb(&self) -> Option<(Verb, &FilesOpts)> {
        match self {
            Self::Collect(opts) => Some((Verb::Collect, opts)),
            Self::Drop(opts) => Some((Verb::Drop, opts)),
            Self::Project(opts) => Some((Verb::Project, opts)),
            Self::Materialize(opts) => Some((Verb::Materialize, opts)),
            Self::Touch(opts) => Some((Verb::Touch, opts)),
            Self::Completions(_) | Self::RunElevated(_) => None,
        }
    }
}

/// Paths for a marble verb.
#[derive(Args, Debug, Clone)]
pub struct FilesOpts {
    /// Files to operate on
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Options for the `completions` subcommand.
#[derive(Args, Debug, Clone)]
pub struct CompletionsOpts {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

/// Options for the hidden `run-elevated` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RunElevatedOpts {
    /// Function identifier of the mutation
    pub function: String,
    /// Mutation arguments as JSON
    pub args: String,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_collect_files() {
        let cli = Cli::parse_from(["realitymarble", "collect", "~/.vimrc", "/etc/hosts"]);
        let (verb, opts) = cli.command.verb().unwrap();
        assert_eq!(verb, Verb::Collect);
        assert_eq!(
            opts.files,
            vec![PathBuf::from("~/.vimrc"), PathBuf::from("/etc/hosts")]
        );
    }

    #[test]
    fn every_verb_maps() {
        for (name, verb) in [
            ("collect", Verb::Collect),
            ("drop", Verb::Drop),
            ("project", Verb::Project),
            ("materialize", Verb::Materialize),
            ("touch", Verb::Touch),
        ] {
            let cli = Cli::parse_from(["realitymarble", name, "f"]);
            assert_eq!(cli.command.verb().map(|(v, _)| v), Some(verb));
            assert_eq!(verb.as_str(), name);
        }
    }

    #[test]
    fn verb_requires_files() {
        assert!(Cli::try_parse_from(["realitymarble", "drop"]).is_err());
    }

    #[test]
    fn marble_flag_short_and_long() {
        let cli = Cli::parse_from(["realitymarble", "-r", "/tmp/m", "project", "f"]);
        assert_eq!(cli.global.reality_marble, PathBuf::from("/tmp/m"));
        let cli = Cli::parse_from(["realitymarble", "project", "--reality-marble", "/x", "f"]);
        assert_eq!(cli.global.reality_marble, PathBuf::from("/x"));
    }

    #[test]
    fn parse_debug() {
        let cli = Cli::parse_from(["realitymarble", "-d", "touch", "f"]);
        assert!(cli.global.debug);
    }

    #[test]
    fn parse_completions() {
        let cli = Cli::parse_from(["realitymarble", "completions", "bash"]);
        let Command::Completions(opts) = cli.command else {
            panic!("expected completions");
        };
        assert_eq!(opts.shell, clap_complete::Shell::Bash);
    }

    #[test]
    fn parse_run_elevated() {
        let cli = Cli::parse_from([
            "realitymarble",
            "run-elevated",
            "unlink",
            r#"{"path":"/etc/x","force":true}"#,
        ]);
        let Command::RunElevated(opts) = cli.command else {
            panic!("expected run-elevated");
        };
        assert_eq!(opts.function, "unlink");
        assert!(opts.args.contains("force"));
    }

    #[test]
    fn run_elevated_is_hidden() {
        let help = Cli::command().render_help().to_string();
        assert!(!help.contains("run-elevated"));
        assert!(help.contains("collect"));
    }
}
