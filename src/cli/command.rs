//! Command-line interface definitions.
//!
//! Defines the CLI structure for muster using `clap`: cluster lifecycle
//! subcommands plus global verbosity flags.

use clap::{Parser, Subcommand};

/// Provision and operate short-lived dask/notebook compute clusters
#[derive(Parser, Debug)]
#[command(name = "muster")]
#[command(version)]
#[command(about = "Provision and operate short-lived compute clusters")]
pub struct Cli {
    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the muster CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show what a profile would provision, without side effects
    Plan(ProfileArgs),

    /// Provision a cluster from a profile
    Create(ProfileArgs),

    /// List persisted clusters
    List,

    /// Show a cluster's recorded state
    Show(ShowArgs),

    /// Launch cluster software on the provisioned hosts
    Start(NameArg),

    /// Stop cluster daemon sessions
    Stop(NameArg),

    /// Terminate all instances and delete the record
    Destroy(DestroyArgs),

    /// Open the recorded dashboard URL in a browser
    OpenDashboard(NameArg),

    /// Open the recorded notebook URL in a browser
    OpenNotebook(NameArg),
}

/// Arguments for commands that resolve a profile.
#[derive(Parser, Debug)]
pub struct ProfileArgs {
    /// Profile name under the profiles directory, or a path to a profile
    /// document
    pub profile: String,

    /// Cluster name (defaults to the profile file stem, lowercased)
    #[arg(long)]
    pub name: Option<String>,

    /// Profile override as `dotted.path=value` (repeatable)
    #[arg(short = 'P', long = "param", value_name = "PATH=VALUE")]
    pub params: Vec<String>,
}

/// Arguments for commands addressing one cluster by name.
#[derive(Parser, Debug)]
pub struct NameArg {
    /// Cluster name
    pub name: String,
}

/// Arguments for the `show` subcommand.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Cluster name
    pub name: String,

    /// Dump the persisted record verbatim
    #[arg(long)]
    pub detail: bool,
}

/// Arguments for the `destroy` subcommand.
#[derive(Parser, Debug)]
pub struct DestroyArgs {
    /// Cluster name
    pub name: String,

    /// Skip the dirty-repository confirmation
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_factory_builds() {
        // Verifies that the CLI definition is valid
        let _ = Cli::command();
    }

    #[test]
    fn test_cli_has_version() {
        let cmd = Cli::command();
        assert!(cmd.get_version().is_some());
    }

    #[test]
    fn test_cli_name() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "muster");
    }

    #[test]
    fn test_parse_create_with_overrides() {
        let cli = Cli::try_parse_from([
            "muster",
            "create",
            "analytics",
            "--name",
            "demo",
            "-P",
            "dask.worker.count=4",
            "-P",
            "instance.size=m5.large",
        ])
        .unwrap();
        match cli.command {
            Commands::Create(args) => {
                assert_eq!(args.profile, "analytics");
                assert_eq!(args.name.as_deref(), Some("demo"));
                assert_eq!(
                    args.params,
                    vec!["dask.worker.count=4", "instance.size=m5.large"]
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_plan_defaults() {
        let cli = Cli::try_parse_from(["muster", "plan", "analytics"]).unwrap();
        match cli.command {
            Commands::Plan(args) => {
                assert!(args.name.is_none());
                assert!(args.params.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_show_detail() {
        let cli = Cli::try_parse_from(["muster", "show", "demo", "--detail"]).unwrap();
        match cli.command {
            Commands::Show(args) => {
                assert_eq!(args.name, "demo");
                assert!(args.detail);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_destroy_force() {
        let cli = Cli::try_parse_from(["muster", "destroy", "demo", "--force"]).unwrap();
        match cli.command {
            Commands::Destroy(args) => {
                assert_eq!(args.name, "demo");
                assert!(args.force);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_quiet_and_verbose_flags() {
        let cli = Cli::try_parse_from(["muster", "-q", "list"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::try_parse_from(["muster", "-vv", "list"]).unwrap();
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_open_commands_take_a_name() {
        let cli = Cli::try_parse_from(["muster", "open-dashboard", "demo"]).unwrap();
        assert!(matches!(cli.command, Commands::OpenDashboard(_)));

        let cli = Cli::try_parse_from(["muster", "open-notebook", "demo"]).unwrap();
        assert!(matches!(cli.command, Commands::OpenNotebook(_)));
    }
}
