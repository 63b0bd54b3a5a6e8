use clap::{Args, Parser, Subcommand};

/// DSA spell runner
///
/// Loads a scenario (registry, modules, accounts and balances) and casts spell batches against it.
#[derive(Parser, PartialEq, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    global_args: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn args(&self) -> GlobalArgs {
        self.global_args.clone()
    }

    pub fn command(&self) -> Command {
        self.command.clone()
    }
}

#[derive(Subcommand, Clone, PartialEq, Debug)]
pub enum Command {
    /// Casts a batch all or nothing and prints the receipt.
    Cast(BatchArgs),
    /// Casts the first spell of a batch that succeeds and prints the receipt.
    CastFirst(BatchArgs),
    /// Lists the module registrations of the scenario.
    Modules,
    /// Prints signature and selector of every spell in a batch without casting it.
    Encode(BatchArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Scenario file describing registry, modules, accounts and initial balances
    #[clap(long, env = "DSA_SCENARIO", default_value = "scenario.yaml")]
    pub scenario: String,

    /// Enable verbose logging. Ignored if RUST_LOG is set.
    #[clap(long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct BatchArgs {
    /// Batch file listing account, sender and spells
    pub batch: String,
}

#[cfg(test)]
mod cli_tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_arg_parsing_cast_cmd() {
        let cli = Cli::try_parse_from(vec![
            "dsa",
            "--scenario",
            "fixtures/scenario.yaml",
            "--verbose",
            "cast",
            "fixtures/batch.yaml",
        ])
        .expect("parse errored");

        let expected = Cli {
            global_args: GlobalArgs {
                scenario: "fixtures/scenario.yaml".to_string(),
                verbose: true,
            },
            command: Command::Cast(BatchArgs { batch: "fixtures/batch.yaml".to_string() }),
        };
        assert_eq!(cli, expected);
    }

    #[test]
    fn test_arg_parsing_cast_first_and_modules() {
        let cli = Cli::try_parse_from(vec!["dsa", "--scenario", "s.yaml", "cast-first", "b.yaml"])
            .expect("parse errored");
        assert_eq!(cli.command(), Command::CastFirst(BatchArgs { batch: "b.yaml".to_string() }));
        assert!(!cli.args().verbose);

        let cli = Cli::try_parse_from(vec!["dsa", "--scenario", "s.yaml", "modules"])
            .expect("parse errored");
        assert_eq!(cli.command(), Command::Modules);
    }

    #[test]
    fn test_batch_file_is_required() {
        assert!(Cli::try_parse_from(vec!["dsa", "--scenario", "s.yaml", "encode"]).is_err());
    }
}
