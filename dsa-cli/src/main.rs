use clap::Parser;
use dsa_cli::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), anyhow::Error> {
    let cli: Cli = Cli::parse();
    let global_args = cli.args();
    create_tracing_subscriber(global_args.verbose);

    let stdout = std::io::stdout();
    dsa_cli::run(&global_args, cli.command(), &mut stdout.lock())
}

fn create_tracing_subscriber(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let format = tracing_subscriber::fmt::format()
        .with_level(true)
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .event_format(format)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with_writer(std::io::stderr)
        .init();
}
