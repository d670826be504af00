use clap::Parser;
use pixelprops_cli::PropsCli;

fn main() {
    // Logs go to stderr; stdout carries command output only.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = PropsCli::parse();
    std::process::exit(cli.run());
}
