use anyhow::Result;
use clap::Parser;

use rotalog_cli::{Cli, run};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout may carry --tee output, so diagnostics go to stderr
    let log_level = cli.log_level();
    let filter_str = if std::env::var("RUST_LOG").is_ok() {
        format!(
            "error,rotalog={},rotalog_cli={}",
            log_level.as_filter_str(),
            log_level.as_filter_str()
        )
    } else {
        log_level.as_filter_str().to_string()
    };
    tracing_subscriber::fmt()
        .with_env_filter(&filter_str)
        .with_writer(std::io::stderr)
        .init();

    run(&cli)
}
