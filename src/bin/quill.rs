/// Quill CLI
///
/// Renders component sources to target artifacts, checks syntax, and
/// computes hot-reload diffs. Logging verbosity follows `RUST_LOG`.
use tracing_subscriber::EnvFilter;

use quill::cli;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
