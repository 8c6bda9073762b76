//! Entry point of the `dai` binary.
//!
//! Sets up error reporting and logging, then hands off to `dai_cli::run()`.
//! Kept minimal so `lib.rs` stays unit-testable (`cargo test -p dai-cli`).

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: failed to install color-eyre: {e}");
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = dai_cli::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
