pub mod export;
pub mod inspect;
pub mod verify;

use std::process;

use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "heliostat=debug" } else { "heliostat=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Report a fatal error and exit with status 1.
pub fn fail(err: heliostat::Error) -> ! {
    eprintln!("error: {err}");
    process::exit(1);
}
