pub mod pull;
pub mod push;

use std::process;

use tracing_subscriber::EnvFilter;

use crate::error::Abort;
use crate::output::{Console, PALETTE, Tone};

pub const VERSION: &str = env!("MYGIT_VERSION_STRING");

/// Diagnostics go to stderr, filtered by `MYGIT_LOG` (default `warn`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("MYGIT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Ctrl-C prints `message` and exits 1. A blocking prompt read would not be
/// interrupted otherwise.
pub fn install_interrupt_handler(message: &'static str) {
    let _ = ctrlc::set_handler(move || {
        let console = Console::new(&PALETTE, false);
        eprintln!();
        eprintln!("{}", console.paint(Tone::Warn, format!("[ABORT] {}", message)));
        process::exit(1);
    });
}

/// Reports the outcome of a run and returns the process exit code.
pub fn finish(result: anyhow::Result<()>) -> i32 {
    let console = Console::new(&PALETTE, false);
    let Err(err) = result else {
        return 0;
    };
    match err.downcast_ref::<Abort>() {
        Some(Abort::Cancelled(msg)) => {
            eprintln!("{}", console.paint(Tone::Warn, format!("[ABORT] {}", msg)));
        }
        Some(abort) => console.error(abort),
        None => console.error(format!("unexpected error: {:#}", err)),
    }
    1
}
