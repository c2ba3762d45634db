//! Restart-the-bot loop with exponential backoff between crashes.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

/// Longest pause between restarts.
const MAX_RESTART_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The bot returned normally (e.g. Ctrl-C).
    Clean,
    /// The bot kept failing and the restart budget ran out.
    GaveUp { failures: u32 },
}

/// Wait before restart number `failures` (1-based): `min(60, 5 * 2^failures)` seconds.
pub fn restart_delay(failures: u32) -> Duration {
    let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
    Duration::from_secs(5).saturating_mul(factor).min(MAX_RESTART_DELAY)
}

/// Run `run` until it returns `Ok`, restarting it after each error.
///
/// `run` receives the number of failures so far.
pub async fn supervise<F, Fut, E>(max_restarts: u32, mut run: F) -> Exit
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut failures = 0;
    loop {
        match run(failures).await {
            Ok(()) => {
                info!("Bot shut down gracefully");
                return Exit::Clean;
            }
            Err(e) => {
                failures += 1;
                error!("Fatal error: {}", e);

                if failures >= max_restarts {
                    error!("Exceeded maximum restart attempts ({}). Giving up.", max_restarts);
                    return Exit::GaveUp { failures };
                }

                let wait = restart_delay(failures);
                warn!(
                    "Restarting bot in {}s (attempt {}/{})...",
                    wait.as_secs(),
                    failures,
                    max_restarts
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}
