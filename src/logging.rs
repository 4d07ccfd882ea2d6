//! Log setup for the binary. Library code only emits events through the
//! span handed to each component; installing a subscriber is left to the
//! caller.

use std::io::{self, IsTerminal};

use tracing::Span;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

/// RFC3339 UTC timestamps, e.g. `2025-09-12T10:20:30Z`.
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        w.write_str(&now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

/// Filter from `RUST_LOG` if set, otherwise from the `-v` count.
pub fn env_filter(verbosity: u8) -> EnvFilter {
    let default = match verbosity {
        0 => "patchcov=warn",
        1 => "patchcov=info",
        2 => "patchcov=debug",
        _ => "patchcov=trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install a compact stderr subscriber. Stdout is reserved for reports.
/// Calling this twice is harmless; the second call is ignored.
pub fn init(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_timer(ChronoRfc3339Utc)
        .with_target(true)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .compact()
        .try_init();
}

/// Root span every component logs under.
pub fn run_span() -> Span {
    tracing::info_span!("patchcov")
}
