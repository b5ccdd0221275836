// src/logging.rs

//! Diagnostic output on stderr
//!
//! Events are printed without timestamps or targets; warnings and errors
//! carry a `[WARNING]: ` / `[ERROR]: ` tag.

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Event format with level tags instead of the default prefix
pub struct TaggedFormat;

impl<S, N> FormatEvent<S, N> for TaggedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{}", tag(*event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn tag(level: Level) -> &'static str {
    match level {
        Level::ERROR => "[ERROR]: ",
        Level::WARN => "[WARNING]: ",
        Level::INFO => "",
        _ => "[DEBUG]: ",
    }
}

/// Filter directive for a verbosity level
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber; `RUST_LOG` overrides `verbosity`
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .event_format(TaggedFormat)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for(0), "error");
        assert_eq!(level_for(1), "warn");
        assert_eq!(level_for(2), "info");
        assert_eq!(level_for(9), "debug");
    }

    #[test]
    fn test_tags() {
        assert_eq!(tag(Level::WARN), "[WARNING]: ");
        assert_eq!(tag(Level::ERROR), "[ERROR]: ");
        assert_eq!(tag(Level::INFO), "");
    }
}
