use anyhow::Result;
use pirate_config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build the event filter for `config`.
///
/// An explicit `override_level` (from the command line) wins over the
/// configured level; `RUST_LOG` is the fallback when neither parses.
pub fn build_filter(config: &LoggingConfig, override_level: Option<&str>) -> EnvFilter {
    let mut directives = override_level
        .map(str::to_string)
        .unwrap_or_else(|| config.level.to_string());
    if let Some(extra) = &config.filter {
        directives.push(',');
        directives.push_str(extra);
    }

    EnvFilter::try_new(&directives)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            eprintln!("Invalid log filter '{}', falling back to 'info'", directives);
            EnvFilter::new("info")
        })
}

/// Install the global subscriber described by `config`.
///
/// Output goes to stderr. Calling this twice is harmless: the second
/// subscriber is discarded.
pub fn init_logging(config: &LoggingConfig, override_level: Option<&str>) -> Result<()> {
    let env_filter = build_filter(config, override_level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    // try_init so an already installed subscriber is not an error
    let installed = match config.format {
        LogFormat::Text => builder.with_ansi(config.ansi).try_init(),
        LogFormat::Compact => builder.compact().with_ansi(config.ansi).try_init(),
        LogFormat::Pretty => builder.pretty().with_ansi(config.ansi).try_init(),
        LogFormat::Json => builder.json().with_ansi(false).try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}
