use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// The caller provides a fallback filter string that is used when `RUST_LOG` is
/// not set.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}

/// Maps the CLI verbosity count onto a default filter directive.
///
/// `quiet` wins over any number of `-v` flags. HTTP internals stay at `warn`
/// unless explicitly raised through `RUST_LOG`.
pub fn filter_for_verbosity(verbose: u8, quiet: bool) -> String {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    format!("{level},reqwest=warn,hyper=warn,hyper_util=warn,html5ever=warn,selectors=warn")
}

#[cfg(test)]
mod tests {
    use super::filter_for_verbosity;

    #[test]
    fn verbosity_levels() {
        assert!(filter_for_verbosity(0, false).starts_with("info,"));
        assert!(filter_for_verbosity(1, false).starts_with("debug,"));
        assert!(filter_for_verbosity(5, false).starts_with("trace,"));
        assert!(filter_for_verbosity(2, true).starts_with("warn,"));
    }
}
