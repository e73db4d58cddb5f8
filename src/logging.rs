use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console logging; `RUST_LOG` overrides the default `tabular_etl=info`.
pub fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "tabular_etl=debug"
    } else {
        "tabular_etl=info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
