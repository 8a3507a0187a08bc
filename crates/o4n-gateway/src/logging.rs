use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`; JSON output is meant for log shipping,
/// the default human format for local runs.
pub fn init(level: &str, json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer().with_target(false).with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).try_init()?;
    }

    Ok(())
}
