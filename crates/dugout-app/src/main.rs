// dugout entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, so stdout carries only the report)
// 2. Load config, seeding config/ from defaults/ on first run
// 3. Run each configured analysis
// 4. Print the report in the configured format

use anyhow::Context;
use dugout_app::{pipeline, report};
use dugout_core::config;
use tracing::info;

fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("dugout starting up");

    let config = config::load_config().context("failed to load configuration")?;
    let base_dir = std::env::current_dir().context("failed to resolve working directory")?;

    let run = pipeline::run(&config, &base_dir)?;
    let rendered = report::render(&run, config.output.format).context("failed to render report")?;
    println!("{rendered}");

    info!("dugout finished");
    Ok(())
}

/// Initialize tracing to stderr. `RUST_LOG` overrides the default filter.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dugout=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
