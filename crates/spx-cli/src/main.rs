//! 🚀 spx-cli — the front door. Loads config, sets up logging, hands off to `spx::run`.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! Records go to stdout (with the default sink), logs go to stderr. Never the twain shall meet. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use spx::SpoolError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🧵 Spool records out of an object store, resuming from the last saved cursor.
#[derive(Debug, Parser)]
#[command(name = "spx", version, about)]
struct Cli {
    /// 📋 TOML config file. Without one, everything comes from SPX_* env vars.
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let the_cli = Cli::parse();

    if let Some(the_path) = &the_cli.config {
        let the_file_exists = the_path.try_exists().with_context(|| {
            format!(
                "💀 Couldn't check whether the configuration file exists. \
                 If it's a relative path, try an absolute one. Was checking here: '{}'",
                the_path.display()
            )
        })?;
        if !the_file_exists {
            anyhow::bail!(
                "💀 Configuration file '{}' does not exist. Double check the path (and your cwd).",
                the_path.display()
            );
        }
    }

    let app_config = spx::load_config(the_cli.config.as_deref())
        .context("💀 In spx-cli, main, we couldn't load the config. Make sure [source] has a bucket")?;

    match spx::run(app_config).await {
        Ok(the_totals) => {
            info!(
                "✅ done: {} records from {} objects in {} cycles ({} routed failures)",
                the_totals.records, the_totals.objects, the_totals.cycles, the_totals.failures
            );
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
            }
            // -- a transient store failure leaves the saved cursor intact; rerunning resumes
            let the_spool_error = err.chain().find_map(|c| c.downcast_ref::<SpoolError>());
            if the_spool_error.is_some_and(SpoolError::is_transient) {
                error!(
                    "🔧 hint: the object store hiccuped. The cursor file still points at the last \
                     batch the sink accepted, so running spx again picks up from there."
                );
            }
            std::process::exit(1);
        }
    }
}
