use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// Installs the fmt subscriber on stderr. Warnings always show; `verbose`
/// adds the debug trail of classification, font and storage decisions.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    Ok(())
}
