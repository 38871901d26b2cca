use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::Config;

/// Create the capture root and the published output directory
///
/// Failure here is fatal to startup.
pub fn prepare_directories(config: &Config) -> Result<()> {
    for dir in [&config.media.capture_dir, &config.transcode.output_dir] {
        std::fs::create_dir_all(Path::new(dir))
            .with_context(|| format!("Failed to create directory {dir}"))?;
        info!(dir = %dir, "Directory ready");
    }
    Ok(())
}
