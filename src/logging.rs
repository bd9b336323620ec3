use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::{SprintError, SprintResult};

/// Send tracing output to `path`. The terminal belongs to the UI, so nothing
/// is ever written to stdout or stderr. Filter comes from `RUST_LOG`,
/// defaulting to `info`.
pub fn init_file_logging(path: &Path) -> SprintResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| SprintError::Logging(format!("subscriber already installed: {e}")))
}
