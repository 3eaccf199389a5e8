//! Per-user directories for configuration and data.

use std::path::PathBuf;

use crate::constants::APP_NAME;
use crate::error::{SlError, SlResult};

/// Where the config file lives, e.g. `~/.config/ScanLink` on Linux.
pub fn config_dir() -> SlResult<PathBuf> {
    dirs::config_dir()
        .map(|base| base.join(APP_NAME))
        .ok_or_else(|| SlError::Config("could not determine config directory".into()))
}

/// Where logs and other state live, e.g. `~/.local/share/ScanLink` on Linux.
pub fn data_dir() -> SlResult<PathBuf> {
    dirs::data_dir()
        .map(|base| base.join(APP_NAME))
        .ok_or_else(|| SlError::Config("could not determine data directory".into()))
}
