// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Error types for package persistence into new layers
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Unsupported release marker: {0}")]
    UnsupportedRelease(String),

    #[error("Mount operation failed: {0}")]
    Mount(String),

    #[error("Package reinstallation failed: {0}")]
    Reinstall(String),

    #[error("LVM error: {0}")]
    Lvm(#[from] imglayer_lvm::LvmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for persistence operations
pub type Result<T> = std::result::Result<T, PersistError>;
