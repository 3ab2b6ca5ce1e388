// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Error types for LVM operations
#[derive(Error, Debug)]
pub enum LvmError {
    #[error("{command} exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid VG/LV name: {0}")]
    InvalidName(String),

    #[error("Lookup for {selector} matched {matches} volumes, expected exactly one")]
    AmbiguousLookup { selector: String, matches: usize },

    #[error("Can't find LV for: {0}")]
    UnresolvableReference(String),

    #[error("No thin pool behind LV: {0}")]
    MissingThinPool(String),

    #[error("Thin pool metadata error: {0}")]
    ThinPoolMetadata(String),

    #[error("Unexpected report output: {0}")]
    ParseOutput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for LVM operations
pub type Result<T> = std::result::Result<T, LvmError>;
