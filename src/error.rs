// Crate-wide error type.
//
// Every failure mode carries its io::Error source; open-style errors also
// carry the path so the CLI can report it the way the original tools did.

use std::io;

use thiserror::Error;

/// Errors produced by the backend layer and both engines.
#[derive(Debug, Error)]
pub enum Error {
    /// A path could not be opened, created, or stat'ed. Always fatal.
    #[error("{path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A read from an input backend failed mid-operation.
    #[error("read error: {0}")]
    Read(#[source] io::Error),

    /// A write to an output backend failed mid-operation.
    #[error("write error: {0}")]
    Write(#[source] io::Error),

    /// Setting the logical end-of-file failed.
    #[error("truncate error: {0}")]
    Truncate(#[source] io::Error),

    /// The platform deallocation primitive failed. The sparsify walk stops
    /// here so the caller knows the file did not get sparsified.
    #[error("fallocate: {0}")]
    Punch(#[source] io::Error),

    /// An in-place strategy was pointed at something other than a regular
    /// file.
    #[error("{0} is not a regular file")]
    NotRegular(String),

    /// Renaming the temporary output over the original failed.
    #[error("rename to {path}: {source}")]
    Rename {
        path: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
