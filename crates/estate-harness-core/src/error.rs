//! Run-level error taxonomy for feed imports.
//!
//! Every variant here aborts an import run before any listing is written.
//! Per-listing problems are not errors at this level: the upsert engine
//! collects them as [`RecordFailure`](crate::models::RecordFailure)s.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    /// The feed text is not well-formed XML.
    #[error("malformed XML: {0}")]
    MalformedInput(String),

    /// The parsed tree matches neither known portal layout.
    #[error("unrecognized feed format: expected an imoveis or ListaImoveis root")]
    UnrecognizedFormat,

    #[error("unsupported portal: '{0}'. Must be portalA (chavesnamao) or portalB (canalpro)")]
    UnsupportedPortal(String),

    /// Remote fetch failed, timed out, or returned a non-success status.
    #[error("feed fetch failed: {0}")]
    Transport(String),

    /// A staged upload could not be read.
    #[error("could not read staged feed: {0}")]
    Staging(String),

    /// Storage failed outside the per-record upsert loop (e.g. client lookup).
    #[error("storage error: {0}")]
    Storage(String),
}
