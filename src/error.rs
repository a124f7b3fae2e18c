//! Error kinds for the denoising engine.
//!
//! These are the caller-input errors the engine detects eagerly at call entry;
//! no partial clustering is performed on invalid input. I/O and CLI errors are
//! handled with `anyhow` at the binary level instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DenoiseError {
    /// Read-count vector and sequence vector differ in length, or sequences of
    /// unequal length were presented to a Hamming-based code path.
    #[error("length mismatch: {0}")]
    LengthMismatch(String),

    /// Unsupported clustering-strategy tag.
    #[error("invalid clustering method `{0}`; expected hamming, directional, or alignment")]
    InvalidMethod(String),

    /// A whitelist was supplied together with a strategy that cannot honor it.
    #[error("incompatible options: {0}")]
    IncompatibleOptions(String),
}
