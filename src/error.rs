//! Error types for the DFG fixup crate
//!
//! Recoverable errors only come from the crate's outer surface: validating a
//! graph handed in from outside, loading configuration and reading files.
//! Inside the phase, broken phase ordering is a compiler bug and goes through
//! [`invariant_violation`].

use crate::ir::{BlockIndex, NodeId, NodeType};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// A node has the wrong number of children for its opcode
    #[error("ArityError: {node} ({op}) has {found} children, expected {expected}")]
    Arity {
        node: NodeId,
        op: NodeType,
        found: usize,
        expected: String,
    },

    /// An edge points at a node that does not exist
    #[error("DanglingEdge: {node} refers to missing node {target}")]
    DanglingEdge { node: NodeId, target: NodeId },

    /// A node's payload does not match what its opcode requires
    #[error("PayloadError: {node} ({op}): {message}")]
    Payload {
        node: NodeId,
        op: NodeType,
        message: String,
    },

    /// A block lists a node that does not exist or appears twice
    #[error("BlockError: block #{block}: {message}")]
    Block { block: BlockIndex, message: String },

    /// Graph-level precondition does not hold
    #[error("GraphError: {0}")]
    Graph(String),

    /// Invalid configuration value
    #[error("ConfigError: {0}")]
    Config(String),

    /// File could not be read
    #[error("IOError: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON decoding failure
    #[error("JsonError: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn payload(node: NodeId, op: NodeType, message: impl Into<String>) -> Self {
        Error::Payload {
            node,
            op,
            message: message.into(),
        }
    }
}

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Report a broken compiler invariant and stop
///
/// Reaching this means an earlier phase handed us a graph this phase must
/// never see. There is nothing to recover.
#[cold]
#[track_caller]
pub fn invariant_violation(message: fmt::Arguments<'_>) -> ! {
    let location = std::panic::Location::caller();
    tracing::error!(%location, "DFG invariant violated: {}", message);
    panic!("DFG invariant violated: {}", message)
}
