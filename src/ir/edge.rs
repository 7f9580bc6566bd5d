//! Typed edges between DFG nodes
//!
//! An [`Edge`] names the producer of a value together with the
//! representation the consumer requires from it ([`UseKind`]). `Known*` use
//! kinds mean the check was already performed upstream; the plain kinds ask
//! the backend to emit a speculation check at this use.

use super::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Representation contract a value must satisfy at one use site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UseKind {
    /// Boxed JS value, no speculation
    #[default]
    Untyped,
    Int32,
    KnownInt32,
    RealNumber,
    Number,
    KnownNumber,
    Boolean,
    Cell,
    KnownCell,
    Object,
    ObjectOrOther,
    StringIdent,
    String,
    KnownString,
    StringObject,
    StringOrStringObject,
    NotCell,
    Other,
}

impl UseKind {
    /// Whether a use of this kind emits a runtime check (and so may exit)
    pub fn needs_check(self) -> bool {
        !matches!(
            self,
            UseKind::Untyped
                | UseKind::KnownInt32
                | UseKind::KnownNumber
                | UseKind::KnownCell
                | UseKind::KnownString
        )
    }

    pub fn is_int32(self) -> bool {
        matches!(self, UseKind::Int32 | UseKind::KnownInt32)
    }

    pub fn is_number(self) -> bool {
        matches!(
            self,
            UseKind::Number | UseKind::RealNumber | UseKind::KnownNumber
        )
    }

    pub fn is_cell(self) -> bool {
        matches!(
            self,
            UseKind::Cell
                | UseKind::KnownCell
                | UseKind::Object
                | UseKind::StringIdent
                | UseKind::String
                | UseKind::KnownString
                | UseKind::StringObject
                | UseKind::StringOrStringObject
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            UseKind::Untyped => "Untyped",
            UseKind::Int32 => "Int32",
            UseKind::KnownInt32 => "KnownInt32",
            UseKind::RealNumber => "RealNumber",
            UseKind::Number => "Number",
            UseKind::KnownNumber => "KnownNumber",
            UseKind::Boolean => "Boolean",
            UseKind::Cell => "Cell",
            UseKind::KnownCell => "KnownCell",
            UseKind::Object => "Object",
            UseKind::ObjectOrOther => "ObjectOrOther",
            UseKind::StringIdent => "StringIdent",
            UseKind::String => "String",
            UseKind::KnownString => "KnownString",
            UseKind::StringObject => "StringObject",
            UseKind::StringOrStringObject => "StringOrStringObject",
            UseKind::NotCell => "NotCell",
            UseKind::Other => "Other",
        }
    }
}

impl fmt::Display for UseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference from a consumer to its producer, plus the required representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub node: NodeId,
    pub use_kind: UseKind,
}

impl Edge {
    pub fn new(node: NodeId, use_kind: UseKind) -> Self {
        Self { node, use_kind }
    }

    pub fn untyped(node: NodeId) -> Self {
        Self::new(node, UseKind::Untyped)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.use_kind {
            UseKind::Untyped => write!(f, "{}", self.node),
            kind => write!(f, "{}:{}", kind, self.node),
        }
    }
}

/// Address of one child slot of a node
///
/// Slots of fixed-arity nodes live in the node; slots of var-arg nodes live
/// in the graph's shared child table. Rules hold `EdgeRef`s instead of
/// borrowed edges so the graph stays freely mutable while they work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeRef {
    pub node: NodeId,
    pub index: usize,
}

impl EdgeRef {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}
