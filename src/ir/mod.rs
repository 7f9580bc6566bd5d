//! DFG intermediate representation
//!
//! - [`Graph`]: blocks of nodes plus the tables shared by all nodes
//! - [`Node`] / [`NodeType`]: one operation and its opcode
//! - [`Edge`] / [`UseKind`]: a typed use of another node's result
//! - [`InsertionSet`]: deferred insertion while a block is being walked
//! - [`VariableAccessData`]: the per-local record shared by all accesses

pub mod array_mode;
pub mod builder;
pub mod dump;
pub mod edge;
pub mod graph;
pub mod insertion_set;
pub mod node;
pub mod variable;

pub use array_mode::{
    ArrayClass, ArrayConversion, ArrayMode, ArraySpeculation, ArrayType, IndexingShape,
};
pub use builder::GraphBuilder;
pub use dump::NodeDump;
pub use edge::{Edge, EdgeRef, UseKind};
pub use graph::{BasicBlock, BlockIndex, FixpointState, Graph, GraphForm, IdentifierTable};
pub use insertion_set::InsertionSet;
pub use node::{
    to_int32, Arity, Children, CodeOrigin, IdentifierId, JsConstant, Node, NodeFlags, NodeId,
    NodeResult, NodeType, OpInfo, PayloadKind, SwitchCase, SwitchData, SwitchKind,
};
pub use variable::{ArgumentPosition, DoubleFormatState, VariableAccessData, VariableId};
