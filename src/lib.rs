//! Quicksilver DFG: the type fixup phase of a speculative JavaScript JIT
//!
//! The fixup phase runs once per compilation, after prediction propagation
//! has attached a speculated type to every value in the data-flow graph. It
//! turns those predictions into commitments: every use of a value is tagged
//! with a [`UseKind`] (the representation the consumer expects and the type
//! check it implies) and generic opcodes are rewritten into specialized
//! ones. Whatever a specialized form needs beforehand, such as a conversion
//! or an array guard, is inserted in front of its consumer.
//!
//! # Quick Start
//!
//! ```
//! use quicksilver_dfg::{run_fixup_phase, GraphBuilder, NodeType, ProfileSnapshot, SpeculatedType, UseKind};
//!
//! let mut b = GraphBuilder::new();
//! let x = b.value(SpeculatedType::INT32);
//! let y = b.value(SpeculatedType::INT32);
//! let sum = b.binary(NodeType::ArithAdd, x, y, SpeculatedType::INT32);
//! let mut graph = b.finish();
//!
//! run_fixup_phase(&mut graph, &ProfileSnapshot::new());
//! assert_eq!(graph.child(sum, 0).map(|edge| edge.use_kind), Some(UseKind::Int32));
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **IR** | [`ir`], [`speculation`] |
//! | **Phase** | [`fixup`] |
//! | **Inputs** | [`profiling`], [`config`], [`unit`] |
//! | **Errors** | [`error`](Error) |
// Clippy configuration for the fixup phase.
//
// - too_many_arguments: guard emission threads cursor, mode, origin and slots
// - new_without_default: builders with required initialization
// - enum_variant_names: opcode variants follow the JIT's naming
#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]
#![allow(clippy::enum_variant_names)]

pub mod config;
pub mod error;
pub mod fixup;
pub mod ir;
pub mod profiling;
pub mod speculation;
pub mod unit;

pub use config::{FixupConfig, TargetArch, ValueRepresentation};
pub use error::{Error, Result};
pub use fixup::{run_fixup_phase, run_fixup_phase_with_config, FixupPhase, FixupStats};
pub use ir::{
    ArrayMode, ArrayType, Edge, Graph, GraphBuilder, Node, NodeFlags, NodeId, NodeType, UseKind,
};
pub use profiling::{ExitKind, ProfileSnapshot, ProfilingOracle};
pub use speculation::SpeculatedType;
pub use unit::CompilationUnit;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
