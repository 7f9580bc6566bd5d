//! Type fixup phase
//!
//! Walks every reachable block once, reads the predictions attached to each
//! node and its operands, and commits to representations: it tags edges with
//! use kinds, rewrites opcodes into specialized forms, and inserts the
//! conversions and guards those forms need. Afterwards it runs the local
//! variable unboxing fixpoint (see [`unboxing`]).
//!
//! The rules are grouped by concern:
//!
//! | Module | Opcodes |
//! |--------|---------|
//! | [`arith`] | bitwise ops, arithmetic, comparisons |
//! | [`strings`] | `ValueAdd` on strings, `MakeRope`, `ToPrimitive`, `ToString` |
//! | [`arrays`] | indexed access, array allocation, `length` and friends |
//! | [`control`] | `LogicalNot`, `Branch`, `Switch` |
//! | [`objects`] | `this`, scopes, structure checks, property offsets |

mod arith;
mod arrays;
mod control;
mod objects;
mod strings;
mod unboxing;

use crate::config::FixupConfig;
use crate::error::invariant_violation;
use crate::ir::{
    BlockIndex, CodeOrigin, Edge, EdgeRef, FixpointState, Graph, GraphForm, InsertionSet, Node,
    NodeFlags, NodeId, NodeType, UseKind,
};
use crate::profiling::ProfilingOracle;
use crate::speculation::SpeculatedType;
use serde::Serialize;
use std::fmt;
use tracing::{debug, debug_span, info, trace};

/// Where an inserted conversion reports an OSR exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpeculationDirection {
    /// Exit as if the consuming node had not executed
    Backward,
    /// Exit after the consuming node (`SetLocal` conversions)
    Forward,
}

/// Position of the node being fixed up
///
/// Passed to every rule so it knows where queued insertions go.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor {
    pub block: BlockIndex,
    pub index: usize,
    pub node: NodeId,
}

impl Cursor {
    fn slot(self, index: usize) -> EdgeRef {
        EdgeRef::new(self.node, index)
    }
}

/// Counters reported after a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixupStats {
    pub blocks_visited: usize,
    pub nodes_visited: usize,
    /// Nodes materialized by the insertion set, conversions and guards alike
    pub nodes_inserted: usize,
    /// Unboxing sweeps after the main pass
    pub fixpoint_sweeps: usize,
    /// Variables marked profitable to unbox when the phase finished
    pub variables_unboxed: usize,
}

impl fmt::Display for FixupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks, {} nodes visited, {} inserted, {} fixpoint sweeps, {} variables unboxed",
            self.blocks_visited,
            self.nodes_visited,
            self.nodes_inserted,
            self.fixpoint_sweeps,
            self.variables_unboxed
        )
    }
}

/// The fixup phase over one graph
pub struct FixupPhase<'a> {
    graph: &'a mut Graph,
    oracle: &'a dyn ProfilingOracle,
    config: FixupConfig,
    insertion_set: InsertionSet,
    /// Set when any variable's unboxing flag flipped
    profitability_changed: bool,
    stats: FixupStats,
}

impl<'a> FixupPhase<'a> {
    /// Create a phase with the default (x86_64) configuration
    pub fn new(graph: &'a mut Graph, oracle: &'a dyn ProfilingOracle) -> Self {
        Self::with_config(graph, oracle, FixupConfig::default())
    }

    pub fn with_config(
        graph: &'a mut Graph,
        oracle: &'a dyn ProfilingOracle,
        config: FixupConfig,
    ) -> Self {
        Self {
            graph,
            oracle,
            config,
            insertion_set: InsertionSet::new(),
            profitability_changed: false,
            stats: FixupStats::default(),
        }
    }

    pub fn stats(&self) -> &FixupStats {
        &self.stats
    }

    pub fn config(&self) -> &FixupConfig {
        &self.config
    }

    /// Run the phase. Always reports that the graph changed.
    pub fn run(&mut self) -> bool {
        if self.graph.form() != GraphForm::ThreadedCps {
            invariant_violation(format_args!(
                "fixup requires threaded CPS form, graph is {:?}",
                self.graph.form()
            ));
        }
        if self.graph.fixpoint_state() != FixpointState::BeforeFixpoint {
            invariant_violation(format_args!(
                "fixup must run before the fixpoint, graph is {:?}",
                self.graph.fixpoint_state()
            ));
        }

        let span = debug_span!(
            "dfg_fixup",
            blocks = self.graph.num_blocks(),
            nodes = self.graph.node_count(),
            target = %self.config.target
        );
        let _enter = span.enter();

        self.profitability_changed = false;
        for block in 0..self.graph.num_blocks() {
            self.fixup_block(block);
        }

        self.run_unboxing_fixpoint();

        self.stats.variables_unboxed = self
            .graph
            .variables()
            .iter()
            .filter(|data| data.is_profitable_to_unbox())
            .count();
        info!(stats = %self.stats, "fixup finished");
        true
    }

    fn fixup_block(&mut self, block: BlockIndex) {
        let Some(len) = self
            .graph
            .block(block)
            .filter(|block| block.is_reachable)
            .map(|block| block.len())
        else {
            return;
        };
        self.stats.blocks_visited += 1;

        self.insertion_set.begin(block);
        // Insertions are deferred, so the block keeps its length while we walk it
        for index in 0..len {
            let node = self.node_at(block, index);
            self.fixup_node(Cursor { block, index, node });
        }
        let inserted = self.insertion_set.execute(self.graph, block);
        self.stats.nodes_inserted += inserted;
        debug!(block, nodes = len, inserted, "fixed block");
    }

    fn node_at(&self, block: BlockIndex, index: usize) -> NodeId {
        match self.graph.block(block) {
            Some(block) => block.at(index),
            None => invariant_violation(format_args!("block #{} disappeared", block)),
        }
    }

    fn fixup_node(&mut self, cur: Cursor) {
        let op = self.graph[cur.node].op();
        self.stats.nodes_visited += 1;
        trace!(node = %cur.node, %op, "fixing");

        match op {
            // Handled by the unboxing fixpoint
            NodeType::SetLocal => {}

            NodeType::BitAnd
            | NodeType::BitOr
            | NodeType::BitXor
            | NodeType::BitRShift
            | NodeType::BitLShift
            | NodeType::BitURShift
            | NodeType::ArithIMul => self.fixup_bitwise(cur),

            NodeType::UInt32ToNumber => {
                self.set_use_kind_and_unbox(cur.slot(0), UseKind::KnownInt32)
            }
            NodeType::ValueToInt32 => self.fixup_value_to_int32(cur),
            NodeType::ValueAdd => self.fixup_value_add(cur),
            NodeType::ArithAdd | NodeType::ArithSub => self.fixup_arith_add(cur),
            NodeType::ArithNegate => self.fixup_arith_negate(cur),
            NodeType::ArithMul => self.fixup_arith_mul(cur),
            NodeType::ArithDiv | NodeType::ArithMod => self.fixup_arith_div(cur),
            NodeType::ArithMin | NodeType::ArithMax => self.fixup_arith_min_max(cur),
            NodeType::ArithAbs => self.fixup_arith_abs(cur),
            NodeType::ArithSqrt => self.fix_double_edge(
                cur,
                cur.slot(0),
                UseKind::Number,
                SpeculationDirection::Backward,
            ),

            NodeType::CompareLess
            | NodeType::CompareLessEq
            | NodeType::CompareGreater
            | NodeType::CompareGreaterEq
            | NodeType::CompareEq => self.fixup_compare(cur),
            NodeType::CompareStrictEq => self.fixup_compare_strict_eq(cur),
            NodeType::CompareEqConstant | NodeType::CompareStrictEqConstant => {}

            NodeType::LogicalNot => self.fixup_logical_not(cur),
            NodeType::Branch => self.fixup_branch(cur),
            NodeType::Switch => self.fixup_switch(cur),
            NodeType::TypeOf => self.fixup_type_of(cur),

            NodeType::StringCharAt | NodeType::StringCharCodeAt => {
                self.fixup_string_char_access(cur)
            }
            NodeType::StringFromCharCode => {
                self.set_use_kind_and_unbox(cur.slot(0), UseKind::Int32)
            }
            NodeType::GetByVal => self.fixup_get_by_val(cur),
            NodeType::PutByVal | NodeType::PutByValAlias => self.fixup_put_by_val(cur),
            NodeType::ArrayPush => self.fixup_array_push(cur),
            NodeType::ArrayPop => self.fixup_array_pop(cur),
            NodeType::NewArray => self.fixup_new_array(cur),
            NodeType::NewTypedArray => self.fixup_new_typed_array(cur),
            NodeType::NewArrayWithSize
            | NodeType::GetMyArgumentByVal
            | NodeType::GetMyArgumentByValSafe => {
                self.set_use_kind_and_unbox(cur.slot(0), UseKind::Int32)
            }
            NodeType::GetById | NodeType::GetByIdFlush => self.fixup_get_by_id(cur),

            NodeType::RegExpExec | NodeType::RegExpTest => {
                self.set_use_kind_and_unbox(cur.slot(0), UseKind::Cell);
                self.set_use_kind_and_unbox(cur.slot(1), UseKind::Cell);
            }
            NodeType::ToPrimitive => self.fixup_to_primitive(cur.node),
            NodeType::ToString => self.fixup_to_string(cur.node),
            NodeType::NewStringObject => {
                self.set_use_kind_and_unbox(cur.slot(0), UseKind::KnownString)
            }
            NodeType::MakeRope => self.fixup_make_rope(cur.node),

            NodeType::ToThis => self.fixup_to_this(cur),

            NodeType::GetClosureRegisters
            | NodeType::PutClosureVar
            | NodeType::SkipTopScope
            | NodeType::SkipScope
            | NodeType::SetCallee
            | NodeType::SetMyScope
            | NodeType::PutStructure
            | NodeType::AllocatePropertyStorage
            | NodeType::ReallocatePropertyStorage
            | NodeType::GetScope => {
                self.set_use_kind_and_unbox(cur.slot(0), UseKind::KnownCell)
            }

            NodeType::CheckExecutable
            | NodeType::CheckStructure
            | NodeType::StructureTransitionWatchpoint
            | NodeType::CheckFunction
            | NodeType::PutById
            | NodeType::PutByIdDirect
            | NodeType::CheckHasInstance
            | NodeType::CreateThis
            | NodeType::GetButterfly => self.set_use_kind_and_unbox(cur.slot(0), UseKind::Cell),

            NodeType::CheckArray => self.fixup_check_array(cur),
            NodeType::Arrayify | NodeType::ArrayifyToStructure => self.fixup_arrayify(cur),
            NodeType::GetByOffset | NodeType::PutByOffset => self.fixup_by_offset(cur),
            NodeType::InstanceOf => self.fixup_instance_of(cur),
            NodeType::In => self.set_use_kind_and_unbox(cur.slot(1), UseKind::Cell),

            NodeType::Phantom | NodeType::Identity => self.fixup_phantom_or_identity(cur),

            // Only a later phase may introduce these
            NodeType::DoubleAsInt32
            | NodeType::Int32ToDouble
            | NodeType::GetArrayLength
            | NodeType::Phi
            | NodeType::Upsilon
            | NodeType::GetArgument
            | NodeType::PhantomPutStructure
            | NodeType::GetIndexedPropertyStorage
            | NodeType::GetTypedArrayByteOffset
            | NodeType::MovHint
            | NodeType::MovHintAndCheck
            | NodeType::ZombieHint
            | NodeType::CheckTierUpInLoop
            | NodeType::CheckTierUpAtReturn
            | NodeType::CheckTierUpAndOSREnter => invariant_violation(format_args!(
                "{} ({}) must not exist before fixup",
                cur.node, op
            )),

            NodeType::JSConstant
            | NodeType::WeakJSConstant
            | NodeType::GetLocal
            | NodeType::SetArgument
            | NodeType::Flush
            | NodeType::PhantomLocal
            | NodeType::GetLocalUnlinked
            | NodeType::ExtractOSREntryLocal
            | NodeType::InlineStart
            | NodeType::GetCallee
            | NodeType::GetMyScope
            | NodeType::GetClosureVar
            | NodeType::GetGlobalVar
            | NodeType::PutGlobalVar
            | NodeType::GlobalVarWatchpoint
            | NodeType::VarInjectionWatchpoint
            | NodeType::AllocationProfileWatchpoint
            | NodeType::IsUndefined
            | NodeType::IsBoolean
            | NodeType::IsNumber
            | NodeType::IsString
            | NodeType::IsObject
            | NodeType::IsFunction
            | NodeType::Call
            | NodeType::Construct
            | NodeType::NewObject
            | NodeType::NewArrayBuffer
            | NodeType::NewRegexp
            | NodeType::NewFunction
            | NodeType::NewFunctionNoCheck
            | NodeType::NewFunctionExpression
            | NodeType::CreateActivation
            | NodeType::TearOffActivation
            | NodeType::CreateArguments
            | NodeType::PhantomArguments
            | NodeType::TearOffArguments
            | NodeType::GetMyArgumentsLength
            | NodeType::GetMyArgumentsLengthSafe
            | NodeType::CheckArgumentsNotCreated
            | NodeType::Jump
            | NodeType::Return
            | NodeType::Throw
            | NodeType::ThrowReferenceError
            | NodeType::Unreachable
            | NodeType::Breakpoint
            | NodeType::CountExecution
            | NodeType::ForceOSRExit
            | NodeType::CheckWatchdogTimer
            | NodeType::LoopHint => {}
        }

        trace!(node = %self.graph.dump_node(cur.node), "fixed");
    }

    // ---- Edge helpers shared by the rules ----

    /// The edge in an occupied slot
    #[track_caller]
    fn edge_at(&self, slot: EdgeRef) -> Edge {
        match self.graph.edge(slot) {
            Some(edge) => edge,
            None => invariant_violation(format_args!(
                "{} ({}) has no child {}",
                slot.node, self.graph[slot.node].op(), slot.index
            )),
        }
    }

    fn prediction(&self, slot: EdgeRef) -> SpeculatedType {
        self.graph.prediction_of(slot)
    }

    fn origin(&self, node: NodeId) -> CodeOrigin {
        self.graph[node].origin()
    }

    /// Queue `node` before the node under the cursor
    fn insert(&mut self, cur: Cursor, node: Node) -> NodeId {
        let id = self.insertion_set.insert_node(self.graph, cur.index, node);
        trace!(inserted = %id, before = %cur.node, "queued insertion");
        id
    }

    /// Tag a slot and let a `GetLocal` producer learn it is used unboxed
    #[track_caller]
    fn set_use_kind_and_unbox(&mut self, slot: EdgeRef, use_kind: UseKind) {
        let edge = self.edge_at(slot);
        self.observe_use_kind_on_node(edge.node, use_kind);
        self.graph.set_use_kind(slot, use_kind);
    }

    fn observe_use_kind_on_edge(&mut self, slot: EdgeRef) {
        if let Some(edge) = self.graph.edge(slot) {
            self.observe_use_kind_on_node(edge.node, edge.use_kind);
        }
    }

    /// Use a slot as an int32 that an earlier `ValueToInt32` already
    /// produced, looking through it when its input is known int32
    fn fix_int_edge(&mut self, slot: EdgeRef) {
        let edge = self.edge_at(slot);
        if self.graph[edge.node].op() != NodeType::ValueToInt32 {
            self.set_use_kind_and_unbox(slot, UseKind::KnownInt32);
            return;
        }

        let inner = self.edge_at(EdgeRef::new(edge.node, 0));
        if inner.use_kind != UseKind::Int32 {
            self.graph.set_use_kind(slot, UseKind::KnownInt32);
            return;
        }
        self.graph.set_edge(slot, Some(inner));
    }

    /// Use a slot as a double, converting int32 producers first
    fn fix_double_edge(
        &mut self,
        cur: Cursor,
        slot: EdgeRef,
        use_kind: UseKind,
        direction: SpeculationDirection,
    ) {
        if self.prediction(slot).intersects(SpeculatedType::DOUBLE) {
            self.set_use_kind_and_unbox(slot, use_kind);
            return;
        }
        self.inject_int32_to_double(cur, slot, use_kind, direction);
    }

    fn inject_int32_to_double(
        &mut self,
        cur: Cursor,
        slot: EdgeRef,
        use_kind: UseKind,
        direction: SpeculationDirection,
    ) {
        let edge = self.edge_at(slot);
        let mut conversion = Node::new(NodeType::Int32ToDouble, self.origin(cur.node))
            .with_prediction(SpeculatedType::DOUBLE)
            .with_edge(Edge::new(edge.node, UseKind::Number));
        if direction == SpeculationDirection::Forward {
            conversion = conversion.with_flags(NodeFlags::EXITS_FORWARD);
        }
        let conversion = self.insert(cur, conversion);
        self.graph.set_edge(slot, Some(Edge::new(conversion, use_kind)));
    }
}

/// Run the fixup phase with the default configuration
pub fn run_fixup_phase(graph: &mut Graph, oracle: &dyn ProfilingOracle) -> bool {
    FixupPhase::new(graph, oracle).run()
}

/// Run the fixup phase with an explicit configuration and report what it did
pub fn run_fixup_phase_with_config(
    graph: &mut Graph,
    oracle: &dyn ProfilingOracle,
    config: &FixupConfig,
) -> FixupStats {
    let mut phase = FixupPhase::with_config(graph, oracle, config.clone());
    phase.run();
    phase.stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphBuilder, JsConstant};
    use crate::profiling::ProfileSnapshot;

    #[test]
    fn test_constants_only_graph_is_untouched() {
        let mut b = GraphBuilder::new();
        let one = b.int32(1);
        b.ret(one);
        let mut graph = b.finish();
        let before = graph.clone();

        assert!(run_fixup_phase(&mut graph, &ProfileSnapshot::new()));
        assert_eq!(graph, before);
    }

    #[test]
    fn test_unreachable_blocks_are_skipped() {
        let mut b = GraphBuilder::new();
        let one = b.int32(1);
        b.ret(one);
        let dead = b.add_block();
        b.switch_to(dead);
        let x = b.value(SpeculatedType::INT32);
        let y = b.value(SpeculatedType::DOUBLE);
        let sum = b.binary(NodeType::ArithAdd, x, y, SpeculatedType::DOUBLE);
        b.ret(sum);
        b.mark_unreachable(dead);
        let mut graph = b.finish();
        let before = graph.clone();

        let stats =
            run_fixup_phase_with_config(&mut graph, &ProfileSnapshot::new(), &FixupConfig::default());
        assert_eq!(graph, before);
        assert_eq!(stats.blocks_visited, 1);
        assert_eq!(stats.nodes_inserted, 0);
    }

    #[test]
    fn test_removed_blocks_are_skipped() {
        let mut b = GraphBuilder::new();
        let one = b.int32(1);
        b.ret(one);
        b.graph_mut().add_removed_block();
        let mut graph = b.finish();

        let stats =
            run_fixup_phase_with_config(&mut graph, &ProfileSnapshot::new(), &FixupConfig::default());
        assert_eq!(stats.blocks_visited, 1);
        assert_eq!(stats.nodes_visited, 2);
    }

    #[test]
    #[should_panic(expected = "must not exist before fixup")]
    fn test_late_opcode_is_fatal() {
        let mut b = GraphBuilder::new();
        let x = b.int32(1);
        b.unary(NodeType::Int32ToDouble, x, SpeculatedType::DOUBLE);
        let mut graph = b.finish();
        run_fixup_phase(&mut graph, &ProfileSnapshot::new());
    }

    #[test]
    #[should_panic(expected = "threaded CPS")]
    fn test_wrong_form_is_fatal() {
        let mut graph = GraphBuilder::new().finish();
        graph.set_form(GraphForm::LoadStore);
        run_fixup_phase(&mut graph, &ProfileSnapshot::new());
    }

    #[test]
    #[should_panic(expected = "before the fixpoint")]
    fn test_wrong_fixpoint_state_is_fatal() {
        let mut graph = GraphBuilder::new().finish();
        graph.set_fixpoint_state(FixpointState::FixpointConverged);
        run_fixup_phase(&mut graph, &ProfileSnapshot::new());
    }

    #[test]
    fn test_fix_double_edge_inserts_conversion_before_consumer() {
        let mut b = GraphBuilder::new();
        let x = b.int32(3);
        let sqrt = b.unary(NodeType::ArithSqrt, x, SpeculatedType::DOUBLE);
        let mut graph = b.finish();

        run_fixup_phase(&mut graph, &ProfileSnapshot::new());

        let block = graph.block(0).unwrap();
        assert_eq!(block.nodes.len(), 3);
        let conversion = block.at(1);
        assert_eq!(graph[conversion].op(), NodeType::Int32ToDouble);
        assert_eq!(graph[conversion].prediction(), SpeculatedType::DOUBLE);
        assert_eq!(graph.child(conversion, 0), Some(Edge::new(x, UseKind::Number)));
        assert!(!graph[conversion].flags().contains(NodeFlags::EXITS_FORWARD));
        assert_eq!(graph.child(sqrt, 0), Some(Edge::new(conversion, UseKind::Number)));
        assert_eq!(graph[x].constant(), Some(&JsConstant::Int32(3)));
    }
}
