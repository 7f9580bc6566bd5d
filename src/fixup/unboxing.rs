//! Local variable unboxing
//!
//! Every use kind the rules commit to on a `GetLocal` result is evidence
//! that keeping the variable unboxed pays off. Once a variable is marked,
//! its `SetLocal`s must store the unboxed form, which tags more edges and
//! may mark more variables. The fixpoint repeats the `SetLocal` sweep until
//! no flag flips; flags only ever go from false to true, so it terminates.

use super::{Cursor, FixupPhase, SpeculationDirection};
use crate::error::invariant_violation;
use crate::ir::{BlockIndex, DoubleFormatState, EdgeRef, NodeId, NodeType, UseKind};
use tracing::debug;

impl FixupPhase<'_> {
    /// Record that `node`'s result is consumed as `use_kind`
    pub(super) fn observe_use_kind_on_node(&mut self, node: NodeId, use_kind: UseKind) {
        let Some(variable) = self.graph.local_read_variable(node) else {
            return;
        };
        let always_unbox = self.config.always_unbox_simple_primitives();
        let data = self.graph.variable(variable);

        let profitable = match use_kind {
            UseKind::Int32 => always_unbox || data.prediction().is_int32(),
            UseKind::Number | UseKind::RealNumber => {
                data.double_format_state() == DoubleFormatState::UsingDoubleFormat
            }
            UseKind::Boolean => always_unbox || data.prediction().is_boolean(),
            UseKind::Cell
            | UseKind::KnownCell
            | UseKind::Object
            | UseKind::String
            | UseKind::KnownString
            | UseKind::StringObject
            | UseKind::StringOrStringObject => always_unbox || data.prediction().is_cell(),
            _ => false,
        };

        if profitable
            && self
                .graph
                .variable_mut(variable)
                .merge_is_profitable_to_unbox(true)
        {
            debug!(%variable, %use_kind, "variable became profitable to unbox");
            self.profitability_changed = true;
        }
    }

    /// Repeat the `SetLocal` sweep while any unboxing flag keeps flipping
    pub(super) fn run_unboxing_fixpoint(&mut self) {
        let limit = self
            .config
            .fixpoint_sweep_limit(self.graph.variable_count());

        while self.profitability_changed {
            if self.stats.fixpoint_sweeps >= limit {
                invariant_violation(format_args!(
                    "unboxing fixpoint did not converge after {} sweeps",
                    limit
                ));
            }
            self.profitability_changed = false;
            self.stats.fixpoint_sweeps += 1;

            self.graph.merge_argument_prediction_awareness();
            if self.graph.merge_argument_unboxing_awareness() {
                debug!("argument positions spread unboxing");
            }

            for block in 0..self.graph.num_blocks() {
                self.fixup_set_locals_in_block(block);
            }
            debug!(
                sweep = self.stats.fixpoint_sweeps,
                changed = self.profitability_changed,
                "unboxing sweep"
            );
        }
    }

    fn fixup_set_locals_in_block(&mut self, block: BlockIndex) {
        let Some(len) = self
            .graph
            .block(block)
            .filter(|block| block.is_reachable)
            .map(|block| block.len())
        else {
            return;
        };

        self.insertion_set.begin(block);
        for index in 0..len {
            let node = self.node_at(block, index);
            if self.graph[node].op() != NodeType::SetLocal {
                continue;
            }
            self.fixup_set_local(Cursor { block, index, node });
        }
        self.stats.nodes_inserted += self.insertion_set.execute(self.graph, block);
    }

    fn fixup_set_local(&mut self, cur: Cursor) {
        let data = self.graph.variable(self.graph[cur.node].variable());
        if !data.should_unbox_if_possible() {
            return;
        }
        let slot = EdgeRef::new(cur.node, 0);

        if data.should_use_double_format() {
            self.fix_double_edge(cur, slot, UseKind::Number, SpeculationDirection::Forward);
            return;
        }

        let prediction = data.argument_aware_prediction();
        if prediction.is_int32() {
            self.set_use_kind_and_unbox(slot, UseKind::Int32);
        } else if prediction.is_cell() {
            self.set_use_kind_and_unbox(slot, UseKind::Cell);
        } else if prediction.is_boolean() {
            self.set_use_kind_and_unbox(slot, UseKind::Boolean);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{FixupConfig, TargetArch};
    use crate::fixup::{run_fixup_phase_with_config, FixupPhase};
    use crate::ir::{DoubleFormatState, Edge, GraphBuilder, NodeFlags, NodeType, UseKind};
    use crate::profiling::ProfileSnapshot;
    use crate::speculation::SpeculatedType;

    #[test]
    fn test_int32_use_marks_variable_and_retags_writes() {
        let mut b = GraphBuilder::new();
        let x = b.variable(0, SpeculatedType::INT32);
        let one = b.int32(1);
        let write = b.set_local(x, one);
        let read = b.get_local(x);
        let sum = b.binary(NodeType::ArithAdd, read, one, SpeculatedType::INT32);
        let mut graph = b.finish();

        let stats = run_fixup_phase_with_config(
            &mut graph,
            &ProfileSnapshot::new(),
            &FixupConfig::default(),
        );

        assert!(graph.variable(x).is_profitable_to_unbox());
        assert_eq!(graph.child(sum, 0), Some(Edge::new(read, UseKind::Int32)));
        assert_eq!(graph.child(write, 0), Some(Edge::new(one, UseKind::Int32)));
        assert_eq!(stats.fixpoint_sweeps, 1);
        assert_eq!(stats.variables_unboxed, 1);
    }

    #[test]
    fn test_no_evidence_means_no_sweep() {
        let mut b = GraphBuilder::new();
        let x = b.variable(0, SpeculatedType::INT32);
        let one = b.int32(1);
        let write = b.set_local(x, one);
        let read = b.get_local(x);
        b.ret(read);
        let mut graph = b.finish();

        let stats = run_fixup_phase_with_config(
            &mut graph,
            &ProfileSnapshot::new(),
            &FixupConfig::default(),
        );
        assert_eq!(stats.fixpoint_sweeps, 0);
        assert!(!graph.variable(x).is_profitable_to_unbox());
        assert_eq!(graph.child(write, 0), Some(Edge::untyped(one)));
    }

    #[test]
    fn test_unboxing_propagates_through_chained_locals() {
        // y = x; z = y; the int32 use on z's read marks z, z's write then
        // tags y's read, and so on back to x
        let mut b = GraphBuilder::new();
        let x = b.variable(0, SpeculatedType::INT32);
        let y = b.variable(1, SpeculatedType::INT32);
        let z = b.variable(2, SpeculatedType::INT32);
        let seven = b.int32(7);
        b.set_local(x, seven);
        let read_x = b.get_local(x);
        b.set_local(y, read_x);
        let read_y = b.get_local(y);
        b.set_local(z, read_y);
        let read_z = b.get_local(z);
        b.binary(NodeType::ArithAdd, read_z, seven, SpeculatedType::INT32);
        let mut graph = b.finish();

        let stats = run_fixup_phase_with_config(
            &mut graph,
            &ProfileSnapshot::new(),
            &FixupConfig::default(),
        );

        for variable in [x, y, z] {
            assert!(graph.variable(variable).is_profitable_to_unbox());
        }
        assert!(stats.fixpoint_sweeps <= graph.variable_count() + 1);
    }

    #[test]
    fn test_double_format_write_converts_forward() {
        let mut b = GraphBuilder::new();
        let x = b.variable(0, SpeculatedType::DOUBLE);
        let one = b.int32(1);
        let write = b.set_local(x, one);
        let read = b.get_local(x);
        b.unary(NodeType::ArithSqrt, read, SpeculatedType::DOUBLE);
        let mut graph = b.finish();
        graph
            .variable_mut(x)
            .merge_double_format_state(DoubleFormatState::UsingDoubleFormat);

        run_fixup_phase_with_config(&mut graph, &ProfileSnapshot::new(), &FixupConfig::default());

        let conversion = graph.child_node(write, 0);
        assert_eq!(graph[conversion].op(), NodeType::Int32ToDouble);
        assert!(graph[conversion].flags().contains(NodeFlags::EXITS_FORWARD));
        assert_eq!(graph.child(write, 0).map(|edge| edge.use_kind), Some(UseKind::Number));
        let block = graph.block(0).unwrap();
        let write_index = block.nodes.iter().position(|node| *node == write).unwrap();
        assert_eq!(block.at(write_index - 1), conversion);
    }

    #[test]
    fn test_never_unbox_wins() {
        let mut b = GraphBuilder::new();
        let x = b.variable(0, SpeculatedType::INT32);
        let one = b.int32(1);
        let write = b.set_local(x, one);
        let read = b.get_local(x);
        b.binary(NodeType::ArithAdd, read, one, SpeculatedType::INT32);
        let mut graph = b.finish();
        graph.variable_mut(x).mark_captured();

        run_fixup_phase_with_config(&mut graph, &ProfileSnapshot::new(), &FixupConfig::default());

        assert!(graph.variable(x).is_profitable_to_unbox());
        assert_eq!(graph.child(write, 0), Some(Edge::untyped(one)));
    }

    #[test]
    fn test_32_64_always_unboxes_booleans() {
        let mut b = GraphBuilder::new();
        let x = b.variable(0, SpeculatedType::TOP);
        let read = b.get_local(x);
        b.unary(NodeType::LogicalNot, read, SpeculatedType::BOOLEAN);
        let mut graph = b.finish();
        graph[read].set_prediction(SpeculatedType::BOOLEAN);

        let oracle = ProfileSnapshot::new();
        let mut phase = FixupPhase::with_config(
            &mut graph,
            &oracle,
            FixupConfig::for_target(TargetArch::X86),
        );
        phase.run();
        assert_eq!(phase.stats().variables_unboxed, 1);
    }

    #[test]
    fn test_argument_positions_share_unboxing() {
        let mut b = GraphBuilder::new();
        let outer = b.variable(-6, SpeculatedType::INT32);
        let inner = b.variable(-7, SpeculatedType::INT32);
        b.argument_position(&[outer, inner]);
        let one = b.int32(1);
        let inner_write = b.set_local(inner, one);
        let read = b.get_local(outer);
        b.binary(NodeType::ArithAdd, read, one, SpeculatedType::INT32);
        let mut graph = b.finish();

        run_fixup_phase_with_config(&mut graph, &ProfileSnapshot::new(), &FixupConfig::default());

        assert!(graph.variable(inner).is_profitable_to_unbox());
        assert_eq!(graph.child(inner_write, 0), Some(Edge::new(one, UseKind::Int32)));
    }
}
