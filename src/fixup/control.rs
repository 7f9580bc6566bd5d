//! Boolean conversions and control flow

use super::{Cursor, FixupPhase, SpeculationDirection};
use crate::ir::{EdgeRef, NodeId, NodeType, SwitchKind, UseKind};
use tracing::trace;

impl FixupPhase<'_> {
    /// Shared by `LogicalNot` and `Branch`: pick the cheapest truthiness test
    fn fixup_truthiness_operand(&mut self, cur: Cursor) {
        let slot = cur.slot(0);
        let prediction = self.prediction(slot);
        if prediction.is_boolean() {
            self.set_use_kind_and_unbox(slot, UseKind::Boolean);
        } else if prediction.is_object_or_other() {
            self.set_use_kind_and_unbox(slot, UseKind::ObjectOrOther);
        } else if prediction.is_int32() {
            self.set_use_kind_and_unbox(slot, UseKind::Int32);
        } else if prediction.is_number() {
            self.fix_double_edge(cur, slot, UseKind::Number, SpeculationDirection::Backward);
        }
    }

    pub(super) fn fixup_logical_not(&mut self, cur: Cursor) {
        self.fixup_truthiness_operand(cur);
    }

    pub(super) fn fixup_branch(&mut self, cur: Cursor) {
        self.fixup_truthiness_operand(cur);

        // Branch(LogicalNot(x)) becomes Branch(x) with the targets swapped,
        // as long as nothing between the two can exit
        let condition = self.graph.child_node(cur.node, 0);
        if self.graph[condition].op() != NodeType::LogicalNot {
            return;
        }
        if !self.nothing_exits_since(cur, condition) {
            return;
        }
        let inner = self.edge_at(EdgeRef::new(condition, 0));
        if !self.graph[inner.node].op().has_boolean_result() {
            return;
        }

        self.graph.set_edge(cur.slot(0), Some(inner));
        let (taken, not_taken) = self.graph[cur.node].branch_targets();
        self.graph[cur.node].set_branch_targets(not_taken, taken);
        trace!(branch = %cur.node, %condition, "folded negation into branch");
    }

    /// Walk back from the cursor to `target`. False if a node on the way can
    /// exit, or if `target` is not earlier in this block.
    fn nothing_exits_since(&self, cur: Cursor, target: NodeId) -> bool {
        let Some(block) = self.graph.block(cur.block) else {
            return false;
        };
        for &candidate in block.nodes[..cur.index].iter().rev() {
            if candidate == target {
                return true;
            }
            if self.graph.can_exit(candidate) {
                return false;
            }
        }
        false
    }

    pub(super) fn fixup_switch(&mut self, cur: Cursor) {
        let slot = cur.slot(0);
        let prediction = self.prediction(slot);
        match self.graph[cur.node].switch_data().kind {
            SwitchKind::Imm => {
                if prediction.is_int32() {
                    self.set_use_kind_and_unbox(slot, UseKind::Int32);
                }
            }
            SwitchKind::Char => {
                if prediction.is_string() {
                    self.set_use_kind_and_unbox(slot, UseKind::String);
                }
            }
            SwitchKind::String => {
                if prediction.is_string_ident() {
                    self.set_use_kind_and_unbox(slot, UseKind::StringIdent);
                } else if prediction.is_string() {
                    self.set_use_kind_and_unbox(slot, UseKind::String);
                }
            }
        }
    }
}
