//! `this` conversion, type queries and object-shape operations

use super::Cursor;
use super::FixupPhase;
use crate::ir::{ArrayType, Edge, EdgeRef, Node, NodeType, UseKind};
use crate::speculation::SpeculatedType;
use tracing::trace;

impl FixupPhase<'_> {
    pub(super) fn fixup_type_of(&mut self, cur: Cursor) {
        let slot = cur.slot(0);
        let prediction = self.prediction(slot);
        if prediction.is_string() {
            self.set_use_kind_and_unbox(slot, UseKind::String);
        } else if prediction.is_cell() {
            self.set_use_kind_and_unbox(slot, UseKind::Cell);
        }
    }

    /// `this` that is provably `undefined`/`null` or a plain object needs no
    /// conversion
    pub(super) fn fixup_to_this(&mut self, cur: Cursor) {
        let slot = cur.slot(0);
        let prediction = self.prediction(slot);
        let origin = self.origin(cur.node);

        if prediction.is_other() {
            if self.oracle.is_strict_mode(origin) {
                self.set_use_kind_and_unbox(slot, UseKind::Other);
                self.graph[cur.node].convert_to_identity();
                return;
            }

            // Sloppy mode substitutes the global object, keeping the check
            let edge = self.edge_at(slot);
            self.insert(
                cur,
                Node::new(NodeType::Phantom, origin).with_edge(Edge::new(edge.node, UseKind::Other)),
            );
            self.observe_use_kind_on_node(edge.node, UseKind::Other);
            let global = self.oracle.global_this_object(origin);
            self.graph[cur.node].convert_to_weak_constant(global);
            trace!(node = %cur.node, cell = global.0, "this folded to global object");
            return;
        }

        if prediction.is_final_object() {
            self.set_use_kind_and_unbox(slot, UseKind::Object);
            self.graph[cur.node].convert_to_identity();
        }
    }

    pub(super) fn fixup_check_array(&mut self, cur: Cursor) {
        let use_kind = match self.graph[cur.node].array_mode().ty {
            ArrayType::String => UseKind::String,
            _ => UseKind::Cell,
        };
        self.set_use_kind_and_unbox(cur.slot(0), use_kind);
    }

    pub(super) fn fixup_arrayify(&mut self, cur: Cursor) {
        self.set_use_kind_and_unbox(cur.slot(0), UseKind::Cell);
        if self.graph.edge(cur.slot(1)).is_some() {
            self.set_use_kind_and_unbox(cur.slot(1), UseKind::Int32);
        }
    }

    /// `GetByOffset(storage, base)` and `PutByOffset(storage, base, value)`
    pub(super) fn fixup_by_offset(&mut self, cur: Cursor) {
        let storage = self.edge_at(cur.slot(0));
        if !self.graph[storage.node].op().has_storage_result() {
            self.set_use_kind_and_unbox(cur.slot(0), UseKind::KnownCell);
        }
        self.set_use_kind_and_unbox(cur.slot(1), UseKind::KnownCell);
    }

    pub(super) fn fixup_instance_of(&mut self, cur: Cursor) {
        // Redundant: CheckHasInstance already proved what this cell check
        // asserts. Kept on purpose, and only for a value that is always a cell
        let value = cur.slot(0);
        if (self.prediction(value) - SpeculatedType::CELL).is_empty() {
            self.set_use_kind_and_unbox(value, UseKind::Cell);
        }
        self.set_use_kind_and_unbox(EdgeRef::new(cur.node, 1), UseKind::Cell);
    }
}
