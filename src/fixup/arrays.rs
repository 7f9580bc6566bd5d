//! Indexed access and array rules
//!
//! Each indexed access carries an [`ArrayMode`]. The mode is refined from
//! the operand predictions, and a specific mode gets a guard inserted before
//! the access: a structure or array-class check, or an in-place conversion
//! of the receiver. When the access reads through a storage pointer, the
//! pointer is loaded once by an inserted node and wired into the access's
//! storage slot.
//!
//! `length`, `byteLength` and `byteOffset` property reads on arrays, strings
//! and typed arrays are rewritten into direct loads here as well.

use super::{Cursor, FixupPhase, SpeculationDirection};
use crate::error::invariant_violation;
use crate::ir::{
    ArrayClass, ArrayMode, ArraySpeculation, ArrayType, CodeOrigin, Edge, IndexingShape,
    JsConstant, Node, NodeFlags, NodeId, NodeType, OpInfo, UseKind,
};
use crate::profiling::ExitKind;
use crate::speculation::SpeculatedType;
use tracing::trace;

/// Whether an access in a given mode wants a storage pointer
type StorageCheck = fn(ArrayMode) -> bool;

impl FixupPhase<'_> {
    pub(super) fn fixup_get_by_val(&mut self, cur: Cursor) {
        let node = cur.node;
        let mode = self.graph[node].array_mode().refine(
            self.prediction(cur.slot(0)),
            self.prediction(cur.slot(1)),
            SpeculatedType::empty(),
            self.graph[node].flags(),
        );
        self.graph[node].set_array_mode(mode);

        self.bless_array_operation(cur, 0, Some(1), 2);

        let origin = self.origin(node);
        let mode = self.graph[node].array_mode();
        match mode.ty {
            ArrayType::Double
                if mode.class == ArrayClass::OriginalArray
                    && mode.speculation == ArraySpeculation::InBounds
                    && self.oracle.array_prototype_chain_is_sane(origin)
                    && !self.graph[node].flags().contains(NodeFlags::USED_AS_OTHER) =>
            {
                self.graph[node].set_array_mode(mode.with_speculation(ArraySpeculation::SaneChain));
            }
            ArrayType::String => {
                let prediction = self.graph[node].prediction();
                if !(prediction - SpeculatedType::STRING).is_empty()
                    || self.oracle.has_exit_site(origin, ExitKind::OutOfBounds)
                {
                    self.graph[node]
                        .set_array_mode(mode.with_speculation(ArraySpeculation::OutOfBounds));
                }
            }
            _ => {}
        }

        match mode.ty {
            ArrayType::SelectUsingPredictions | ArrayType::Unprofiled | ArrayType::Undecided => {
                invariant_violation(format_args!(
                    "{} left with unrefined array mode {}",
                    node, mode
                ))
            }
            ArrayType::Generic => {
                if self.config.speculate_cell_for_generic_access() {
                    self.set_use_kind_and_unbox(cur.slot(0), UseKind::Cell);
                }
            }
            ArrayType::ForceExit => {}
            _ => {
                self.set_use_kind_and_unbox(cur.slot(0), UseKind::KnownCell);
                self.set_use_kind_and_unbox(cur.slot(1), UseKind::Int32);
            }
        }
    }

    /// `PutByVal` and `PutByValAlias`: base, index, value, storage
    pub(super) fn fixup_put_by_val(&mut self, cur: Cursor) {
        let node = cur.node;
        let (base, index, value) = (cur.slot(0), cur.slot(1), cur.slot(2));

        let mode = self.graph[node].array_mode().refine(
            self.prediction(base),
            self.prediction(index),
            self.prediction(value),
            NodeFlags::empty(),
        );
        self.graph[node].set_array_mode(mode);

        self.bless_array_operation(cur, 0, Some(1), 3);

        let mode = self.graph[node].array_mode().mode_for_put();
        match mode.ty {
            ArrayType::SelectUsingPredictions | ArrayType::Unprofiled | ArrayType::Undecided => {
                invariant_violation(format_args!(
                    "{} left with unrefined array mode {}",
                    node, mode
                ))
            }
            ArrayType::ForceExit | ArrayType::Generic => {
                if self.config.speculate_cell_for_generic_access() {
                    self.set_use_kind_and_unbox(base, UseKind::Cell);
                }
            }
            ArrayType::Int32 => {
                self.set_use_kind_and_unbox(base, UseKind::KnownCell);
                self.set_use_kind_and_unbox(index, UseKind::Int32);
                self.set_use_kind_and_unbox(value, UseKind::Int32);
            }
            ArrayType::Double => {
                self.set_use_kind_and_unbox(base, UseKind::KnownCell);
                self.set_use_kind_and_unbox(index, UseKind::Int32);
                self.fix_double_edge(
                    cur,
                    value,
                    UseKind::RealNumber,
                    SpeculationDirection::Backward,
                );
            }
            ArrayType::TypedArray(kind) => {
                self.set_use_kind_and_unbox(base, UseKind::KnownCell);
                self.set_use_kind_and_unbox(index, UseKind::Int32);
                if !kind.is_float() && self.prediction(value).is_int32() {
                    self.set_use_kind_and_unbox(value, UseKind::Int32);
                } else {
                    self.fix_double_edge(
                        cur,
                        value,
                        UseKind::Number,
                        SpeculationDirection::Backward,
                    );
                }
            }
            _ => {
                self.set_use_kind_and_unbox(base, UseKind::KnownCell);
                self.set_use_kind_and_unbox(index, UseKind::Int32);
            }
        }
    }

    pub(super) fn fixup_array_push(&mut self, cur: Cursor) {
        // A push is a store at an int32 index the caller never sees
        let mode = self.graph[cur.node].array_mode().refine(
            self.prediction(cur.slot(0)) & SpeculatedType::CELL,
            SpeculatedType::INT32,
            self.prediction(cur.slot(1)),
            NodeFlags::empty(),
        );
        self.graph[cur.node].set_array_mode(mode);

        self.bless_array_operation(cur, 0, None, 2);
        self.set_use_kind_and_unbox(cur.slot(0), UseKind::KnownCell);

        match self.graph[cur.node].array_mode().ty {
            ArrayType::Int32 => self.set_use_kind_and_unbox(cur.slot(1), UseKind::Int32),
            ArrayType::Double => self.fix_double_edge(
                cur,
                cur.slot(1),
                UseKind::RealNumber,
                SpeculationDirection::Backward,
            ),
            _ => {}
        }
    }

    pub(super) fn fixup_array_pop(&mut self, cur: Cursor) {
        self.bless_array_operation(cur, 0, None, 1);
        self.set_use_kind_and_unbox(cur.slot(0), UseKind::KnownCell);
    }

    pub(super) fn fixup_string_char_access(&mut self, cur: Cursor) {
        debug_assert_eq!(self.graph[cur.node].array_mode().ty, ArrayType::String);
        self.bless_array_operation(cur, 0, Some(1), 2);
        self.set_use_kind_and_unbox(cur.slot(0), UseKind::KnownCell);
        self.set_use_kind_and_unbox(cur.slot(1), UseKind::Int32);
    }

    pub(super) fn fixup_new_array(&mut self, cur: Cursor) {
        let node = cur.node;
        let count = self.graph.child_slots(node);

        let mut shape = self.graph[node].indexing_shape();
        for index in (0..count).rev() {
            shape = shape.least_upper_bound(self.prediction(cur.slot(index)));
        }
        self.graph[node].set_indexing_shape(shape);

        match shape {
            IndexingShape::Blank => invariant_violation(format_args!(
                "{} has a blank indexing shape after merging its elements",
                node
            )),
            IndexingShape::Undecided => {
                if count > 0 {
                    // Elements that were never observed: the allocation can't
                    // be trusted
                    self.insert_force_exit(cur);
                }
            }
            IndexingShape::Int32 => {
                for index in 0..count {
                    self.set_use_kind_and_unbox(cur.slot(index), UseKind::Int32);
                }
            }
            IndexingShape::Double => {
                for index in 0..count {
                    self.fix_double_edge(
                        cur,
                        cur.slot(index),
                        UseKind::RealNumber,
                        SpeculationDirection::Backward,
                    );
                }
            }
            IndexingShape::Contiguous | IndexingShape::ArrayStorage => {}
        }
    }

    pub(super) fn fixup_new_typed_array(&mut self, cur: Cursor) {
        if self.prediction(cur.slot(0)).is_int32() {
            self.set_use_kind_and_unbox(cur.slot(0), UseKind::Int32);
            self.graph[cur.node].clear_flags(NodeFlags::MUST_GENERATE | NodeFlags::CLOBBERS_WORLD);
        }
    }

    // ---- Guards ----

    /// Guard an access according to its mode and wire in its storage
    fn bless_array_operation(
        &mut self,
        cur: Cursor,
        base: usize,
        index: Option<usize>,
        storage: usize,
    ) {
        let mode = self.graph[cur.node].array_mode();
        match mode.ty {
            ArrayType::ForceExit => self.insert_force_exit(cur),
            ArrayType::SelectUsingPredictions | ArrayType::Unprofiled | ArrayType::Undecided => {
                invariant_violation(format_args!(
                    "blessing {} with unrefined array mode {}",
                    cur.node, mode
                ))
            }
            ArrayType::Generic => {}
            _ => {
                let array = self.edge_at(cur.slot(base)).node;
                let index = index.map(|index| self.edge_at(cur.slot(index)).node);
                let origin = self.origin(cur.node);
                if let Some(pointer) =
                    self.check_array(cur, mode, origin, array, index, ArrayMode::can_cse_storage)
                {
                    self.graph
                        .set_edge(cur.slot(storage), Some(Edge::untyped(pointer)));
                }
            }
        }
    }

    /// Insert the guard that establishes `mode` for `array`, then the
    /// storage load if `wants_storage` asks for one
    fn check_array(
        &mut self,
        cur: Cursor,
        mode: ArrayMode,
        origin: CodeOrigin,
        array: NodeId,
        index: Option<NodeId>,
        wants_storage: StorageCheck,
    ) -> Option<NodeId> {
        if !mode.is_specific() {
            invariant_violation(format_args!("checking array against non-specific mode {}", mode));
        }

        let structure = mode.original_array_structure(self.oracle, origin);
        let index_edge = index.map(|index| Edge::new(index, UseKind::Int32));

        let guard = if mode.does_conversion() {
            let node = match structure {
                Some(structure) => Node::new(NodeType::ArrayifyToStructure, origin)
                    .with_info(OpInfo::StructureAndArrayMode(structure, mode)),
                None => {
                    Node::new(NodeType::Arrayify, origin).with_info(OpInfo::ArrayMode(mode))
                }
            };
            node.with_edge(Edge::new(array, UseKind::Cell))
                .with_child(index_edge)
        } else {
            let node = match structure {
                Some(structure) => {
                    Node::new(NodeType::CheckStructure, origin).with_info(OpInfo::Structure(structure))
                }
                None => Node::new(NodeType::CheckArray, origin).with_info(OpInfo::ArrayMode(mode)),
            };
            node.with_edge(Edge::new(array, UseKind::Cell))
        };
        let guard = self.insert(cur, guard);
        trace!(%guard, %array, %mode, "array guard");

        if !wants_storage(mode) {
            return None;
        }

        let storage = if mode.uses_butterfly() {
            Node::new(NodeType::GetButterfly, origin).with_edge(Edge::new(array, UseKind::Cell))
        } else {
            Node::new(NodeType::GetIndexedPropertyStorage, origin)
                .with_info(OpInfo::ArrayMode(mode))
                .with_edge(Edge::new(array, UseKind::KnownCell))
        };
        Some(self.insert(cur, storage))
    }

    fn insert_force_exit(&mut self, cur: Cursor) {
        let origin = self.origin(cur.node);
        let exit = self.insert(cur, Node::new(NodeType::ForceOSRExit, origin));
        trace!(%exit, before = %cur.node, "forced exit");
    }

    // ---- Property reads ----

    pub(super) fn fixup_get_by_id(&mut self, cur: Cursor) {
        if !self.prediction(cur.slot(0)).is_cell() {
            return;
        }
        let name = self.graph[cur.node]
            .identifier()
            .and_then(|identifier| self.graph.identifier_name(identifier));

        match name {
            Some("length") => {
                self.attempt_to_make_get_array_length(cur);
            }
            Some("byteLength") => {
                self.attempt_to_make_get_typed_array_byte_length(cur);
            }
            Some("byteOffset") => {
                self.attempt_to_make_get_typed_array_byte_offset(cur);
            }
            _ => self.set_use_kind_and_unbox(cur.slot(0), UseKind::Cell),
        }
    }

    fn attempt_to_make_get_array_length(&mut self, cur: Cursor) -> bool {
        let node = cur.node;
        if !self.graph[node].prediction().is_int32() {
            return false;
        }

        let origin = self.origin(node);
        let profiled = match self.oracle.array_profile(origin) {
            Some(mode) if mode.ty != ArrayType::Unprofiled => mode,
            _ => ArrayMode::new(ArrayType::SelectUsingPredictions),
        };
        let base = self.prediction(cur.slot(0));
        let mut mode = profiled.refine(
            base,
            self.graph[node].prediction(),
            SpeculatedType::empty(),
            NodeFlags::empty(),
        );

        if mode.ty == ArrayType::Generic {
            if base.is_string_object() {
                self.attempt_to_force_string_array_mode(cur, &mut mode, UseKind::StringObject);
            } else if base.is_string_or_string_object() {
                self.attempt_to_force_string_array_mode(
                    cur,
                    &mut mode,
                    UseKind::StringOrStringObject,
                );
            }
        }

        if !mode.supports_length() {
            return false;
        }
        self.convert_to_get_array_length(cur, mode);
        true
    }

    /// Read the length of a string object through the string it wraps
    fn attempt_to_force_string_array_mode(
        &mut self,
        cur: Cursor,
        mode: &mut ArrayMode,
        use_kind: UseKind,
    ) {
        if !self.can_optimize_string_object_access(self.origin(cur.node)) {
            return;
        }
        self.create_to_string(cur, cur.slot(0), use_kind);
        *mode = ArrayMode::new(ArrayType::String);
    }

    fn convert_to_get_array_length(&mut self, cur: Cursor, mode: ArrayMode) {
        let node = cur.node;
        self.graph[node].set_op(NodeType::GetArrayLength);
        self.graph[node].clear_flags(NodeFlags::MUST_GENERATE | NodeFlags::CLOBBERS_WORLD);
        self.set_use_kind_and_unbox(cur.slot(0), UseKind::KnownCell);
        self.graph[node].set_info(OpInfo::ArrayMode(mode));

        let array = self.edge_at(cur.slot(0)).node;
        let origin = self.origin(node);
        if let Some(storage) =
            self.check_array(cur, mode, origin, array, None, ArrayMode::length_needs_storage)
        {
            self.graph
                .set_edge(cur.slot(1), Some(Edge::untyped(storage)));
        }
        trace!(%node, %mode, "length read became GetArrayLength");
    }

    fn prepend_get_array_length(
        &mut self,
        cur: Cursor,
        array: NodeId,
        mode: ArrayMode,
    ) -> NodeId {
        let origin = self.origin(cur.node);
        let storage = self.check_array(cur, mode, origin, array, None, ArrayMode::length_needs_storage);
        self.insert(
            cur,
            Node::new(NodeType::GetArrayLength, origin)
                .with_prediction(SpeculatedType::INT32)
                .with_info(OpInfo::ArrayMode(mode))
                .with_edge(Edge::new(array, UseKind::KnownCell))
                .with_child(storage.map(Edge::untyped)),
        )
    }

    fn attempt_to_make_get_typed_array_byte_length(&mut self, cur: Cursor) -> bool {
        let node = cur.node;
        if !self.graph[node].prediction().is_int32() {
            return false;
        }
        let Some(kind) = self.prediction(cur.slot(0)).typed_array_type() else {
            return false;
        };
        let mode = ArrayMode::new(ArrayType::TypedArray(kind));

        if kind.element_size() == 1 {
            self.convert_to_get_array_length(cur, mode);
            return true;
        }

        // byteLength = length << log2(element size)
        let array = self.edge_at(cur.slot(0)).node;
        let length = self.prepend_get_array_length(cur, array, mode);
        let shift = self.insert(
            cur,
            Node::new(NodeType::JSConstant, self.origin(node))
                .with_prediction(SpeculatedType::INT32)
                .with_info(OpInfo::Constant(JsConstant::Int32(
                    kind.log_element_size() as i32,
                ))),
        );

        self.graph[node].set_op(NodeType::BitLShift);
        self.graph[node].clear_flags(NodeFlags::MUST_GENERATE | NodeFlags::CLOBBERS_WORLD);
        self.graph[node].set_info(OpInfo::None);
        self.observe_use_kind_on_node(length, UseKind::Int32);
        self.observe_use_kind_on_node(shift, UseKind::Int32);
        self.graph.set_children(
            node,
            [
                Some(Edge::new(length, UseKind::Int32)),
                Some(Edge::new(shift, UseKind::Int32)),
                None,
            ],
        );
        trace!(%node, ?kind, "byteLength became a shifted length");
        true
    }

    fn attempt_to_make_get_typed_array_byte_offset(&mut self, cur: Cursor) -> bool {
        let node = cur.node;
        if !self.graph[node].prediction().is_int32() {
            return false;
        }
        let Some(kind) = self.prediction(cur.slot(0)).typed_array_type() else {
            return false;
        };

        let array = self.edge_at(cur.slot(0)).node;
        let origin = self.origin(node);
        self.check_array(
            cur,
            ArrayMode::new(ArrayType::TypedArray(kind)),
            origin,
            array,
            None,
            |_| false,
        );

        self.graph[node].set_op(NodeType::GetTypedArrayByteOffset);
        self.graph[node].clear_flags(NodeFlags::MUST_GENERATE | NodeFlags::CLOBBERS_WORLD);
        self.graph[node].set_info(OpInfo::None);
        self.set_use_kind_and_unbox(cur.slot(0), UseKind::KnownCell);
        true
    }
}
