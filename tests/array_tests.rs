//! Indexed access, array allocation and `length` rewriting

mod common;

use common::{fixup, ops, position, use_kinds};
use pretty_assertions::assert_eq;
use quicksilver_dfg::ir::{ArrayClass, ArrayConversion, CodeOrigin, IndexingShape};
use quicksilver_dfg::{
    run_fixup_phase_with_config, ArrayMode, ArrayType, Edge, FixupConfig, GraphBuilder, NodeFlags,
    NodeType, ProfileSnapshot, SpeculatedType, TargetArch, UseKind,
};

mod stores {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_int_into_double_array_is_converted_after_the_guard() {
        let mut b = GraphBuilder::new();
        let array = b.value(SpeculatedType::ARRAY);
        let index = b.value(SpeculatedType::INT32);
        let value = b.value(SpeculatedType::INT32);
        let store = b.put_by_val(array, index, value, ArrayMode::new(ArrayType::Double));
        let mut graph = b.finish();

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(
            ops(&graph, 0),
            vec![
                NodeType::GetGlobalVar,
                NodeType::GetGlobalVar,
                NodeType::GetGlobalVar,
                NodeType::CheckArray,
                NodeType::GetButterfly,
                NodeType::Int32ToDouble,
                NodeType::PutByVal,
            ]
        );
        let conversion = graph.child_node(store, 2);
        assert_eq!(graph[conversion].op(), NodeType::Int32ToDouble);
        assert_eq!(graph.child(store, 2).map(|edge| edge.use_kind), Some(UseKind::RealNumber));
        assert_eq!(graph.child(store, 0), Some(Edge::new(array, UseKind::KnownCell)));
        assert_eq!(graph.child(store, 1), Some(Edge::new(index, UseKind::Int32)));
        let butterfly = graph.block(0).unwrap().at(4);
        assert_eq!(graph.child(store, 3), Some(Edge::untyped(butterfly)));
    }

    #[test]
    fn test_object_into_int32_array_converts_to_contiguous() {
        let mut b = GraphBuilder::new();
        let array = b.value(SpeculatedType::ARRAY);
        let index = b.value(SpeculatedType::INT32);
        let value = b.value(SpeculatedType::FINAL_OBJECT);
        let store = b.put_by_val(array, index, value, ArrayMode::new(ArrayType::Int32));
        let mut graph = b.finish();

        fixup(&mut graph, &ProfileSnapshot::new());

        let mode = graph[store].array_mode();
        assert_eq!(mode.ty, ArrayType::Contiguous);
        assert_eq!(mode.conversion, ArrayConversion::Convert);

        let arrayify = graph.block(0).unwrap().at(3);
        assert_eq!(graph[arrayify].op(), NodeType::Arrayify);
        assert_eq!(use_kinds(&graph, arrayify), vec![UseKind::Cell, UseKind::Int32]);
        assert_eq!(graph.child(store, 2), Some(Edge::untyped(value)));
    }

    #[test]
    fn test_arguments_store_is_guarded_but_generic() {
        let mut b = GraphBuilder::new();
        let arguments = b.value(SpeculatedType::ARGUMENTS);
        let index = b.value(SpeculatedType::INT32);
        let value = b.value(SpeculatedType::INT32);
        let store = b.put_by_val(
            arguments,
            index,
            value,
            ArrayMode::new(ArrayType::SelectUsingPredictions),
        );
        let mut graph = b.finish();

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(graph[store].array_mode().ty, ArrayType::Arguments);
        assert!(ops(&graph, 0).contains(&NodeType::CheckArray));
        assert_eq!(graph.child(store, 3), None);
        assert_eq!(graph.child(store, 0), Some(Edge::untyped(arguments)));
    }

    #[test]
    fn test_generic_store_speculates_cell_only_on_32_64() {
        let build = || {
            let mut b = GraphBuilder::new();
            let object = b.value(SpeculatedType::FINAL_OBJECT);
            let key = b.value(SpeculatedType::STRING);
            let value = b.value(SpeculatedType::INT32);
            let store = b.put_by_val(object, key, value, ArrayMode::new(ArrayType::Int32));
            (b.finish(), store, object)
        };

        let (mut graph, store, object) = build();
        fixup(&mut graph, &ProfileSnapshot::new());
        assert_eq!(graph[store].array_mode().ty, ArrayType::Generic);
        assert_eq!(graph.child(store, 0), Some(Edge::untyped(object)));

        let (mut graph, store, object) = build();
        run_fixup_phase_with_config(
            &mut graph,
            &ProfileSnapshot::new(),
            &FixupConfig::for_target(TargetArch::X86),
        );
        assert_eq!(graph.child(store, 0), Some(Edge::new(object, UseKind::Cell)));
    }
}

mod push_and_pop {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_double_onto_double_array() {
        let mut b = GraphBuilder::new();
        let array = b.value(SpeculatedType::ARRAY | SpeculatedType::OTHER);
        let value = b.value(SpeculatedType::DOUBLE_REAL);
        let push = b.binary(NodeType::ArrayPush, array, value, SpeculatedType::INT32);
        let mut graph = b.finish();
        graph[push].set_array_mode(ArrayMode::new(ArrayType::Double));

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(graph.child(push, 0), Some(Edge::new(array, UseKind::KnownCell)));
        assert_eq!(graph.child(push, 1), Some(Edge::new(value, UseKind::RealNumber)));
        let guard = graph.block(0).unwrap().at(2);
        assert_eq!(graph[guard].op(), NodeType::CheckArray);
        assert!(graph.child(push, 2).is_some());
    }

    #[test]
    fn test_pop_guards_and_loads_storage() {
        let mut b = GraphBuilder::new();
        let array = b.value(SpeculatedType::ARRAY);
        let pop = b.unary(NodeType::ArrayPop, array, SpeculatedType::INT32);
        let mut graph = b.finish();
        graph[pop].set_array_mode(ArrayMode::new(ArrayType::Contiguous));

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(
            ops(&graph, 0),
            vec![
                NodeType::GetGlobalVar,
                NodeType::CheckArray,
                NodeType::GetButterfly,
                NodeType::ArrayPop,
            ]
        );
        assert_eq!(graph.child(pop, 0), Some(Edge::new(array, UseKind::KnownCell)));
    }
}

mod string_characters {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_char_code_at_uses_string_storage() {
        let mut b = GraphBuilder::new();
        let s = b.value(SpeculatedType::STRING);
        let index = b.value(SpeculatedType::INT32);
        let access = b.binary(NodeType::StringCharCodeAt, s, index, SpeculatedType::INT32);
        let mut graph = b.finish();
        graph[access].set_array_mode(ArrayMode::new(ArrayType::String));

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(graph.child(access, 0), Some(Edge::new(s, UseKind::KnownCell)));
        assert_eq!(graph.child(access, 1), Some(Edge::new(index, UseKind::Int32)));
        let storage = graph.child_node(access, 2);
        assert_eq!(graph[storage].op(), NodeType::GetIndexedPropertyStorage);
        assert!(position(&graph, 0, storage) < position(&graph, 0, access));
    }
}

mod allocation {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mixed_literal_widens_to_double() {
        let mut b = GraphBuilder::new();
        let one = b.int32(1);
        let half = b.double(0.5);
        let array = b.new_array(&[one, half], IndexingShape::Undecided);
        let mut graph = b.finish();

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(graph[array].indexing_shape(), IndexingShape::Double);
        let first = graph.child(array, 0).unwrap();
        assert_eq!(graph[first.node].op(), NodeType::Int32ToDouble);
        assert_eq!(first.use_kind, UseKind::RealNumber);
        assert_eq!(graph.child(array, 1), Some(Edge::new(half, UseKind::RealNumber)));
    }

    #[test]
    fn test_literal_with_objects_is_contiguous() {
        let mut b = GraphBuilder::new();
        let one = b.int32(1);
        let object = b.value(SpeculatedType::FINAL_OBJECT);
        let array = b.new_array(&[one, object], IndexingShape::Undecided);
        let mut graph = b.finish();

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(graph[array].indexing_shape(), IndexingShape::Contiguous);
        assert_eq!(use_kinds(&graph, array), vec![UseKind::Untyped, UseKind::Untyped]);
    }

    #[test]
    fn test_typed_array_with_int_length_is_not_must_generate() {
        let mut b = GraphBuilder::new();
        let length = b.value(SpeculatedType::INT32);
        let array = b.unary(NodeType::NewTypedArray, length, SpeculatedType::UINT8_ARRAY);
        let mut graph = b.finish();

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(graph.child(array, 0), Some(Edge::new(length, UseKind::Int32)));
        assert!(!graph[array].flags().intersects(NodeFlags::MUST_GENERATE));
    }
}

mod length {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_string_length_reads_directly() {
        let mut b = GraphBuilder::new();
        let s = b.value(SpeculatedType::STRING);
        let length = b.get_by_id(s, "length", SpeculatedType::INT32);
        let mut graph = b.finish();

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(graph[length].op(), NodeType::GetArrayLength);
        assert_eq!(graph[length].array_mode().ty, ArrayType::String);
        assert_eq!(graph.child(length, 0), Some(Edge::new(s, UseKind::KnownCell)));
        // Strings are not JS arrays, so no storage is loaded
        assert_eq!(graph.child(length, 1), None);
    }

    #[test]
    fn test_profiled_array_length_loads_butterfly() {
        let mut b = GraphBuilder::new();
        let array = b.value(SpeculatedType::ARRAY);
        let length = b.get_by_id(array, "length", SpeculatedType::INT32);
        let mut graph = b.finish();
        let origin: CodeOrigin = graph[length].origin();
        let oracle = ProfileSnapshot::new().with_array_profile(
            origin,
            ArrayMode::new(ArrayType::Int32).with_class(ArrayClass::Array),
        );

        fixup(&mut graph, &oracle);

        assert_eq!(graph[length].op(), NodeType::GetArrayLength);
        let storage = graph.child_node(length, 1);
        assert_eq!(graph[storage].op(), NodeType::GetButterfly);
    }

    #[test]
    fn test_length_not_predicted_int_stays_generic() {
        let mut b = GraphBuilder::new();
        let array = b.value(SpeculatedType::ARRAY);
        let length = b.get_by_id(array, "length", SpeculatedType::DOUBLE);
        let mut graph = b.finish();

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(graph[length].op(), NodeType::GetById);
        assert_eq!(graph.child(length, 0), Some(Edge::untyped(array)));
    }
}
