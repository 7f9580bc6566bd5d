//! End-to-end behaviour of the fixup phase on small graphs
//!
//! One module per headline transformation: integer adds, mixed adds,
//! string concatenation, typed array loads and local unboxing.

mod common;

use common::{fixup, ops, position, use_kinds};
use pretty_assertions::assert_eq;
use quicksilver_dfg::profiling::StringPrototypeSnapshot;
use quicksilver_dfg::speculation::TypedArrayType;
use quicksilver_dfg::{
    ArrayMode, ArrayType, Edge, GraphBuilder, NodeType, ProfileSnapshot, SpeculatedType, UseKind,
};

mod integer_add {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_int_plus_int_keeps_opcode_and_inserts_nothing() {
        let mut b = GraphBuilder::new();
        let x = b.value(SpeculatedType::INT32);
        let y = b.value(SpeculatedType::INT32);
        let add = b.binary(NodeType::ValueAdd, x, y, SpeculatedType::INT32);
        let mut graph = b.finish();
        let before = ops(&graph, 0);

        let stats = fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(graph[add].op(), NodeType::ValueAdd);
        assert_eq!(use_kinds(&graph, add), vec![UseKind::Int32, UseKind::Int32]);
        assert_eq!(ops(&graph, 0), before);
        assert_eq!(stats.nodes_inserted, 0);
    }

    #[test]
    fn test_arith_add_on_integers() {
        let mut b = GraphBuilder::new();
        let x = b.value(SpeculatedType::INT32);
        let y = b.value(SpeculatedType::INT32);
        let add = b.binary(NodeType::ArithAdd, x, y, SpeculatedType::INT32);
        let mut graph = b.finish();

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(graph.child(add, 0), Some(Edge::new(x, UseKind::Int32)));
        assert_eq!(graph.child(add, 1), Some(Edge::new(y, UseKind::Int32)));
    }
}

mod mixed_add {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_int_plus_double_converts_the_int_operand() {
        let mut b = GraphBuilder::new();
        let x = b.value(SpeculatedType::INT32);
        let y = b.value(SpeculatedType::DOUBLE_REAL);
        let add = b.binary(NodeType::ArithAdd, x, y, SpeculatedType::DOUBLE);
        let mut graph = b.finish();

        let stats = fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(stats.nodes_inserted, 1);
        assert_eq!(use_kinds(&graph, add), vec![UseKind::Number, UseKind::Number]);

        let conversion = graph.child_node(add, 0);
        assert_eq!(graph[conversion].op(), NodeType::Int32ToDouble);
        assert_eq!(graph.child(conversion, 0), Some(Edge::new(x, UseKind::Number)));
        assert_eq!(graph.child(add, 1), Some(Edge::new(y, UseKind::Number)));
        assert_eq!(position(&graph, 0, conversion) + 1, position(&graph, 0, add));
    }
}

mod string_concatenation {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_string_plus_unknown_goes_through_to_primitive_and_to_string() {
        let mut b = GraphBuilder::new();
        let a = b.value(SpeculatedType::STRING);
        let unknown = b.value(SpeculatedType::TOP);
        let add = b.binary(NodeType::ValueAdd, a, unknown, SpeculatedType::STRING);
        let mut graph = b.finish();
        let oracle =
            ProfileSnapshot::new().with_string_prototype(StringPrototypeSnapshot::modified());

        fixup(&mut graph, &oracle);

        assert_eq!(graph[add].op(), NodeType::MakeRope);
        assert_eq!(graph.child(add, 0), Some(Edge::new(a, UseKind::KnownString)));

        let to_string = graph.child_node(add, 1);
        assert_eq!(graph[to_string].op(), NodeType::ToString);
        let to_primitive = graph.child_node(to_string, 0);
        assert_eq!(graph[to_primitive].op(), NodeType::ToPrimitive);
        assert_eq!(graph.child(to_primitive, 0), Some(Edge::untyped(unknown)));

        // The string check on `a` comes before anything that touches the
        // other operand
        let block = graph.block(0).unwrap();
        let check = block
            .nodes
            .iter()
            .copied()
            .find(|node| {
                graph[*node].op() == NodeType::Phantom
                    && graph.child(*node, 0) == Some(Edge::new(a, UseKind::String))
            })
            .expect("string check on the left operand");
        assert!(position(&graph, 0, check) < position(&graph, 0, to_primitive));
        assert!(position(&graph, 0, to_primitive) < position(&graph, 0, to_string));
        assert!(position(&graph, 0, to_string) < position(&graph, 0, add));
    }
}

mod typed_array_load {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_int8_array_load_gets_guard() {
        let mut b = GraphBuilder::new();
        let array = b.value(SpeculatedType::INT8_ARRAY);
        let index = b.value(SpeculatedType::INT32);
        let load = b.get_by_val(
            array,
            index,
            ArrayMode::new(ArrayType::SelectUsingPredictions),
            SpeculatedType::INT32,
        );
        let mut graph = b.finish();

        fixup(&mut graph, &ProfileSnapshot::new());

        assert_eq!(
            graph[load].array_mode().ty,
            ArrayType::TypedArray(TypedArrayType::Int8)
        );
        assert_eq!(graph.child(load, 0), Some(Edge::new(array, UseKind::KnownCell)));
        assert_eq!(graph.child(load, 1), Some(Edge::new(index, UseKind::Int32)));

        let guard = graph.block(0).unwrap().at(2);
        assert_eq!(graph[guard].op(), NodeType::CheckArray);
        assert_eq!(graph.child(guard, 0), Some(Edge::new(array, UseKind::Cell)));
        assert!(position(&graph, 0, guard) < position(&graph, 0, load));
        assert!(!graph[load].array_mode().does_conversion());
    }
}

mod local_unboxing {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integer_local_is_unboxed_and_every_write_retagged() {
        let mut b = GraphBuilder::new();
        let i = b.variable(0, SpeculatedType::INT32);
        let zero = b.int32(0);
        let one = b.int32(1);
        let first_write = b.set_local(i, zero);
        let read = b.get_local(i);
        let next = b.binary(NodeType::ArithAdd, read, one, SpeculatedType::INT32);
        let second_write = b.set_local(i, next);
        let again = b.get_local(i);
        b.binary(NodeType::ArithSub, again, one, SpeculatedType::INT32);
        let mut graph = b.finish();

        let stats = fixup(&mut graph, &ProfileSnapshot::new());

        assert!(graph.variable(i).is_profitable_to_unbox());
        assert_eq!(graph.child(first_write, 0), Some(Edge::new(zero, UseKind::Int32)));
        assert_eq!(graph.child(second_write, 0), Some(Edge::new(next, UseKind::Int32)));
        assert!(stats.fixpoint_sweeps >= 1);
        assert!(stats.fixpoint_sweeps <= graph.variable_count() + 1);
    }
}
