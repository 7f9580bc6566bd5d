//! DFG node definitions
//!
//! A node is one operation of the data-flow graph: an opcode from the closed
//! [`NodeType`] set, up to three fixed child edges (or a range of var-arg
//! children stored in the graph), a prediction, behavioural flags, the
//! bytecode origin used for OSR exit, and an optional opcode payload.

use super::array_mode::{ArrayMode, IndexingShape};
use super::edge::Edge;
use super::graph::BlockIndex;
use super::variable::VariableId;
use crate::error::invariant_violation;
use crate::profiling::{CellId, StructureId};
use crate::speculation::SpeculatedType;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node in the graph's node arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(index: u32) -> Self {
        NodeId(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Identifier of an interned property name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierId(pub u32);

/// Bytecode location a node was generated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CodeOrigin {
    pub bytecode_index: u32,
    /// Depth of the inlined frame, 0 for the machine code block
    #[serde(default)]
    pub inline_depth: u32,
}

impl CodeOrigin {
    pub fn new(bytecode_index: u32) -> Self {
        Self {
            bytecode_index,
            inline_depth: 0,
        }
    }
}

impl fmt::Display for CodeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inline_depth == 0 {
            write!(f, "bc#{}", self.bytecode_index)
        } else {
            write!(f, "bc#{}/{}", self.bytecode_index, self.inline_depth)
        }
    }
}

bitflags! {
    /// Behavioural flags of a node
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct NodeFlags: u32 {
        /// Must not be eliminated even if its result is unused
        const MUST_GENERATE = 1 << 0;
        /// May run arbitrary code and invalidate anything the compiler knows
        const CLOBBERS_WORLD = 1 << 1;
        /// Speculation checks exit to the point after this node
        const EXITS_FORWARD = 1 << 2;

        // Arithmetic facts computed by prediction propagation
        const USED_AS_NUMBER = 1 << 8;
        const NEEDS_NEG_ZERO = 1 << 9;
        const USED_AS_OTHER = 1 << 10;
        const USED_AS_INT = 1 << 11;
        const MAY_OVERFLOW = 1 << 12;
        const MAY_NEG_ZERO = 1 << 13;

        const ARITH_MASK = Self::USED_AS_NUMBER.bits()
            | Self::NEEDS_NEG_ZERO.bits()
            | Self::USED_AS_OTHER.bits()
            | Self::USED_AS_INT.bits()
            | Self::MAY_OVERFLOW.bits()
            | Self::MAY_NEG_ZERO.bits();
    }
}

/// Constant payload of `JSConstant`/`WeakJSConstant`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsConstant {
    Int32(i32),
    Double(f64),
    Boolean(bool),
    String(String),
    Undefined,
    Null,
    Cell(CellId),
}

impl JsConstant {
    pub fn is_number(&self) -> bool {
        matches!(self, JsConstant::Int32(_) | JsConstant::Double(_))
    }

    /// The value as an int32 if it is exactly representable as one
    pub fn as_int32(&self) -> Option<i32> {
        match *self {
            JsConstant::Int32(value) => Some(value),
            JsConstant::Double(value) => {
                let truncated = value as i32;
                let exact = f64::from(truncated) == value;
                let negative_zero = value == 0.0 && value.is_sign_negative();
                (exact && !negative_zero).then_some(truncated)
            }
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match *self {
            JsConstant::Int32(value) => Some(f64::from(value)),
            JsConstant::Double(value) => Some(value),
            _ => None,
        }
    }

    /// Prediction a freshly materialized constant of this value carries
    pub fn speculated_type(&self) -> SpeculatedType {
        match self {
            JsConstant::Int32(_) => SpeculatedType::INT32,
            JsConstant::Double(value) if value.is_nan() => SpeculatedType::DOUBLE_NAN,
            JsConstant::Double(_) if self.as_int32().is_some() => SpeculatedType::INT32,
            JsConstant::Double(_) => SpeculatedType::DOUBLE_REAL,
            JsConstant::Boolean(_) => SpeculatedType::BOOLEAN,
            JsConstant::String(_) => SpeculatedType::STRING_IDENT,
            JsConstant::Undefined | JsConstant::Null => SpeculatedType::OTHER,
            JsConstant::Cell(_) => SpeculatedType::CELL_OTHER,
        }
    }
}

/// ECMAScript ToInt32 on a double
pub fn to_int32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    let truncated = value.trunc();
    let modulo = truncated.rem_euclid(4_294_967_296.0);
    if modulo >= 2_147_483_648.0 {
        (modulo - 4_294_967_296.0) as i32
    } else {
        modulo as i32
    }
}

impl fmt::Display for JsConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsConstant::Int32(value) => write!(f, "{}", value),
            JsConstant::Double(value) => write!(f, "{:?}", value),
            JsConstant::Boolean(value) => write!(f, "{}", value),
            JsConstant::String(value) => write!(f, "{:?}", value),
            JsConstant::Undefined => write!(f, "undefined"),
            JsConstant::Null => write!(f, "null"),
            JsConstant::Cell(cell) => write!(f, "cell#{}", cell.0),
        }
    }
}

/// Kind of a `Switch` node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchKind {
    Imm,
    Char,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: JsConstant,
    pub target: BlockIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchData {
    pub kind: SwitchKind,
    pub cases: Vec<SwitchCase>,
    pub fall_through: BlockIndex,
}

/// Opcode payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum OpInfo {
    #[default]
    None,
    Constant(JsConstant),
    Variable(VariableId),
    ArrayMode(ArrayMode),
    Identifier(IdentifierId),
    Structure(StructureId),
    StructureAndArrayMode(StructureId, ArrayMode),
    Indexing(IndexingShape),
    Branch {
        taken: BlockIndex,
        not_taken: BlockIndex,
    },
    Jump(BlockIndex),
    Switch(SwitchData),
}

/// Which payload variant an opcode requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    None,
    Constant,
    Variable,
    ArrayMode,
    Identifier,
    Structure,
    StructureAndArrayMode,
    Indexing,
    Branch,
    Jump,
    Switch,
    /// Anything goes (the node may carry a payload or not)
    Any,
}

impl OpInfo {
    pub fn kind(&self) -> PayloadKind {
        match self {
            OpInfo::None => PayloadKind::None,
            OpInfo::Constant(_) => PayloadKind::Constant,
            OpInfo::Variable(_) => PayloadKind::Variable,
            OpInfo::ArrayMode(_) => PayloadKind::ArrayMode,
            OpInfo::Identifier(_) => PayloadKind::Identifier,
            OpInfo::Structure(_) => PayloadKind::Structure,
            OpInfo::StructureAndArrayMode(..) => PayloadKind::StructureAndArrayMode,
            OpInfo::Indexing(_) => PayloadKind::Indexing,
            OpInfo::Branch { .. } => PayloadKind::Branch,
            OpInfo::Jump(_) => PayloadKind::Jump,
            OpInfo::Switch(_) => PayloadKind::Switch,
        }
    }
}

/// Number of children an opcode takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed { min: u8, max: u8 },
    VarArgs { min: u32, max: Option<u32> },
}

/// Representation of a node's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeResult {
    None,
    Js,
    Number,
    Int32,
    Boolean,
    Storage,
}

/// Number of fixed child slots per node
pub const FIXED_CHILDREN: usize = 3;

/// Children of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Children {
    Fixed([Option<Edge>; FIXED_CHILDREN]),
    /// Range into the graph's var-arg child table
    VarArgs { first: u32, count: u32 },
}

impl Default for Children {
    fn default() -> Self {
        Children::Fixed([None; FIXED_CHILDREN])
    }
}

macro_rules! node_types {
    ($($name:ident => ($arity:expr, $result:ident, $flags:expr, $payload:ident)),* $(,)?) => {
        /// Every DFG opcode
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum NodeType {
            $($name),*
        }

        impl NodeType {
            pub fn name(self) -> &'static str {
                match self {
                    $(NodeType::$name => stringify!($name)),*
                }
            }

            pub fn arity(self) -> Arity {
                match self {
                    $(NodeType::$name => $arity),*
                }
            }

            pub fn result(self) -> NodeResult {
                match self {
                    $(NodeType::$name => NodeResult::$result),*
                }
            }

            pub fn default_flags(self) -> NodeFlags {
                match self {
                    $(NodeType::$name => $flags),*
                }
            }

            pub fn payload_kind(self) -> PayloadKind {
                match self {
                    $(NodeType::$name => PayloadKind::$payload),*
                }
            }
        }
    };
}

const fn fixed(min: u8, max: u8) -> Arity {
    Arity::Fixed { min, max }
}

const fn var_args(min: u32, max: Option<u32>) -> Arity {
    Arity::VarArgs { min, max }
}

const NONE: NodeFlags = NodeFlags::empty();
const MG: NodeFlags = NodeFlags::MUST_GENERATE;
const MG_CW: NodeFlags = NodeFlags::MUST_GENERATE.union(NodeFlags::CLOBBERS_WORLD);

node_types! {
    // Constants
    JSConstant => (fixed(0, 0), Js, NONE, Constant),
    WeakJSConstant => (fixed(0, 0), Js, NONE, Constant),

    // Locals, arguments and OSR bookkeeping
    GetLocal => (fixed(0, 1), Js, NONE, Variable),
    SetLocal => (fixed(1, 1), None, MG, Variable),
    SetArgument => (fixed(0, 0), None, MG, Variable),
    Flush => (fixed(0, 1), None, MG, Variable),
    PhantomLocal => (fixed(0, 1), None, MG, Variable),
    GetLocalUnlinked => (fixed(0, 0), Js, NONE, Any),
    MovHint => (fixed(1, 1), None, NONE, Any),
    MovHintAndCheck => (fixed(1, 1), None, MG, Any),
    ZombieHint => (fixed(0, 0), None, NONE, Any),
    GetArgument => (fixed(0, 0), Js, NONE, Any),
    Phi => (fixed(0, 3), Js, NONE, Variable),
    Upsilon => (fixed(1, 1), None, MG, Any),
    ExtractOSREntryLocal => (fixed(0, 0), Js, NONE, Any),
    InlineStart => (fixed(0, 0), None, MG, None),

    // Scope and closure access
    GetCallee => (fixed(0, 0), Js, NONE, None),
    SetCallee => (fixed(1, 1), None, MG, None),
    GetMyScope => (fixed(0, 0), Js, NONE, None),
    SetMyScope => (fixed(1, 1), None, MG, None),
    SkipTopScope => (fixed(1, 1), Js, NONE, None),
    SkipScope => (fixed(1, 1), Js, NONE, None),
    GetScope => (fixed(1, 1), Js, NONE, None),
    GetClosureRegisters => (fixed(1, 1), Storage, NONE, None),
    GetClosureVar => (fixed(1, 1), Js, NONE, Any),
    PutClosureVar => (fixed(3, 3), None, MG, Any),
    GetGlobalVar => (fixed(0, 0), Js, NONE, Any),
    PutGlobalVar => (fixed(1, 1), None, MG, Any),
    GlobalVarWatchpoint => (fixed(0, 0), None, MG, Any),
    VarInjectionWatchpoint => (fixed(0, 0), None, MG, None),
    AllocationProfileWatchpoint => (fixed(0, 0), None, MG, None),

    // Bitwise and integer arithmetic
    BitAnd => (fixed(2, 2), Int32, NONE, None),
    BitOr => (fixed(2, 2), Int32, NONE, None),
    BitXor => (fixed(2, 2), Int32, NONE, None),
    BitLShift => (fixed(2, 2), Int32, NONE, None),
    BitRShift => (fixed(2, 2), Int32, NONE, None),
    BitURShift => (fixed(2, 2), Int32, NONE, None),
    ArithIMul => (fixed(2, 2), Int32, NONE, None),
    ValueToInt32 => (fixed(1, 1), Int32, NONE, None),
    UInt32ToNumber => (fixed(1, 1), Number, NONE, None),
    DoubleAsInt32 => (fixed(1, 1), Int32, NONE, None),
    Int32ToDouble => (fixed(1, 1), Number, NONE, None),

    // Number arithmetic
    ValueAdd => (fixed(2, 2), Js, MG_CW, None),
    ArithAdd => (fixed(2, 2), Number, NONE, None),
    ArithSub => (fixed(2, 2), Number, NONE, None),
    ArithNegate => (fixed(1, 1), Number, NONE, None),
    ArithMul => (fixed(2, 2), Number, NONE, None),
    ArithDiv => (fixed(2, 2), Number, NONE, None),
    ArithMod => (fixed(2, 2), Number, NONE, None),
    ArithMin => (fixed(2, 2), Number, NONE, None),
    ArithMax => (fixed(2, 2), Number, NONE, None),
    ArithAbs => (fixed(1, 1), Number, NONE, None),
    ArithSqrt => (fixed(1, 1), Number, NONE, None),

    // Property access
    GetById => (fixed(1, 1), Js, MG_CW, Identifier),
    GetByIdFlush => (fixed(1, 1), Js, MG_CW, Identifier),
    PutById => (fixed(2, 2), None, MG_CW, Identifier),
    PutByIdDirect => (fixed(2, 2), None, MG_CW, Identifier),
    GetByOffset => (fixed(2, 2), Js, NONE, Any),
    PutByOffset => (fixed(3, 3), None, MG, Any),
    CheckStructure => (fixed(1, 1), None, MG, Structure),
    StructureTransitionWatchpoint => (fixed(1, 1), None, MG, Structure),
    PutStructure => (fixed(1, 1), None, MG, Any),
    PhantomPutStructure => (fixed(1, 1), None, MG, Any),
    AllocatePropertyStorage => (fixed(1, 1), Storage, MG, Any),
    ReallocatePropertyStorage => (fixed(1, 2), Storage, MG, Any),
    GetButterfly => (fixed(1, 1), Storage, NONE, None),
    CheckArray => (fixed(1, 1), None, MG, ArrayMode),
    Arrayify => (fixed(1, 2), None, MG, ArrayMode),
    ArrayifyToStructure => (fixed(1, 2), None, MG, StructureAndArrayMode),
    GetIndexedPropertyStorage => (fixed(1, 1), Storage, NONE, ArrayMode),
    GetArrayLength => (fixed(1, 2), Int32, NONE, ArrayMode),
    GetTypedArrayByteOffset => (fixed(1, 1), Int32, NONE, Any),
    CheckFunction => (fixed(1, 1), None, MG, Any),
    CheckExecutable => (fixed(1, 1), None, MG, Any),

    // Indexed access
    GetByVal => (fixed(2, 3), Js, MG_CW, ArrayMode),
    PutByVal => (var_args(4, Some(4)), None, MG_CW, ArrayMode),
    PutByValAlias => (var_args(4, Some(4)), None, MG_CW, ArrayMode),
    ArrayPush => (fixed(2, 3), Js, MG_CW, ArrayMode),
    ArrayPop => (fixed(1, 2), Js, MG_CW, ArrayMode),

    // Strings
    StringCharAt => (fixed(2, 3), Js, NONE, ArrayMode),
    StringCharCodeAt => (fixed(2, 3), Int32, NONE, ArrayMode),
    StringFromCharCode => (fixed(1, 1), Js, NONE, None),
    MakeRope => (fixed(2, 3), Js, NONE, None),
    NewStringObject => (fixed(1, 1), Js, NONE, Any),
    ToPrimitive => (fixed(1, 1), Js, MG_CW, None),
    ToString => (fixed(1, 1), Js, MG_CW, None),
    RegExpExec => (fixed(2, 2), Js, MG_CW, None),
    RegExpTest => (fixed(2, 2), Boolean, MG_CW, None),

    // Comparisons and type queries
    CompareLess => (fixed(2, 2), Boolean, MG_CW, None),
    CompareLessEq => (fixed(2, 2), Boolean, MG_CW, None),
    CompareGreater => (fixed(2, 2), Boolean, MG_CW, None),
    CompareGreaterEq => (fixed(2, 2), Boolean, MG_CW, None),
    CompareEq => (fixed(2, 2), Boolean, MG_CW, None),
    CompareEqConstant => (fixed(1, 2), Boolean, NONE, Any),
    CompareStrictEq => (fixed(2, 2), Boolean, NONE, None),
    CompareStrictEqConstant => (fixed(1, 2), Boolean, NONE, Any),
    LogicalNot => (fixed(1, 1), Boolean, NONE, None),
    TypeOf => (fixed(1, 1), Js, NONE, None),
    IsUndefined => (fixed(1, 1), Boolean, NONE, None),
    IsBoolean => (fixed(1, 1), Boolean, NONE, None),
    IsNumber => (fixed(1, 1), Boolean, NONE, None),
    IsString => (fixed(1, 1), Boolean, NONE, None),
    IsObject => (fixed(1, 1), Boolean, NONE, None),
    IsFunction => (fixed(1, 1), Boolean, NONE, None),
    CheckHasInstance => (fixed(1, 1), None, MG, None),
    InstanceOf => (fixed(2, 2), Boolean, NONE, None),
    In => (fixed(2, 2), Boolean, MG_CW, None),

    // Calls and allocation
    Call => (var_args(1, None), Js, MG_CW, None),
    Construct => (var_args(1, None), Js, MG_CW, None),
    NewObject => (fixed(0, 0), Js, NONE, Any),
    NewArray => (var_args(0, None), Js, NONE, Indexing),
    NewArrayWithSize => (fixed(1, 1), Js, MG, Indexing),
    NewArrayBuffer => (fixed(0, 0), Js, NONE, Any),
    NewTypedArray => (fixed(1, 1), Js, MG_CW, Any),
    NewRegexp => (fixed(0, 0), Js, NONE, Any),
    NewFunction => (fixed(0, 1), Js, NONE, Any),
    NewFunctionNoCheck => (fixed(0, 1), Js, NONE, Any),
    NewFunctionExpression => (fixed(0, 1), Js, NONE, Any),
    CreateThis => (fixed(1, 1), Js, MG_CW, Any),
    ToThis => (fixed(1, 1), Js, NONE, None),
    CreateActivation => (fixed(0, 1), Js, MG, None),
    TearOffActivation => (fixed(1, 1), None, MG, None),
    CreateArguments => (fixed(0, 1), Js, MG, None),
    PhantomArguments => (fixed(0, 0), Js, NONE, None),
    TearOffArguments => (fixed(1, 2), None, MG, None),
    GetMyArgumentsLength => (fixed(0, 0), Js, MG, None),
    GetMyArgumentsLengthSafe => (fixed(0, 0), Js, MG, None),
    GetMyArgumentByVal => (fixed(1, 1), Js, MG, None),
    GetMyArgumentByValSafe => (fixed(1, 1), Js, MG, None),
    CheckArgumentsNotCreated => (fixed(0, 0), None, MG, None),

    // Control flow
    Jump => (fixed(0, 0), None, MG, Jump),
    Branch => (fixed(1, 1), None, MG, Branch),
    Switch => (fixed(1, 1), None, MG, Switch),
    Return => (fixed(1, 1), None, MG, None),
    Throw => (fixed(1, 1), None, MG, None),
    ThrowReferenceError => (fixed(0, 0), None, MG, None),
    Unreachable => (fixed(0, 0), None, MG, None),

    // Miscellaneous
    Phantom => (fixed(0, 3), None, MG, None),
    Identity => (fixed(1, 1), Js, NONE, None),
    Breakpoint => (fixed(0, 0), None, MG, None),
    CountExecution => (fixed(0, 0), None, MG, None),
    ForceOSRExit => (fixed(0, 0), None, MG, None),
    CheckWatchdogTimer => (fixed(0, 0), None, MG, None),
    LoopHint => (fixed(0, 0), None, MG, None),
    CheckTierUpInLoop => (fixed(0, 0), None, MG, None),
    CheckTierUpAtReturn => (fixed(0, 0), None, MG, None),
    CheckTierUpAndOSREnter => (fixed(0, 0), None, MG, None),
}

impl NodeType {
    pub fn has_var_args(self) -> bool {
        matches!(self.arity(), Arity::VarArgs { .. })
    }

    pub fn has_boolean_result(self) -> bool {
        self.result() == NodeResult::Boolean
    }

    pub fn has_storage_result(self) -> bool {
        self.result() == NodeResult::Storage
    }

    pub fn is_constant(self) -> bool {
        matches!(self, NodeType::JSConstant | NodeType::WeakJSConstant)
    }

    /// Opcodes that may exit regardless of how their edges are typed
    pub fn inherently_can_exit(self) -> bool {
        matches!(
            self,
            NodeType::CheckStructure
                | NodeType::StructureTransitionWatchpoint
                | NodeType::CheckArray
                | NodeType::Arrayify
                | NodeType::ArrayifyToStructure
                | NodeType::CheckFunction
                | NodeType::CheckExecutable
                | NodeType::CheckHasInstance
                | NodeType::CheckArgumentsNotCreated
                | NodeType::ForceOSRExit
                | NodeType::GetByVal
                | NodeType::PutByVal
                | NodeType::PutByValAlias
                | NodeType::ArrayPush
                | NodeType::ArrayPop
                | NodeType::StringCharAt
                | NodeType::StringCharCodeAt
                | NodeType::GetMyArgumentByVal
                | NodeType::DoubleAsInt32
                | NodeType::UInt32ToNumber
                | NodeType::GlobalVarWatchpoint
                | NodeType::VarInjectionWatchpoint
                | NodeType::AllocationProfileWatchpoint
                | NodeType::CheckWatchdogTimer
        )
    }

    /// Arithmetic whose int32 form checks for overflow
    pub fn is_overflow_checked_arith(self) -> bool {
        matches!(
            self,
            NodeType::ValueAdd
                | NodeType::ArithAdd
                | NodeType::ArithSub
                | NodeType::ArithMul
                | NodeType::ArithNegate
                | NodeType::ArithDiv
                | NodeType::ArithMod
                | NodeType::ArithAbs
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One DFG operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) op: NodeType,
    #[serde(default)]
    pub(crate) children: Children,
    #[serde(default)]
    pub(crate) prediction: SpeculatedType,
    #[serde(default)]
    pub(crate) flags: NodeFlags,
    #[serde(default)]
    pub(crate) origin: CodeOrigin,
    #[serde(default)]
    pub(crate) info: OpInfo,
}

impl Node {
    /// Create a node template with the opcode's default flags
    pub fn new(op: NodeType, origin: CodeOrigin) -> Self {
        Self {
            op,
            children: Children::default(),
            prediction: SpeculatedType::empty(),
            flags: op.default_flags(),
            origin,
            info: OpInfo::None,
        }
    }

    pub fn with_prediction(mut self, prediction: SpeculatedType) -> Self {
        self.prediction = prediction;
        self
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_info(mut self, info: OpInfo) -> Self {
        self.info = info;
        self
    }

    /// Append a child edge to the first free fixed slot; `None` leaves a hole
    pub fn with_child(mut self, edge: Option<Edge>) -> Self {
        match &mut self.children {
            Children::Fixed(slots) => {
                let free = slots.iter().position(|slot| slot.is_none());
                match (free, edge) {
                    (_, None) => {}
                    (Some(index), Some(edge)) => slots[index] = Some(edge),
                    (None, Some(_)) => invariant_violation(format_args!(
                        "{} takes at most {} children",
                        self.op, FIXED_CHILDREN
                    )),
                }
            }
            Children::VarArgs { .. } => {
                invariant_violation(format_args!("{} has var-arg children", self.op))
            }
        }
        self
    }

    pub fn with_edge(self, edge: Edge) -> Self {
        self.with_child(Some(edge))
    }

    pub fn op(&self) -> NodeType {
        self.op
    }

    pub fn prediction(&self) -> SpeculatedType {
        self.prediction
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn origin(&self) -> CodeOrigin {
        self.origin
    }

    pub fn info(&self) -> &OpInfo {
        &self.info
    }

    pub fn children(&self) -> &Children {
        &self.children
    }

    pub fn set_prediction(&mut self, prediction: SpeculatedType) {
        self.prediction = prediction;
    }

    /// Change the opcode in place, keeping flags, children and origin
    pub fn set_op(&mut self, op: NodeType) {
        self.op = op;
    }

    /// Change the opcode and reset flags to the new opcode's defaults
    pub fn set_op_and_default_flags(&mut self, op: NodeType) {
        self.op = op;
        self.flags = op.default_flags();
    }

    /// Turn the node into a pass-through of its first child
    #[track_caller]
    pub fn convert_to_identity(&mut self) {
        match self.children {
            Children::Fixed([Some(_), None, None]) => {}
            _ => invariant_violation(format_args!(
                "{} cannot become Identity: it needs exactly one child",
                self.op
            )),
        }
        self.set_op_and_default_flags(NodeType::Identity);
    }

    /// `ToPrimitive` on a string object is a `ToString`
    pub fn convert_to_to_string(&mut self) {
        debug_assert_eq!(self.op, NodeType::ToPrimitive);
        self.op = NodeType::ToString;
    }

    /// Replace the node with a weakly held constant cell
    pub fn convert_to_weak_constant(&mut self, cell: CellId) {
        self.op = NodeType::WeakJSConstant;
        self.flags -= NodeFlags::MUST_GENERATE | NodeFlags::CLOBBERS_WORLD;
        self.info = OpInfo::Constant(JsConstant::Cell(cell));
        self.children = Children::default();
    }

    pub fn set_info(&mut self, info: OpInfo) {
        self.info = info;
    }

    pub fn merge_flags(&mut self, flags: NodeFlags) {
        self.flags |= flags;
    }

    pub fn clear_flags(&mut self, flags: NodeFlags) {
        self.flags -= flags;
    }

    pub fn has_constant(&self) -> bool {
        self.op.is_constant()
    }

    pub fn constant(&self) -> Option<&JsConstant> {
        match &self.info {
            OpInfo::Constant(value) if self.has_constant() => Some(value),
            _ => None,
        }
    }

    #[track_caller]
    pub fn variable(&self) -> VariableId {
        match self.info {
            OpInfo::Variable(variable) => variable,
            _ => invariant_violation(format_args!("{} has no variable", self.op)),
        }
    }

    #[track_caller]
    pub fn array_mode(&self) -> ArrayMode {
        match self.info {
            OpInfo::ArrayMode(mode) | OpInfo::StructureAndArrayMode(_, mode) => mode,
            _ => invariant_violation(format_args!("{} has no array mode", self.op)),
        }
    }

    pub fn set_array_mode(&mut self, mode: ArrayMode) {
        match &mut self.info {
            OpInfo::StructureAndArrayMode(_, current) => *current = mode,
            info => *info = OpInfo::ArrayMode(mode),
        }
    }

    pub fn identifier(&self) -> Option<IdentifierId> {
        match self.info {
            OpInfo::Identifier(identifier) => Some(identifier),
            _ => None,
        }
    }

    #[track_caller]
    pub fn indexing_shape(&self) -> IndexingShape {
        match self.info {
            OpInfo::Indexing(shape) => shape,
            _ => invariant_violation(format_args!("{} has no indexing shape", self.op)),
        }
    }

    pub fn set_indexing_shape(&mut self, shape: IndexingShape) {
        self.info = OpInfo::Indexing(shape);
    }

    #[track_caller]
    pub fn branch_targets(&self) -> (BlockIndex, BlockIndex) {
        match self.info {
            OpInfo::Branch { taken, not_taken } => (taken, not_taken),
            _ => invariant_violation(format_args!("{} is not a branch", self.op)),
        }
    }

    pub fn set_branch_targets(&mut self, taken: BlockIndex, not_taken: BlockIndex) {
        self.info = OpInfo::Branch { taken, not_taken };
    }

    #[track_caller]
    pub fn switch_data(&self) -> &SwitchData {
        match &self.info {
            OpInfo::Switch(data) => data,
            _ => invariant_violation(format_args!("{} is not a switch", self.op)),
        }
    }

    /// Integer speculation is sound unless an observable overflow or -0 is
    /// possible
    pub fn can_speculate_integer(&self) -> bool {
        if self.flags.contains(NodeFlags::MAY_OVERFLOW) {
            return !self.flags.contains(NodeFlags::USED_AS_NUMBER);
        }
        if self.flags.contains(NodeFlags::MAY_NEG_ZERO) {
            return !self.flags.contains(NodeFlags::NEEDS_NEG_ZERO);
        }
        true
    }

    pub fn can_truncate_integer(&self) -> bool {
        !self.flags.contains(NodeFlags::USED_AS_NUMBER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_int32() {
        assert_eq!(to_int32(3.7), 3);
        assert_eq!(to_int32(-3.7), -3);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::INFINITY), 0);
        assert_eq!(to_int32(4_294_967_296.0 + 5.0), 5);
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
    }

    #[test]
    fn test_constant_as_int32() {
        assert_eq!(JsConstant::Double(2.0).as_int32(), Some(2));
        assert_eq!(JsConstant::Double(2.5).as_int32(), None);
        assert_eq!(JsConstant::Double(-0.0).as_int32(), None);
        assert_eq!(JsConstant::String("1".into()).as_int32(), None);
    }

    #[test]
    fn test_default_flags() {
        assert!(NodeType::ValueAdd.default_flags().contains(NodeFlags::CLOBBERS_WORLD));
        assert!(NodeType::ArithAdd.default_flags().is_empty());
        assert!(NodeType::Branch.default_flags().contains(NodeFlags::MUST_GENERATE));
    }

    #[test]
    fn test_set_op_and_default_flags_drops_arith_flags() {
        let mut node = Node::new(NodeType::ValueToInt32, CodeOrigin::new(0))
            .with_flags(NodeFlags::USED_AS_NUMBER);
        node.set_op_and_default_flags(NodeType::Identity);
        assert_eq!(node.op(), NodeType::Identity);
        assert!(node.flags().is_empty());
    }

    #[test]
    fn test_can_speculate_integer() {
        let origin = CodeOrigin::new(0);
        let plain = Node::new(NodeType::ArithAdd, origin);
        assert!(plain.can_speculate_integer());

        let overflowing = Node::new(NodeType::ArithAdd, origin)
            .with_flags(NodeFlags::MAY_OVERFLOW | NodeFlags::USED_AS_NUMBER);
        assert!(!overflowing.can_speculate_integer());

        let truncated = Node::new(NodeType::ArithAdd, origin).with_flags(NodeFlags::MAY_OVERFLOW);
        assert!(truncated.can_speculate_integer());

        let neg_zero = Node::new(NodeType::ArithMul, origin)
            .with_flags(NodeFlags::MAY_NEG_ZERO | NodeFlags::NEEDS_NEG_ZERO);
        assert!(!neg_zero.can_speculate_integer());
    }

    #[test]
    fn test_with_child_fills_slots_in_order() {
        let a = Edge::untyped(NodeId::new(1));
        let b = Edge::untyped(NodeId::new(2));
        let node = Node::new(NodeType::ArithAdd, CodeOrigin::new(0))
            .with_edge(a)
            .with_edge(b);
        assert_eq!(node.children, Children::Fixed([Some(a), Some(b), None]));
    }
}
