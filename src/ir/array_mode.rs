//! Array access classification
//!
//! Every indexed access carries an [`ArrayMode`] describing what kind of
//! receiver it expects. The bytecode parser seeds it from the array profile;
//! the fixup phase narrows it with the operands' predictions and then emits
//! the guards the chosen mode relies on.

use super::node::{CodeOrigin, NodeFlags};
use crate::profiling::{ProfilingOracle, StructureId};
use crate::speculation::{SpeculatedType, TypedArrayType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Representation the receiver is expected to have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayType {
    /// No profile; decide from predictions during refinement
    SelectUsingPredictions,
    /// The access never ran in the profiling tier
    Unprofiled,
    /// Statically known to always fail
    ForceExit,
    /// Fully generic dispatch
    Generic,
    String,
    /// Array literal whose element kind is not known yet
    Undecided,
    Int32,
    Double,
    Contiguous,
    ArrayStorage,
    SlowPutArrayStorage,
    Arguments,
    TypedArray(TypedArrayType),
}

/// What the receiver's class is known to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayClass {
    NonArray,
    Array,
    /// An array created with the global object's original array structure
    OriginalArray,
    PossiblyArray,
}

/// Bounds behaviour the access speculates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArraySpeculation {
    InBounds,
    /// In bounds, and holes read through a sane prototype chain
    SaneChain,
    ToHole,
    OutOfBounds,
}

/// Whether the access may reshape its receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayConversion {
    AsIs,
    Convert,
    /// Convert even if it loses double precision information
    RageConvert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayMode {
    pub ty: ArrayType,
    pub class: ArrayClass,
    pub speculation: ArraySpeculation,
    pub conversion: ArrayConversion,
}

impl From<ArrayType> for ArrayMode {
    fn from(ty: ArrayType) -> Self {
        ArrayMode::new(ty)
    }
}

impl ArrayMode {
    pub const fn new(ty: ArrayType) -> Self {
        Self {
            ty,
            class: ArrayClass::NonArray,
            speculation: ArraySpeculation::InBounds,
            conversion: ArrayConversion::AsIs,
        }
    }

    pub fn with_class(self, class: ArrayClass) -> Self {
        Self { class, ..self }
    }

    pub fn with_speculation(self, speculation: ArraySpeculation) -> Self {
        Self {
            speculation,
            ..self
        }
    }

    pub fn with_conversion(self, conversion: ArrayConversion) -> Self {
        Self { conversion, ..self }
    }

    pub fn with_type(self, ty: ArrayType) -> Self {
        Self { ty, ..self }
    }

    pub fn with_type_and_conversion(self, ty: ArrayType, conversion: ArrayConversion) -> Self {
        Self {
            ty,
            conversion,
            ..self
        }
    }

    /// Narrow the mode using the predictions of the base, index and stored
    /// value (`value` is empty for loads)
    pub fn refine(
        self,
        base: SpeculatedType,
        index: SpeculatedType,
        value: SpeculatedType,
        flags: NodeFlags,
    ) -> ArrayMode {
        if base.is_empty() || index.is_empty() {
            // Inlined code that provably never ran in the profiling tier
            return ArrayMode::new(ArrayType::ForceExit);
        }

        if !index.is_int32() {
            return ArrayMode::new(ArrayType::Generic);
        }

        match self.ty {
            ArrayType::Unprofiled => ArrayMode::new(ArrayType::ForceExit),

            ArrayType::Undecided => {
                if value.is_empty() {
                    self.with_type(ArrayType::ForceExit)
                } else if value.is_int32() {
                    self.with_type_and_conversion(ArrayType::Int32, ArrayConversion::Convert)
                } else if value.is_number() {
                    self.with_type_and_conversion(ArrayType::Double, ArrayConversion::Convert)
                } else {
                    self.with_type_and_conversion(ArrayType::Contiguous, ArrayConversion::Convert)
                }
            }

            ArrayType::Int32 => {
                if value.is_empty() || value.is_int32() {
                    self
                } else if value.is_number() {
                    self.with_type_and_conversion(ArrayType::Double, ArrayConversion::Convert)
                } else {
                    self.with_type_and_conversion(ArrayType::Contiguous, ArrayConversion::Convert)
                }
            }

            ArrayType::Double => {
                if flags.contains(NodeFlags::USED_AS_INT) {
                    self.with_type_and_conversion(
                        ArrayType::Contiguous,
                        ArrayConversion::RageConvert,
                    )
                } else if value.is_empty() || value.is_number() {
                    self
                } else {
                    self.with_type_and_conversion(ArrayType::Contiguous, ArrayConversion::Convert)
                }
            }

            ArrayType::Contiguous => {
                if self.does_conversion() && flags.contains(NodeFlags::USED_AS_INT) {
                    self.with_conversion(ArrayConversion::RageConvert)
                } else {
                    self
                }
            }

            ArrayType::SelectUsingPredictions => {
                let base = base - SpeculatedType::OTHER;
                if base.is_string() {
                    ArrayMode::new(ArrayType::String)
                } else if base.is_arguments() {
                    ArrayMode::new(ArrayType::Arguments)
                } else if let Some(kind) = base.typed_array_type() {
                    ArrayMode::new(ArrayType::TypedArray(kind))
                } else {
                    ArrayMode::new(ArrayType::Generic)
                }
            }

            _ => self,
        }
    }

    /// Whether the mode names a concrete representation worth guarding
    pub fn is_specific(self) -> bool {
        !matches!(
            self.ty,
            ArrayType::SelectUsingPredictions
                | ArrayType::Unprofiled
                | ArrayType::ForceExit
                | ArrayType::Generic
                | ArrayType::Undecided
        )
    }

    pub fn does_conversion(self) -> bool {
        self.conversion != ArrayConversion::AsIs
    }

    pub fn is_js_array(self) -> bool {
        matches!(self.class, ArrayClass::Array | ArrayClass::OriginalArray)
    }

    /// Storage lives in the object's butterfly
    pub fn uses_butterfly(self) -> bool {
        matches!(
            self.ty,
            ArrayType::Int32
                | ArrayType::Double
                | ArrayType::Contiguous
                | ArrayType::ArrayStorage
                | ArrayType::SlowPutArrayStorage
        )
    }

    pub fn supports_length(self) -> bool {
        match self.ty {
            ArrayType::SelectUsingPredictions
            | ArrayType::Unprofiled
            | ArrayType::ForceExit
            | ArrayType::Generic => false,
            ArrayType::Int32
            | ArrayType::Double
            | ArrayType::Contiguous
            | ArrayType::ArrayStorage
            | ArrayType::SlowPutArrayStorage => self.is_js_array(),
            _ => true,
        }
    }

    /// Whether an access in this mode reads through a storage pointer
    pub fn can_cse_storage(self) -> bool {
        !matches!(
            self.ty,
            ArrayType::SelectUsingPredictions
                | ArrayType::Unprofiled
                | ArrayType::Undecided
                | ArrayType::ForceExit
                | ArrayType::Generic
                | ArrayType::Arguments
        )
    }

    /// Reading `length` needs the storage only for real JS arrays
    pub fn length_needs_storage(self) -> bool {
        self.is_js_array()
    }

    /// The mode a store uses: strings and arguments are stored to generically
    pub fn mode_for_put(self) -> ArrayMode {
        match self.ty {
            ArrayType::String | ArrayType::Arguments => ArrayMode::new(ArrayType::Generic),
            _ => self,
        }
    }

    /// Indexing shape backing this mode, for butterfly modes
    pub fn indexing_shape(self) -> Option<IndexingShape> {
        match self.ty {
            ArrayType::Int32 => Some(IndexingShape::Int32),
            ArrayType::Double => Some(IndexingShape::Double),
            ArrayType::Contiguous => Some(IndexingShape::Contiguous),
            ArrayType::ArrayStorage => Some(IndexingShape::ArrayStorage),
            _ => None,
        }
    }

    /// The global object's original array structure, when the access
    /// speculates on an original array
    pub fn original_array_structure(
        self,
        oracle: &dyn ProfilingOracle,
        origin: CodeOrigin,
    ) -> Option<StructureId> {
        if self.class != ArrayClass::OriginalArray {
            return None;
        }
        let shape = self.indexing_shape()?;
        oracle.original_array_structure(origin, shape)
    }
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayType::TypedArray(kind) => write!(f, "{:?}Array", kind),
            other => write!(f, "{:?}", other),
        }
    }
}

impl fmt::Display for ArrayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:?}{:?}{:?}",
            self.ty, self.class, self.speculation, self.conversion
        )
    }
}

/// Element representation of an array literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexingShape {
    /// No indexed storage at all
    Blank,
    Undecided,
    Int32,
    Double,
    Contiguous,
    ArrayStorage,
}

impl IndexingShape {
    /// Widen the shape so it can also hold a value of the given prediction
    pub fn least_upper_bound(self, prediction: SpeculatedType) -> IndexingShape {
        if prediction.is_empty() {
            return self;
        }
        match self {
            IndexingShape::Blank | IndexingShape::Undecided | IndexingShape::Int32 => {
                if prediction.is_int32() {
                    IndexingShape::Int32
                } else if prediction.is_number() {
                    IndexingShape::Double
                } else {
                    IndexingShape::Contiguous
                }
            }
            IndexingShape::Double => {
                if prediction.is_number() {
                    IndexingShape::Double
                } else {
                    IndexingShape::Contiguous
                }
            }
            IndexingShape::Contiguous | IndexingShape::ArrayStorage => self,
        }
    }
}
