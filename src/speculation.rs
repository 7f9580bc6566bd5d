//! Speculated types
//!
//! A [`SpeculatedType`] is the set of runtime type categories a value was
//! observed to take while the code ran in a lower tier. The prediction
//! propagation phase attaches one to every node and to every variable; the
//! fixup phase only reads them.
//!
//! All `is_*` predicates follow the same rule: the prediction must be
//! non-empty and a subset of the tested category. An empty prediction means
//! "never executed" and proves nothing.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Set of possible runtime type categories for a value
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SpeculatedType: u32 {
        const FINAL_OBJECT = 1 << 0;
        const ARRAY = 1 << 1;
        const FUNCTION = 1 << 2;
        const INT8_ARRAY = 1 << 3;
        const INT16_ARRAY = 1 << 4;
        const INT32_ARRAY = 1 << 5;
        const UINT8_ARRAY = 1 << 6;
        const UINT8_CLAMPED_ARRAY = 1 << 7;
        const UINT16_ARRAY = 1 << 8;
        const UINT32_ARRAY = 1 << 9;
        const FLOAT32_ARRAY = 1 << 10;
        const FLOAT64_ARRAY = 1 << 11;
        const ARGUMENTS = 1 << 12;
        const STRING_OBJECT = 1 << 13;
        const OBJECT_OTHER = 1 << 14;
        const STRING_IDENT = 1 << 15;
        const STRING_VAR = 1 << 16;
        const CELL_OTHER = 1 << 17;
        const INT32 = 1 << 18;
        const DOUBLE_REAL = 1 << 19;
        const DOUBLE_NAN = 1 << 20;
        const BOOLEAN = 1 << 21;
        /// `undefined` or `null`
        const OTHER = 1 << 22;

        const TYPED_ARRAY_VIEW = Self::INT8_ARRAY.bits()
            | Self::INT16_ARRAY.bits()
            | Self::INT32_ARRAY.bits()
            | Self::UINT8_ARRAY.bits()
            | Self::UINT8_CLAMPED_ARRAY.bits()
            | Self::UINT16_ARRAY.bits()
            | Self::UINT32_ARRAY.bits()
            | Self::FLOAT32_ARRAY.bits()
            | Self::FLOAT64_ARRAY.bits();
        const OBJECT = Self::FINAL_OBJECT.bits()
            | Self::ARRAY.bits()
            | Self::FUNCTION.bits()
            | Self::TYPED_ARRAY_VIEW.bits()
            | Self::ARGUMENTS.bits()
            | Self::STRING_OBJECT.bits()
            | Self::OBJECT_OTHER.bits();
        const STRING = Self::STRING_IDENT.bits() | Self::STRING_VAR.bits();
        const CELL = Self::OBJECT.bits() | Self::STRING.bits() | Self::CELL_OTHER.bits();
        const DOUBLE = Self::DOUBLE_REAL.bits() | Self::DOUBLE_NAN.bits();
        const REAL_NUMBER = Self::INT32.bits() | Self::DOUBLE_REAL.bits();
        const NUMBER = Self::INT32.bits() | Self::DOUBLE.bits();
        const TOP = Self::CELL.bits() | Self::NUMBER.bits() | Self::BOOLEAN.bits() | Self::OTHER.bits();
    }
}

/// Fixed-width typed array element kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypedArrayType {
    Int8,
    Int16,
    Int32,
    Uint8,
    Uint8Clamped,
    Uint16,
    Uint32,
    Float32,
    Float64,
}

impl TypedArrayType {
    pub const ALL: [TypedArrayType; 9] = [
        TypedArrayType::Int8,
        TypedArrayType::Int16,
        TypedArrayType::Int32,
        TypedArrayType::Uint8,
        TypedArrayType::Uint8Clamped,
        TypedArrayType::Uint16,
        TypedArrayType::Uint32,
        TypedArrayType::Float32,
        TypedArrayType::Float64,
    ];

    /// Prediction bit for views of this kind
    pub fn speculation(self) -> SpeculatedType {
        match self {
            TypedArrayType::Int8 => SpeculatedType::INT8_ARRAY,
            TypedArrayType::Int16 => SpeculatedType::INT16_ARRAY,
            TypedArrayType::Int32 => SpeculatedType::INT32_ARRAY,
            TypedArrayType::Uint8 => SpeculatedType::UINT8_ARRAY,
            TypedArrayType::Uint8Clamped => SpeculatedType::UINT8_CLAMPED_ARRAY,
            TypedArrayType::Uint16 => SpeculatedType::UINT16_ARRAY,
            TypedArrayType::Uint32 => SpeculatedType::UINT32_ARRAY,
            TypedArrayType::Float32 => SpeculatedType::FLOAT32_ARRAY,
            TypedArrayType::Float64 => SpeculatedType::FLOAT64_ARRAY,
        }
    }

    /// log2 of the element size in bytes
    pub fn log_element_size(self) -> u32 {
        match self {
            TypedArrayType::Int8 | TypedArrayType::Uint8 | TypedArrayType::Uint8Clamped => 0,
            TypedArrayType::Int16 | TypedArrayType::Uint16 => 1,
            TypedArrayType::Int32 | TypedArrayType::Uint32 | TypedArrayType::Float32 => 2,
            TypedArrayType::Float64 => 3,
        }
    }

    pub fn element_size(self) -> u32 {
        1 << self.log_element_size()
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypedArrayType::Float32 | TypedArrayType::Float64)
    }
}

impl SpeculatedType {
    /// Non-empty subset test shared by every `is_*` predicate
    #[inline]
    fn is_within(self, category: SpeculatedType) -> bool {
        !self.is_empty() && category.contains(self)
    }

    pub fn is_int32(self) -> bool {
        self.is_within(Self::INT32)
    }

    /// Integer for arithmetic purposes: no double was ever seen
    pub fn is_int32_for_arithmetic(self) -> bool {
        !self.intersects(Self::DOUBLE)
    }

    pub fn is_int32_expecting_defined(self) -> bool {
        (self - Self::OTHER).is_int32()
    }

    pub fn is_double(self) -> bool {
        self.is_within(Self::DOUBLE)
    }

    pub fn is_number(self) -> bool {
        self.is_within(Self::NUMBER)
    }

    pub fn is_real_number(self) -> bool {
        self.is_within(Self::REAL_NUMBER)
    }

    pub fn is_number_expecting_defined(self) -> bool {
        (self - Self::OTHER).is_number()
    }

    pub fn is_boolean(self) -> bool {
        self.is_within(Self::BOOLEAN)
    }

    pub fn is_other(self) -> bool {
        self.is_within(Self::OTHER)
    }

    pub fn is_string_ident(self) -> bool {
        self.is_within(Self::STRING_IDENT)
    }

    pub fn is_string(self) -> bool {
        self.is_within(Self::STRING)
    }

    pub fn is_string_object(self) -> bool {
        self.is_within(Self::STRING_OBJECT)
    }

    pub fn is_string_or_string_object(self) -> bool {
        self.is_within(Self::STRING | Self::STRING_OBJECT)
    }

    pub fn is_cell(self) -> bool {
        self.is_within(Self::CELL)
    }

    pub fn is_object(self) -> bool {
        self.is_within(Self::OBJECT)
    }

    pub fn is_final_object(self) -> bool {
        self.is_within(Self::FINAL_OBJECT)
    }

    pub fn is_object_or_other(self) -> bool {
        self.is_within(Self::OBJECT | Self::OTHER)
    }

    pub fn is_array(self) -> bool {
        self.is_within(Self::ARRAY)
    }

    pub fn is_arguments(self) -> bool {
        self.is_within(Self::ARGUMENTS)
    }

    pub fn is_typed_array(self, kind: TypedArrayType) -> bool {
        self.is_within(kind.speculation())
    }

    /// The single typed array kind this prediction narrows to, if any
    pub fn typed_array_type(self) -> Option<TypedArrayType> {
        TypedArrayType::ALL
            .into_iter()
            .find(|kind| self.is_typed_array(*kind))
    }

    /// Prediction of `ToPrimitive(value)`: objects turn into strings
    pub fn result_of_to_primitive(self) -> SpeculatedType {
        if self.intersects(Self::OBJECT) {
            return (self - Self::OBJECT) | Self::STRING;
        }
        self
    }
}

impl fmt::Display for SpeculatedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "None");
        }
        if *self == Self::TOP {
            return write!(f, "Top");
        }
        let named: [(SpeculatedType, &str); 9] = [
            (Self::OBJECT, "Object"),
            (Self::STRING, "String"),
            (Self::CELL_OTHER, "CellOther"),
            (Self::INT32, "Int32"),
            (Self::DOUBLE, "Double"),
            (Self::DOUBLE_REAL, "DoubleReal"),
            (Self::DOUBLE_NAN, "DoubleNaN"),
            (Self::BOOLEAN, "Boolean"),
            (Self::OTHER, "Other"),
        ];
        let mut remaining = *self;
        let mut first = true;
        for (bits, name) in named {
            if remaining.contains(bits) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                remaining -= bits;
                first = false;
            }
        }
        for (name, _) in remaining.iter_names() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", name)?;
            first = false;
        }
        Ok(())
    }
}
