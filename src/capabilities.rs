//! Value types and the capability bit-set derived from them
//!
//! A capability set describes which runtime value categories a position
//! accepts or provides. Capabilities are only ever derived from a
//! [`ValueType`] through [`ValueType::capabilities`], so two positions with the
//! same declared type always report the same set.

use crate::error::FunctionError;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Runtime value categories a position accepts or provides.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct Capabilities: u16 {
        const BOOLEAN        = 1 << 0;
        const INTEGER        = 1 << 1;
        const REAL           = 1 << 2;
        const COMPLEX        = 1 << 3;
        const SET            = 1 << 4;
        const TUPLE          = 1 << 5;
        const MATRIX_BOOLEAN = 1 << 6;
        const MATRIX_INTEGER = 1 << 7;
        const MATRIX_REAL    = 1 << 8;
        const MATRIX_COMPLEX = 1 << 9;

        const SCALAR = Self::BOOLEAN.bits()
            | Self::INTEGER.bits()
            | Self::REAL.bits()
            | Self::COMPLEX.bits();
        const MATRIX = Self::MATRIX_BOOLEAN.bits()
            | Self::MATRIX_INTEGER.bits()
            | Self::MATRIX_REAL.bits()
            | Self::MATRIX_COMPLEX.bits();
    }
}

/// Declared type of a parameter, return value or calculated value
///
/// `None` doubles as the wildcard in known-parameter lists: a position whose
/// type is not known yet.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Unknown type / wildcard
    #[default]
    None,
    /// Any value
    Variant,
    Boolean,
    Integer,
    Real,
    Complex,
    Set,
    Tuple,
    MatrixBoolean,
    MatrixInteger,
    MatrixReal,
    MatrixComplex,
}

/// Fixed mapping table from value type to capabilities
const CAPABILITY_TABLE: [(ValueType, Capabilities); 12] = [
    (ValueType::None, Capabilities::empty()),
    (ValueType::Variant, Capabilities::all()),
    (ValueType::Boolean, Capabilities::BOOLEAN),
    (ValueType::Integer, Capabilities::INTEGER),
    (ValueType::Real, Capabilities::REAL),
    (ValueType::Complex, Capabilities::COMPLEX),
    (ValueType::Set, Capabilities::SET),
    (ValueType::Tuple, Capabilities::TUPLE),
    (ValueType::MatrixBoolean, Capabilities::MATRIX_BOOLEAN),
    (ValueType::MatrixInteger, Capabilities::MATRIX_INTEGER),
    (ValueType::MatrixReal, Capabilities::MATRIX_REAL),
    (ValueType::MatrixComplex, Capabilities::MATRIX_COMPLEX),
];

impl ValueType {
    /// Every value type, in declaration order
    pub const ALL: [ValueType; 12] = [
        ValueType::None,
        ValueType::Variant,
        ValueType::Boolean,
        ValueType::Integer,
        ValueType::Real,
        ValueType::Complex,
        ValueType::Set,
        ValueType::Tuple,
        ValueType::MatrixBoolean,
        ValueType::MatrixInteger,
        ValueType::MatrixReal,
        ValueType::MatrixComplex,
    ];

    /// Capabilities provided by a value of this type
    pub fn capabilities(self) -> Capabilities {
        CAPABILITY_TABLE
            .iter()
            .find(|(value_type, _)| *value_type == self)
            .map(|(_, capabilities)| *capabilities)
            .unwrap_or_else(Capabilities::empty)
    }

    /// True for the wildcard type
    pub fn is_wildcard(self) -> bool {
        self == ValueType::None
    }

    /// Stable lowercase name used in configuration files and signatures
    pub fn name(self) -> &'static str {
        match self {
            ValueType::None => "none",
            ValueType::Variant => "variant",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Real => "real",
            ValueType::Complex => "complex",
            ValueType::Set => "set",
            ValueType::Tuple => "tuple",
            ValueType::MatrixBoolean => "matrix_boolean",
            ValueType::MatrixInteger => "matrix_integer",
            ValueType::MatrixReal => "matrix_real",
            ValueType::MatrixComplex => "matrix_complex",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = FunctionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueType::ALL
            .iter()
            .copied()
            .find(|value_type| value_type.name() == s)
            .ok_or_else(|| FunctionError::UnknownValueType(s.to_string()))
    }
}

impl From<ValueType> for Capabilities {
    fn from(value_type: ValueType) -> Self {
        value_type.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_single_bit_for_concrete_types() {
        for value_type in ValueType::ALL {
            let bits = value_type.capabilities().bits().count_ones();
            match value_type {
                ValueType::None => assert_eq!(bits, 0),
                ValueType::Variant => assert_eq!(value_type.capabilities(), Capabilities::all()),
                _ => assert_eq!(bits, 1, "{} should map to one capability", value_type),
            }
        }
    }

    #[test]
    fn test_union_and_intersects() {
        let numeric = ValueType::Integer.capabilities() | ValueType::Real.capabilities();
        assert!(numeric.intersects(Capabilities::REAL));
        assert!(!numeric.intersects(Capabilities::MATRIX));
        assert!(Capabilities::SCALAR.intersects(numeric));
        // The wildcard provides nothing, so it never intersects.
        assert!(!ValueType::None.capabilities().intersects(Capabilities::all()));
    }

    #[test]
    fn test_names_round_trip_through_from_str() {
        for value_type in ValueType::ALL {
            assert_eq!(value_type.name().parse::<ValueType>().unwrap(), value_type);
        }
        assert!("quaternion".parse::<ValueType>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ValueType::MatrixReal).unwrap();
        assert_eq!(json, "\"matrix_real\"");
    }
}
