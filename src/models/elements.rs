//! Element kinds and their static properties
//!
//! An element's kind fixes how it holds children, how many text regions it
//! carries and how tightly it binds when displayed inside another element.

use crate::capabilities::ValueType;
use serde::{Deserialize, Serialize};

/// Precedence levels; higher binds tighter
pub mod precedence {
    /// Context imposed on children that are visually grouped (fraction, argument list, frame)
    pub const GROUPING: u8 = 0;
    pub const ADDITION: u8 = 40;
    pub const MULTIPLICATION: u8 = 50;
    pub const UNARY: u8 = 60;
    pub const POWER: u8 = 70;
    pub const FUNCTION: u8 = 90;
    /// Leaves and self-delimiting elements
    pub const ATOMIC: u8 = 100;
}

/// How an element of a given kind holds its children
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Leaf
    None,
    /// Exactly this many slots, each possibly empty
    Fixed(usize),
    /// Ordered list that grows and shrinks
    Positional,
    /// Ordered groups of ordered children
    Grouped,
}

impl Placement {
    pub fn name(&self) -> &'static str {
        match self {
            Placement::None => "leaf",
            Placement::Fixed(_) => "fixed",
            Placement::Positional => "positional",
            Placement::Grouped => "grouped",
        }
    }
}

/// Every kind of node in the document/expression tree
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    /// Free text
    Text = 0,

    /// `true` / `false`
    BooleanLiteral = 1,

    /// Integer digits
    IntegerLiteral = 2,

    /// Mantissa and exponent regions
    RealLiteral = 3,

    /// Variable name and subscript regions
    Variable = 4,

    /// Paragraph or document frame holding a sequence of elements
    Frame = 5,

    /// Plot with a caption region and one group per data series
    Plot = 6,

    /// Displays the calculated value of its single child
    ValueField = 7,

    Addition = 8,
    Subtraction = 9,
    Multiplication = 10,

    /// Displayed as a fraction
    Division = 11,

    Power = 12,
    UnaryMinus = 13,

    /// Explicit parenthesis around a single child
    Parenthesis = 14,

    /// Function name and subscript regions; children are the arguments
    FunctionCall = 15,

    /// One group per row
    Matrix = 16,
}

impl ElementKind {
    pub const ALL: [ElementKind; 17] = [
        ElementKind::Text,
        ElementKind::BooleanLiteral,
        ElementKind::IntegerLiteral,
        ElementKind::RealLiteral,
        ElementKind::Variable,
        ElementKind::Frame,
        ElementKind::Plot,
        ElementKind::ValueField,
        ElementKind::Addition,
        ElementKind::Subtraction,
        ElementKind::Multiplication,
        ElementKind::Division,
        ElementKind::Power,
        ElementKind::UnaryMinus,
        ElementKind::Parenthesis,
        ElementKind::FunctionCall,
        ElementKind::Matrix,
    ];

    /// Child placement strategy
    pub fn placement(self) -> Placement {
        match self {
            ElementKind::Text
            | ElementKind::BooleanLiteral
            | ElementKind::IntegerLiteral
            | ElementKind::RealLiteral
            | ElementKind::Variable => Placement::None,
            ElementKind::ValueField | ElementKind::UnaryMinus | ElementKind::Parenthesis => {
                Placement::Fixed(1)
            }
            ElementKind::Addition
            | ElementKind::Subtraction
            | ElementKind::Multiplication
            | ElementKind::Division
            | ElementKind::Power => Placement::Fixed(2),
            ElementKind::Frame | ElementKind::FunctionCall => Placement::Positional,
            ElementKind::Plot | ElementKind::Matrix => Placement::Grouped,
        }
    }

    /// Number of text regions a fresh element carries
    pub fn region_count(self) -> usize {
        match self {
            ElementKind::Text
            | ElementKind::BooleanLiteral
            | ElementKind::IntegerLiteral
            | ElementKind::Plot => 1,
            ElementKind::RealLiteral | ElementKind::Variable | ElementKind::FunctionCall => 2,
            _ => 0,
        }
    }

    /// Intrinsic precedence of the element itself
    pub fn precedence(self) -> u8 {
        match self {
            ElementKind::Addition | ElementKind::Subtraction => precedence::ADDITION,
            ElementKind::Multiplication | ElementKind::Division => precedence::MULTIPLICATION,
            ElementKind::UnaryMinus => precedence::UNARY,
            ElementKind::Power => precedence::POWER,
            ElementKind::FunctionCall => precedence::FUNCTION,
            _ => precedence::ATOMIC,
        }
    }

    /// Precedence context imposed on the child at `index`
    pub fn child_precedence(self, index: usize) -> u8 {
        match self {
            ElementKind::Addition | ElementKind::Multiplication => self.precedence(),
            // a - (b + c) keeps its parenthesis, (a + b) - c does not
            ElementKind::Subtraction if index == 0 => self.precedence(),
            ElementKind::Subtraction => self.precedence() + 1,
            // (a^b)^c needs one, a^(b^c) is drawn as a superscript
            ElementKind::Power if index == 0 => self.precedence() + 1,
            ElementKind::UnaryMinus => self.precedence(),
            _ => precedence::GROUPING,
        }
    }

    /// Type the element is known to produce without evaluation
    pub fn value_type_hint(self) -> ValueType {
        match self {
            ElementKind::BooleanLiteral => ValueType::Boolean,
            ElementKind::IntegerLiteral => ValueType::Integer,
            ElementKind::RealLiteral => ValueType::Real,
            _ => ValueType::None,
        }
    }

    /// XML tag name
    pub fn tag(self) -> &'static str {
        match self {
            ElementKind::Text => "text",
            ElementKind::BooleanLiteral => "boolean",
            ElementKind::IntegerLiteral => "integer",
            ElementKind::RealLiteral => "real",
            ElementKind::Variable => "variable",
            ElementKind::Frame => "frame",
            ElementKind::Plot => "plot",
            ElementKind::ValueField => "valuefield",
            ElementKind::Addition => "add",
            ElementKind::Subtraction => "subtract",
            ElementKind::Multiplication => "multiply",
            ElementKind::Division => "divide",
            ElementKind::Power => "power",
            ElementKind::UnaryMinus => "negate",
            ElementKind::Parenthesis => "parenthesis",
            ElementKind::FunctionCall => "call",
            ElementKind::Matrix => "matrix",
        }
    }

    /// Kind for an XML tag name
    pub fn from_tag(tag: &str) -> Option<Self> {
        ElementKind::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }

    /// True when the element can hold children
    pub fn is_container(self) -> bool {
        self.placement() != Placement::None
    }
}

// Serialized as the tag name
impl Serialize for ElementKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.tag())
    }
}

// Accepts either the tag name or the numeric discriminant
impl<'de> Deserialize<'de> for ElementKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ElementKindVisitor;

        impl<'de> serde::de::Visitor<'de> for ElementKindVisitor {
            type Value = ElementKind;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an element tag name or number")
            }

            fn visit_u64<E>(self, value: u64) -> Result<ElementKind, E>
            where
                E: serde::de::Error,
            {
                ElementKind::ALL
                    .iter()
                    .copied()
                    .find(|kind| *kind as u64 == value)
                    .ok_or_else(|| E::custom(format!("invalid ElementKind value: {}", value)))
            }

            fn visit_str<E>(self, value: &str) -> Result<ElementKind, E>
            where
                E: serde::de::Error,
            {
                ElementKind::from_tag(value)
                    .ok_or_else(|| E::custom(format!("invalid ElementKind tag: {}", value)))
            }
        }

        deserializer.deserialize_any(ElementKindVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_unique_and_round_trip() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ElementKind::from_tag("paragraph"), None);
    }

    #[test]
    fn test_leaves_have_regions_operators_do_not() {
        assert_eq!(ElementKind::RealLiteral.region_count(), 2);
        assert_eq!(ElementKind::Addition.region_count(), 0);
        assert!(!ElementKind::Variable.is_container());
        assert_eq!(ElementKind::Division.placement(), Placement::Fixed(2));
    }

    #[test]
    fn test_subtraction_right_operand_context() {
        let kind = ElementKind::Subtraction;
        assert_eq!(kind.child_precedence(0), precedence::ADDITION);
        assert!(kind.child_precedence(1) > ElementKind::Addition.precedence());
    }

    #[test]
    fn test_serde_accepts_tag_or_number() {
        let kind: ElementKind = serde_json::from_str("\"call\"").unwrap();
        assert_eq!(kind, ElementKind::FunctionCall);
        let kind: ElementKind = serde_json::from_str("12").unwrap();
        assert_eq!(kind, ElementKind::Power);
        assert_eq!(serde_json::to_string(&ElementKind::Plot).unwrap(), "\"plot\"");
        assert!(serde_json::from_str::<ElementKind>("99").is_err());
    }
}
