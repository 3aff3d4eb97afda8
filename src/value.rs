//! Calculated values attached to elements
//!
//! Values are immutable once built and shared through [`CalculatedValue`]
//! (an `Arc`), so the same result can be handed to several observers without
//! copying.

use crate::capabilities::{Capabilities, ValueType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared, immutable calculated value
pub type CalculatedValue = Arc<Value>;

/// A runtime value produced by evaluating an element
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Complex { real: f64, imaginary: f64 },
    Set(Vec<Value>),
    Tuple(Vec<Value>),
    Matrix(Matrix),
}

/// Dense row-major matrix of scalars
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub columns: usize,
    pub entries: Vec<Value>,
}

impl Matrix {
    /// Build a matrix, returning `None` when the entry count does not match the shape
    pub fn new(rows: usize, columns: usize, entries: Vec<Value>) -> Option<Self> {
        let fits = rows.checked_mul(columns).is_some_and(|size| size == entries.len());
        fits.then_some(Self { rows, columns, entries })
    }

    /// Entry at (row, column)
    pub fn get(&self, row: usize, column: usize) -> Option<&Value> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        self.entries.get(row * self.columns + column)
    }

    /// Matrix type, widened to the richest scalar present
    pub fn value_type(&self) -> ValueType {
        let widest = self
            .entries
            .iter()
            .map(|entry| match entry {
                Value::Boolean(_) => 0,
                Value::Integer(_) => 1,
                Value::Real(_) => 2,
                _ => 3,
            })
            .max()
            .unwrap_or(0);

        match widest {
            0 => ValueType::MatrixBoolean,
            1 => ValueType::MatrixInteger,
            2 => ValueType::MatrixReal,
            _ => ValueType::MatrixComplex,
        }
    }
}

impl Value {
    /// Declared type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::Real(_) => ValueType::Real,
            Value::Complex { .. } => ValueType::Complex,
            Value::Set(_) => ValueType::Set,
            Value::Tuple(_) => ValueType::Tuple,
            Value::Matrix(matrix) => matrix.value_type(),
        }
    }

    /// Capabilities this value provides
    pub fn capabilities(&self) -> Capabilities {
        self.value_type().capabilities()
    }

    /// Wrap into the shared form stored on elements
    pub fn shared(self) -> CalculatedValue {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_shape_checked() {
        assert!(Matrix::new(2, 2, vec![Value::Integer(1); 3]).is_none());
        let matrix = Matrix::new(1, 2, vec![Value::Integer(1), Value::Real(2.5)]).unwrap();
        assert_eq!(matrix.get(0, 1), Some(&Value::Real(2.5)));
        assert_eq!(matrix.get(1, 0), None);
    }

    #[test]
    fn test_matrix_shape_overflow_is_rejected() {
        assert!(Matrix::new(usize::MAX, 2, Vec::new()).is_none());
        assert!(Matrix::new(0, usize::MAX, Vec::new()).is_some());
    }

    #[test]
    fn test_matrix_type_widens() {
        let matrix = Matrix::new(1, 2, vec![Value::Boolean(true), Value::Integer(3)]).unwrap();
        assert_eq!(Value::Matrix(matrix).value_type(), ValueType::MatrixInteger);

        let matrix = Matrix::new(
            1,
            2,
            vec![Value::Real(1.0), Value::Complex { real: 0.0, imaginary: 1.0 }],
        )
        .unwrap();
        assert_eq!(Value::Matrix(matrix).capabilities(), Capabilities::MATRIX_COMPLEX);
    }
}
