//! Operation registry: the schema of accepted instructions.
//!
//! Every operation name maps to a parameter contract. An untrusted
//! `(operation, parameter)` pair goes through two steps:
//!
//! 1. [`OperationRegistry::validate`] checks the parameter against the
//!    declared [`ParameterKind`]. An unknown operation is an error, never a
//!    plain `false`, so a caller cannot mistake it for a bad parameter.
//! 2. [`OperationRegistry::construct`] parses the parameter into a concrete
//!    [`Transform`]. It fails explicitly with [`ConstructionError`] rather than
//!    ever producing an empty transform.
//!
//! ## Standard schema
//!
//! | Operation | Parameter | Meaning |
//! |---|---|---|
//! | `resize` | double | scale multiplier for width and height |
//! | `rotate` | double | angle in degrees, counter-clockwise about the centre |
//! | `flip` | integer | 0 = vertical, 1 = horizontal, 2+ = both |
//! | `brightness` | double | multiplicative gain |
//! | `contrast` | double | additive offset |
//! | `gamma` | double | power-law exponent |
//! | `colour` | one of `rgb hsv grey ycc hsl` | target colour space |
//! | `smooth` | one of `gauss box sharp` | kernel family |
//!
//! ## Parameter rules
//!
//! - **Integer**: non-empty, ASCII digits only, fits in `u32`. No sign.
//! - **Double**: the whole string parses as a finite `f64`.
//! - **One of**: exact, case-sensitive match against one alternative.
//!
//! Integer and double checks are the same parses construction performs, so
//! a parameter that validates always constructs for the standard operations.

use crate::imaging::{ColourSpace, FlipAxis, SmoothKernel, Transform};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown operation: {0:?}")]
    UnknownOperation(String),
    #[error("operation {0:?} is declared more than once")]
    DuplicateOperation(String),
    #[error("operation {0:?} has no alternatives")]
    EmptyAlternatives(String),
}

/// A validated instruction that still could not be turned into a transform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("no transform is bound to operation {0:?}")]
    NoTransform(String),
    #[error("cannot build {operation} from parameter {parameter:?}")]
    BadParameter { operation: String, parameter: String },
}

/// Parameter contract for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    Integer,
    Double,
    OneOf(Vec<String>),
}

impl ParameterKind {
    fn one_of(names: &[&str]) -> Self {
        ParameterKind::OneOf(names.iter().map(|s| s.to_string()).collect())
    }

    /// Whether `param` satisfies this contract.
    pub fn accepts(&self, param: &str) -> bool {
        match self {
            ParameterKind::Integer => parse_integer(param).is_some(),
            ParameterKind::Double => parse_double(param).is_some(),
            ParameterKind::OneOf(alternatives) => alternatives.iter().any(|a| a == param),
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKind::Integer => f.write_str("integer"),
            ParameterKind::Double => f.write_str("double"),
            ParameterKind::OneOf(alternatives) => write!(f, "one of {}", alternatives.join("|")),
        }
    }
}

fn parse_integer(param: &str) -> Option<u32> {
    if param.is_empty() || !param.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    param.parse().ok()
}

fn parse_double(param: &str) -> Option<f64> {
    param.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// One row of the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSchema {
    pub name: String,
    pub kind: ParameterKind,
}

impl OperationSchema {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Immutable table of operations, shared by every session.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    operations: Vec<OperationSchema>,
}

impl OperationRegistry {
    /// Build a registry, enforcing unique names and non-empty alternatives.
    pub fn new(operations: Vec<OperationSchema>) -> Result<Self, RegistryError> {
        for (i, op) in operations.iter().enumerate() {
            if operations[..i].iter().any(|earlier| earlier.name == op.name) {
                return Err(RegistryError::DuplicateOperation(op.name.clone()));
            }
            if matches!(&op.kind, ParameterKind::OneOf(alts) if alts.is_empty()) {
                return Err(RegistryError::EmptyAlternatives(op.name.clone()));
            }
        }
        Ok(Self { operations })
    }

    /// The eight operations the server ships with.
    pub fn standard() -> Self {
        Self {
            operations: vec![
                OperationSchema::new("resize", ParameterKind::Double),
                OperationSchema::new("rotate", ParameterKind::Double),
                OperationSchema::new("flip", ParameterKind::Integer),
                OperationSchema::new("brightness", ParameterKind::Double),
                OperationSchema::new("contrast", ParameterKind::Double),
                OperationSchema::new("gamma", ParameterKind::Double),
                OperationSchema::new("colour", ParameterKind::one_of(ColourSpace::NAMES)),
                OperationSchema::new("smooth", ParameterKind::one_of(SmoothKernel::NAMES)),
            ],
        }
    }

    pub fn operations(&self) -> &[OperationSchema] {
        &self.operations
    }

    pub fn schema(&self, operation: &str) -> Option<&OperationSchema> {
        self.operations.iter().find(|op| op.name == operation)
    }

    /// Check `param` against the contract of `operation`.
    ///
    /// Returns `Ok(false)` for a parameter that breaks the contract and
    /// `Err(UnknownOperation)` when the operation is not in the table.
    pub fn validate(&self, operation: &str, param: &str) -> Result<bool, RegistryError> {
        let schema = self
            .schema(operation)
            .ok_or_else(|| RegistryError::UnknownOperation(operation.to_string()))?;
        Ok(schema.kind.accepts(param))
    }

    /// Parse `param` and bind it into the transform for `operation`.
    ///
    /// Expects [`validate`](Self::validate) to have passed. Operations that
    /// are in a custom table but have no transform behind them fail with
    /// [`ConstructionError::NoTransform`].
    pub fn construct(&self, operation: &str, param: &str) -> Result<Transform, ConstructionError> {
        let bad = || ConstructionError::BadParameter {
            operation: operation.to_string(),
            parameter: param.to_string(),
        };
        let double = || parse_double(param).ok_or_else(bad);

        let transform = match operation {
            "resize" => Transform::Resize { scale: double()? },
            "rotate" => Transform::Rotate { degrees: double()? },
            "flip" => Transform::Flip(FlipAxis::from_code(parse_integer(param).ok_or_else(bad)?)),
            "brightness" => Transform::Brightness { gain: double()? },
            "contrast" => Transform::Contrast { offset: double()? },
            "gamma" => Transform::Gamma { exponent: double()? },
            "colour" => Transform::Colour(param.parse().map_err(|_| bad())?),
            "smooth" => Transform::Smooth(param.parse().map_err(|_| bad())?),
            other => return Err(ConstructionError::NoTransform(other.to_string())),
        };
        Ok(transform)
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> OperationRegistry {
        OperationRegistry::standard()
    }

    fn sample_param(kind: &ParameterKind) -> String {
        match kind {
            ParameterKind::Integer => "1".into(),
            ParameterKind::Double => "0.5".into(),
            ParameterKind::OneOf(alts) => alts[0].clone(),
        }
    }

    // =========================================================================
    // Schema
    // =========================================================================

    #[test]
    fn standard_schema_has_eight_unique_operations() {
        let reg = registry();
        assert_eq!(reg.operations().len(), 8);
        assert!(OperationRegistry::new(reg.operations().to_vec()).is_ok());
    }

    #[test]
    fn duplicate_names_rejected() {
        let result = OperationRegistry::new(vec![
            OperationSchema::new("resize", ParameterKind::Double),
            OperationSchema::new("resize", ParameterKind::Integer),
        ]);
        assert_eq!(
            result.unwrap_err(),
            RegistryError::DuplicateOperation("resize".into())
        );
    }

    #[test]
    fn empty_alternatives_rejected() {
        let result = OperationRegistry::new(vec![OperationSchema::new(
            "colour",
            ParameterKind::OneOf(vec![]),
        )]);
        assert_eq!(
            result.unwrap_err(),
            RegistryError::EmptyAlternatives("colour".into())
        );
    }

    #[test]
    fn kind_display() {
        assert_eq!(ParameterKind::Double.to_string(), "double");
        assert_eq!(
            registry().schema("smooth").unwrap().kind.to_string(),
            "one of gauss|box|sharp"
        );
    }

    // =========================================================================
    // validate
    // =========================================================================

    #[test]
    fn every_operation_accepts_its_own_kind() {
        let reg = registry();
        for op in reg.operations() {
            let param = sample_param(&op.kind);
            assert_eq!(reg.validate(&op.name, &param), Ok(true), "{}", op.name);
        }
    }

    #[test]
    fn wrong_kind_is_false() {
        let reg = registry();
        assert_eq!(reg.validate("resize", "abc"), Ok(false));
        assert_eq!(reg.validate("flip", "0.5"), Ok(false));
        assert_eq!(reg.validate("colour", "0.5"), Ok(false));
    }

    #[test]
    fn unknown_operation_is_an_error() {
        assert_eq!(
            registry().validate("unknown-op", "x"),
            Err(RegistryError::UnknownOperation("unknown-op".into()))
        );
    }

    #[test]
    fn integer_is_digits_only() {
        let reg = registry();
        assert_eq!(reg.validate("flip", "2"), Ok(true));
        assert_eq!(reg.validate("flip", "007"), Ok(true));
        assert_eq!(reg.validate("flip", "-1"), Ok(false));
        assert_eq!(reg.validate("flip", "+1"), Ok(false));
        assert_eq!(reg.validate("flip", " 1"), Ok(false));
        assert_eq!(reg.validate("flip", ""), Ok(false));
        assert_eq!(reg.validate("flip", "99999999999"), Ok(false));
    }

    #[test]
    fn double_must_parse_completely() {
        let reg = registry();
        for ok in ["0.5", "-90", "1e2", ".25", "3"] {
            assert_eq!(reg.validate("rotate", ok), Ok(true), "{ok}");
        }
        for bad in ["", "1.5x", " 1.5", "1,5", "NaN", "inf", "abc"] {
            assert_eq!(reg.validate("rotate", bad), Ok(false), "{bad}");
        }
    }

    #[test]
    fn one_of_matches_single_alternatives_exactly() {
        let reg = registry();
        for space in ["rgb", "hsv", "grey", "ycc", "hsl"] {
            assert_eq!(reg.validate("colour", space), Ok(true), "{space}");
        }
        assert_eq!(reg.validate("colour", "bgr"), Ok(false));
        assert_eq!(reg.validate("colour", "RGB"), Ok(false));
        assert_eq!(reg.validate("colour", "rgb|hsv|grey|ycc|hsl"), Ok(false));
        assert_eq!(reg.validate("smooth", "box"), Ok(true));
        assert_eq!(reg.validate("smooth", "gauss|box|sharp"), Ok(false));
    }

    // =========================================================================
    // construct
    // =========================================================================

    #[test]
    fn construct_binds_parameters() {
        let reg = registry();
        assert_eq!(
            reg.construct("resize", "0.5"),
            Ok(Transform::Resize { scale: 0.5 })
        );
        assert_eq!(
            reg.construct("rotate", "-45"),
            Ok(Transform::Rotate { degrees: -45.0 })
        );
        assert_eq!(
            reg.construct("flip", "2"),
            Ok(Transform::Flip(FlipAxis::Both))
        );
        assert_eq!(
            reg.construct("gamma", "2.2"),
            Ok(Transform::Gamma { exponent: 2.2 })
        );
        assert_eq!(
            reg.construct("colour", "ycc"),
            Ok(Transform::Colour(ColourSpace::Ycc))
        );
        assert_eq!(
            reg.construct("smooth", "sharp"),
            Ok(Transform::Smooth(SmoothKernel::Sharp))
        );
    }

    #[test]
    fn every_valid_sample_constructs() {
        let reg = registry();
        for op in reg.operations() {
            let param = sample_param(&op.kind);
            let transform = reg.construct(&op.name, &param).unwrap();
            assert_eq!(transform.operation(), op.name);
        }
    }

    #[test]
    fn construct_fails_on_unparseable_parameter() {
        let result = registry().construct("brightness", "bright");
        assert!(matches!(
            result,
            Err(ConstructionError::BadParameter { .. })
        ));
    }

    #[test]
    fn validated_but_unbound_operation_fails_construction() {
        let reg = OperationRegistry::new(vec![OperationSchema::new(
            "sepia",
            ParameterKind::Double,
        )])
        .unwrap();
        assert_eq!(reg.validate("sepia", "0.8"), Ok(true));
        assert_eq!(
            reg.construct("sepia", "0.8"),
            Err(ConstructionError::NoTransform("sepia".into()))
        );
    }

    #[test]
    fn widened_alternatives_fail_construction_not_silently() {
        let reg = OperationRegistry::new(vec![OperationSchema::new(
            "colour",
            ParameterKind::one_of(&["rgb", "lab"]),
        )])
        .unwrap();
        assert_eq!(reg.validate("colour", "lab"), Ok(true));
        assert!(matches!(
            reg.construct("colour", "lab"),
            Err(ConstructionError::BadParameter { .. })
        ));
    }
}
