//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. Constructors
/// validate, so an instance that exists is always valid: "modifying" one means
/// building a new one through the same constructor.
///
/// ```ignore
/// let range = PositionRange::new(1, 10)?;
/// assert_eq!(range, PositionRange::new(1, 10)?);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
