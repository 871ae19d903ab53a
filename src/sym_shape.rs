//! Shapes with an optional rank and optional per-dimension sizes.

use std::fmt;

/// Shape of a tensor whose rank and dimension sizes may be only partially
/// known.
///
/// A shape is either of unknown rank, or it has a known rank and one entry
/// per dimension, each of which is either a known size or unknown.
///
/// ```
/// use rten_symbolic_shapes::SymbolicShape;
///
/// let shape = SymbolicShape::from_dims(vec![None, Some(3), Some(224)]);
/// assert_eq!(shape.rank(), Some(3));
/// assert_eq!(shape.size(0), None);
/// assert_eq!(shape.size(1), Some(3));
/// assert!(!shape.is_complete());
/// assert_eq!(shape.to_string(), "[?, 3, 224]");
/// ```
#[derive(Clone, Default, Eq, Hash, PartialEq)]
pub struct SymbolicShape {
    /// Sizes of each dimension, or `None` if the rank is unknown.
    dims: Option<Vec<Option<i64>>>,
}

impl SymbolicShape {
    /// Create a shape with unknown rank.
    pub fn unknown() -> Self {
        Self { dims: None }
    }

    /// Create a shape with known rank, where `dims` specifies the known or
    /// unknown size of each dimension.
    pub fn from_dims(dims: Vec<Option<i64>>) -> Self {
        Self { dims: Some(dims) }
    }

    /// Create a shape where the rank and all dimension sizes are known.
    pub fn from_sizes(sizes: &[i64]) -> Self {
        Self::from_dims(sizes.iter().copied().map(Some).collect())
    }

    /// Create a shape with a known rank but unknown dimension sizes.
    pub fn with_rank(rank: usize) -> Self {
        Self::from_dims(vec![None; rank])
    }

    /// Return the number of dimensions, if known.
    pub fn rank(&self) -> Option<usize> {
        self.dims.as_ref().map(|dims| dims.len())
    }

    /// Return the per-dimension sizes, or `None` if the rank is unknown.
    pub fn dims(&self) -> Option<&[Option<i64>]> {
        self.dims.as_deref()
    }

    /// Return the size of the `index`th dimension.
    ///
    /// Returns `None` if the rank is unknown, the index is out of bounds or
    /// the dimension's size is unknown.
    pub fn size(&self, index: usize) -> Option<i64> {
        self.dims.as_ref()?.get(index).copied().flatten()
    }

    /// Return true if the rank and every dimension size are known.
    pub fn is_complete(&self) -> bool {
        self.dims
            .as_ref()
            .is_some_and(|dims| dims.iter().all(|d| d.is_some()))
    }

    /// Return the dimension sizes if the shape is complete.
    pub fn to_concrete(&self) -> Option<Vec<i64>> {
        self.dims.as_ref()?.iter().copied().collect()
    }
}

impl From<&[i64]> for SymbolicShape {
    fn from(sizes: &[i64]) -> Self {
        Self::from_sizes(sizes)
    }
}

impl<const N: usize> From<[i64; N]> for SymbolicShape {
    fn from(sizes: [i64; N]) -> Self {
        Self::from_sizes(&sizes)
    }
}

impl fmt::Display for SymbolicShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(dims) = &self.dims else {
            return write!(f, "*");
        };
        write!(f, "[")?;
        for (i, dim) in dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match dim {
                Some(size) => write!(f, "{}", size)?,
                None => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}

impl fmt::Debug for SymbolicShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolicShape({})", self)
    }
}

#[cfg(feature = "serde")]
mod impl_serialize {
    use serde::de::{Deserialize, Deserializer};
    use serde::ser::{Serialize, Serializer};

    use super::SymbolicShape;

    // Shapes are serialized as `null` (unknown rank) or a list where unknown
    // dimensions are `null`.
    impl Serialize for SymbolicShape {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            self.dims.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for SymbolicShape {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let dims = Option::<Vec<Option<i64>>>::deserialize(deserializer)?;
            Ok(SymbolicShape { dims })
        }
    }
}
