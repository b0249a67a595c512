//! Per-example tensor shapes with optionally unknown dimensions.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Shape of a single example, i.e. without the leading batch axis.
///
/// A `None` dimension is compatible with any size. The shape `[None]`
/// returned by [`TensorShape::unknown`] is compatible with every shape,
/// regardless of rank.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TensorShape {
	dims: Vec<Option<usize>>,
}

impl TensorShape {
	pub fn new(dims: Vec<Option<usize>>) -> Self {
		Self { dims }
	}

	pub fn unknown() -> Self {
		Self { dims: vec![None] }
	}

	pub fn is_unknown(&self) -> bool {
		self.dims == vec![None]
	}

	pub fn rank(&self) -> usize {
		self.dims.len()
	}

	/// Number of scalars in one example.
	///
	/// # Panics
	/// If any dimension is undefined
	pub fn dims(&self) -> usize {
		self.dims.iter().map(|x| x.unwrap()).product()
	}

	pub fn is_fully_defined(&self) -> bool {
		self.dims.iter().all(Option::is_some)
	}

	/// The concrete dimensions, if every one of them is known.
	pub fn as_defined(&self) -> Option<Vec<usize>> {
		self.dims.iter().copied().collect()
	}

	pub fn is_compatible_with(&self, other: &Self) -> bool {
		if self.is_unknown() || other.is_unknown() {
			return true;
		}
		if self.dims.len() != other.dims.len() {
			return false;
		}
		self.dims
			.iter()
			.zip(other.dims.iter())
			.all(|(x, y)| match (x, y) {
				(Some(a), Some(b)) => a == b,
				_ => true,
			})
	}

	/// Shape of each example in a batched array shape.
	pub fn from_batch_shape(batch_shape: &[usize]) -> Self {
		Self::from(batch_shape.iter().skip(1).copied().collect::<Vec<_>>())
	}
}

impl Index<usize> for TensorShape {
	type Output = Option<usize>;

	fn index(&self, idx: usize) -> &Option<usize> {
		&self.dims[idx]
	}
}

impl From<Vec<usize>> for TensorShape {
	fn from(v: Vec<usize>) -> Self {
		Self {
			dims: v.into_iter().map(Some).collect(),
		}
	}
}

impl fmt::Display for TensorShape {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let dims: Vec<String> = self
			.dims
			.iter()
			.map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
			.collect();
		write!(f, "[{}]", dims.join(", "))
	}
}
