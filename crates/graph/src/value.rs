//! Value types storable in node properties.

use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use uuid::Uuid;

/// A type a property can hold.
///
/// `value_hash` must be stable for equal values; it feeds the node's
/// combined property hash.
pub trait PropertyValue: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
	fn value_hash(&self) -> u64;
}

fn fx_hash(value: &impl Hash) -> u64 {
	let mut hasher = FxHasher::default();
	value.hash(&mut hasher);
	hasher.finish()
}

macro_rules! impl_hashed {
	($($ty:ty),* $(,)?) => {
		$(
			impl PropertyValue for $ty {
				fn value_hash(&self) -> u64 {
					fx_hash(self)
				}
			}
		)*
	};
}

impl_hashed!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, bool, char, String, (), Uuid);

impl PropertyValue for f32 {
	fn value_hash(&self) -> u64 {
		fx_hash(&self.to_bits())
	}
}

impl PropertyValue for f64 {
	fn value_hash(&self) -> u64 {
		fx_hash(&self.to_bits())
	}
}

impl<T: PropertyValue> PropertyValue for Option<T> {
	fn value_hash(&self) -> u64 {
		match self {
			None => fx_hash(&0u8),
			Some(value) => fx_hash(&(1u8, value.value_hash())),
		}
	}
}

impl<T: PropertyValue> PropertyValue for Vec<T> {
	fn value_hash(&self) -> u64 {
		let mut hasher = FxHasher::default();
		self.len().hash(&mut hasher);
		for item in self {
			item.value_hash().hash(&mut hasher);
		}
		hasher.finish()
	}
}

macro_rules! impl_tuple {
	($($name:ident),+) => {
		impl<$($name: PropertyValue),+> PropertyValue for ($($name,)+) {
			#[allow(non_snake_case)]
			fn value_hash(&self) -> u64 {
				let ($($name,)+) = self;
				let mut hasher = FxHasher::default();
				$($name.value_hash().hash(&mut hasher);)+
				hasher.finish()
			}
		}
	};
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);

/// Folds per-property hashes, in layout order, into one node hash.
pub(crate) fn combine_hashes(hashes: impl IntoIterator<Item = u64>) -> u64 {
	let mut hasher = FxHasher::default();
	for hash in hashes {
		hash.hash(&mut hasher);
	}
	hasher.finish()
}
