use bitflags::bitflags;

/// Number of bits reserved for internal flags at the bottom of the word.
const RESERVED_BITS: u32 = 4;

/// Number of user flags available on every node.
pub const USER_FLAG_COUNT: usize = (u64::BITS - RESERVED_BITS) as usize;

bitflags! {
	/// Node state word: internal flags in the low bits, user flags above.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct NodeFlags: u64 {
		/// Layout is sealed; set once declaration and finalisation ran.
		const FINALIZED = 1 << 0;
		const ENABLED = 1 << 1;
		const VISIBLE = 1 << 2;
		/// Changed since the last synchronise.
		const DIRTY = 1 << 3;
	}
}

impl NodeFlags {
	/// Flags of a freshly constructed node.
	pub(crate) const INITIAL: Self = Self::ENABLED.union(Self::VISIBLE);

	/// Bit for user flag `index`. Callers check the range.
	pub(crate) fn user(index: usize) -> Self {
		debug_assert!(index < USER_FLAG_COUNT);
		Self::from_bits_retain(1 << (index as u32 + RESERVED_BITS))
	}
}
