use std::mem;

/// Size of a serialized pointer slot.
pub const PTR_SIZE: usize = mem::size_of::<usize>();

/// Alignment of the memory backing an [`AlignedBuffer`].
///
/// Values with alignment greater than this cannot be serialized.
///
/// [`AlignedBuffer`]: crate::storage::AlignedBuffer
pub const STORAGE_ALIGNMENT: usize = 16;

/// Alignment every sub-structure is placed at, at minimum.
///
/// Matches the widest scalar alignment of common platforms (`u64`, `f64`,
/// pointers on 64-bit systems).
pub const DEFAULT_ALIGNMENT: usize = max(
	max(mem::align_of::<u64>(), mem::align_of::<f64>()),
	mem::align_of::<usize>(),
);

/// Maximum capacity of an [`AlignedBuffer`].
///
/// [`AlignedBuffer`]: crate::storage::AlignedBuffer
pub const MAX_CAPACITY: usize = aligned_max_capacity(STORAGE_ALIGNMENT);

/// Round up `pos` to alignment of `alignment`.
///
/// `alignment` must be a power of 2.
///
/// Caller must ensure `pos + alignment` cannot overflow `usize`.
/// This is satisfied if both `pos` and `alignment` are less than `isize::MAX`.
pub const fn align_up_to(pos: usize, alignment: usize) -> usize {
	debug_assert!(alignment.is_power_of_two());
	(pos + alignment - 1) & !(alignment - 1)
}

/// Check if `pos` is a multiple of `alignment`.
///
/// `alignment` must be a power of 2.
pub const fn is_aligned_to(pos: usize, alignment: usize) -> bool {
	debug_assert!(alignment.is_power_of_two());
	pos & (alignment - 1) == 0
}

/// Get maximum capacity of an allocation with the given alignment.
///
/// `alignment` must be a power of 2, less than `isize::MAX`.
///
/// Dictated by the requirements of [`std::alloc::Layout`]:
/// "`size`, when rounded up to the nearest multiple of `align`, must not
/// overflow `isize` (i.e. the rounded value must be less than or equal to
/// `isize::MAX`)".
pub const fn aligned_max_capacity(alignment: usize) -> usize {
	assert!(alignment != 0, "`alignment` cannot be 0");
	assert!(
		alignment.is_power_of_two(),
		"`alignment` must be a power of 2"
	);
	assert!(
		alignment < isize::MAX as usize,
		"`alignment` must be less than isize::MAX"
	);
	isize::MAX as usize - (alignment - 1)
}

/// Alignment a sub-structure of type `T` is placed at in the output.
#[inline]
pub const fn struct_alignment<T>() -> usize {
	max(mem::align_of::<T>(), DEFAULT_ALIGNMENT)
}

const fn max(a: usize, b: usize) -> usize {
	if a > b {
		a
	} else {
		b
	}
}
