use std::mem;

use crate::{storage::AlignedBuffer, util::is_aligned_to, Result, Serializer};

/// Trait for structures which know how to serialize the data they point to.
///
/// Usually implemented with `#[derive(Serialize)]`, annotating pointer fields
/// with `#[ser(push)]`, `#[ser(string)]` or `#[ser(null)]`.
pub trait Serialize {
	/// Serialize everything this value points to.
	///
	/// # Safety
	///
	/// * `self` must be the current structure of `serializer`.
	/// * Every non-null pointer this implementation follows must point to a
	///   valid value.
	unsafe fn serialize_fields(&self, serializer: &mut Serializer) -> Result<()>;
}

/// Trait for structures which know how to resolve their pointer fields after
/// deserialization.
///
/// Usually implemented with `#[derive(Resolve)]`.
pub trait Resolve {
	/// Resolve every serialized pointer field of the value at `this`, and of the
	/// values they point to, recursively.
	///
	/// # Safety
	///
	/// `this` must point to a value within a buffer produced by
	/// [`Serializer`], with the same serialization schema, whose pointer fields
	/// have not yet been resolved.
	unsafe fn resolve_fields(this: *mut Self);
}

/// Serialize a structure and everything it points to.
///
/// # Safety
///
/// Every pointer `T`'s [`Serialize`] implementation follows must be null or
/// point to a valid value.
pub unsafe fn serialize<T: Serialize>(root: &T) -> Result<AlignedBuffer> {
	serialize_with_capacity(root, 0)
}

/// Serialize a structure and everything it points to, with output buffer
/// pre-allocated with capacity of at least `capacity` bytes.
///
/// # Safety
///
/// Every pointer `T`'s [`Serialize`] implementation follows must be null or
/// point to a valid value.
pub unsafe fn serialize_with_capacity<T: Serialize>(
	root: &T,
	capacity: usize,
) -> Result<AlignedBuffer> {
	let mut serializer = Serializer::with_capacity(root, capacity)?;
	root.serialize_fields(&mut serializer)?;
	serializer.pop()?;

	let mut buf = serializer.into_buffer();
	buf.shrink_to_fit()?;
	Ok(buf)
}

/// Resolve all pointers in a serialized buffer and return reference to the
/// root structure.
///
/// The buffer is modified in place. Pointers in the result point into
/// `bytes`, so the buffer must not be moved while the result is in use.
///
/// # Safety
///
/// * `bytes` must hold the output of serializing a `T` (it may have been moved
///   or copied since), whose pointers have not yet been resolved.
/// * `bytes` must be aligned for `T`.
pub unsafe fn deserialize<T: Resolve>(bytes: &mut [u8]) -> &T {
	debug_assert!(bytes.len() >= mem::size_of::<T>());
	debug_assert!(is_aligned_to(bytes.as_ptr() as usize, mem::align_of::<T>()));

	let root = bytes.as_mut_ptr().cast::<T>();
	T::resolve_fields(root);
	&*root
}
