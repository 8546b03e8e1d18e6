use std::{mem, ptr::NonNull};

use crate::util::PTR_SIZE;

/// Trait for pointer fields which the serializer can replace with offsets.
///
/// Implemented for `*const T`, `*mut T` and `Option<NonNull<T>>`.
///
/// # Safety
///
/// Implementors must be represented in memory as a single pointer-sized
/// address, with null represented as 0. [`from_addr`](PtrField::from_addr)
/// must produce a value whose [`target_addr`](PtrField::target_addr) is the
/// address given.
pub unsafe trait PtrField: Copy {
	/// Type pointed to.
	type Target;

	/// Static assertion that field is the size of a pointer.
	/// Referenced by every serializer method taking a `PtrField`.
	const ASSERT_POINTER_SIZED: () = assert!(
		mem::size_of::<Self>() == PTR_SIZE,
		"pointer fields must be the size of a pointer"
	);

	/// Get address pointed to, or 0 if null.
	fn target_addr(&self) -> usize;

	/// Create pointer from an address (0 for null).
	fn from_addr(addr: usize) -> Self;
}

unsafe impl<T> PtrField for *const T {
	type Target = T;

	#[inline]
	fn target_addr(&self) -> usize {
		*self as usize
	}

	#[inline]
	fn from_addr(addr: usize) -> Self {
		addr as *const T
	}
}

unsafe impl<T> PtrField for *mut T {
	type Target = T;

	#[inline]
	fn target_addr(&self) -> usize {
		*self as usize
	}

	#[inline]
	fn from_addr(addr: usize) -> Self {
		addr as *mut T
	}
}

// `Option<NonNull<T>>` uses the null niche, so is represented as a plain address
unsafe impl<T> PtrField for Option<NonNull<T>> {
	type Target = T;

	#[inline]
	fn target_addr(&self) -> usize {
		self.map_or(0, |ptr| ptr.as_ptr() as usize)
	}

	#[inline]
	fn from_addr(addr: usize) -> Self {
		NonNull::new(addr as *mut T)
	}
}
