use std::ptr;

use crate::{Offset, PtrField};

/// Convert a serialized pointer slot into a usable pointer, in place.
///
/// `container` is the address of the structure which contains `slot`, in its
/// current location (usually a pointer into a serialized buffer, or itself the
/// result of resolving the pointer to that structure).
///
/// A null slot is set to null. Otherwise the slot is overwritten with
/// `container + offset`. Returns the resolved pointer.
///
/// Resolution is one-shot: resolving the same slot a second time will produce
/// garbage. Use [`peek`] to read a slot without modifying it.
///
/// No bounds checks are performed. [`FlatView`](crate::FlatView) provides
/// checked access.
///
/// # Safety
///
/// * `slot` must be valid for reads and writes, and properly aligned.
/// * `slot` must lie within the structure at `container`, and hold an offset
///   written by [`Serializer`](crate::Serializer) which has not already been
///   resolved.
/// * The buffer containing `container` must be the one the offset was
///   computed against (it may have been moved or copied since).
#[inline]
pub unsafe fn resolve_in_place<C, P: PtrField>(container: *const C, slot: *mut P) -> P {
	let resolved = peek(container, slot);
	ptr::write(slot, resolved);
	resolved
}

/// Get the pointer a serialized pointer slot represents, without modifying
/// the slot.
///
/// Same as [`resolve_in_place`], except the slot retains its offset, so is
/// suitable for read-only buffers (e.g. memory shared between processes), at
/// the cost of repeating the arithmetic on every access.
///
/// # Safety
///
/// * `slot` must be valid for reads, and properly aligned.
/// * `slot` must lie within the structure at `container`, and hold an offset
///   written by [`Serializer`](crate::Serializer).
#[inline]
pub unsafe fn peek<C, P: PtrField>(container: *const C, slot: *const P) -> P {
	let offset = Offset::new(ptr::read(slot.cast::<usize>()));
	P::from_addr(offset.target_addr(container as usize).unwrap_or(0))
}

#[cfg(test)]
mod tests {
	use std::{mem, ptr::NonNull};

	use super::*;

	#[repr(C)]
	struct Holder {
		ptr: *const u64,
		value: u64,
	}

	#[test]
	fn resolves_offset() {
		let mut holder = Holder {
			ptr: mem::offset_of!(Holder, value) as *const u64,
			value: 9,
		};
		let container: *mut Holder = &mut holder;
		unsafe {
			let slot = ptr::addr_of_mut!((*container).ptr);
			let value_ptr = ptr::addr_of!((*container).value);
			assert_eq!(peek(container, slot), value_ptr);
			// `peek` does not alter slot
			assert_eq!(*slot as usize, mem::offset_of!(Holder, value));

			let resolved = resolve_in_place(container, slot);
			assert_eq!(resolved, value_ptr);
			assert_eq!(*slot, value_ptr);
			assert_eq!(**slot, 9);
		}
	}

	#[test]
	fn null_stays_null() {
		#[repr(C)]
		struct NullHolder {
			ptr: Option<NonNull<u64>>,
		}

		let mut holder = NullHolder { ptr: None };
		let container: *mut NullHolder = &mut holder;
		unsafe {
			let slot = ptr::addr_of_mut!((*container).ptr);
			assert_eq!(peek(container, slot), None);
			assert_eq!(resolve_in_place(container, slot), None);
		}
		assert!(holder.ptr.is_none());
	}
}
