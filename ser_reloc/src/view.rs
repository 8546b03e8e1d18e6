use std::{ffi::CStr, ptr};

use crate::{util::PTR_SIZE, Error, Offset, Result};

/// Bounds-checked, read-only access to a serialized buffer by position.
///
/// Unlike [`resolve_in_place`](crate::resolve_in_place) and
/// [`peek`](crate::peek), which work on addresses and trust the buffer,
/// `FlatView` works on positions within the buffer and checks every read.
/// Useful for buffers in read-only memory, or to inspect a buffer without
/// knowing it is valid.
///
/// # Example
///
/// ```
/// use std::{mem, os::raw::c_char};
/// use ser_reloc::{FlatView, Serializer};
///
/// #[repr(C)]
/// struct Named {
/// 	id: u64,
/// 	name: *const c_char,
/// }
///
/// let named = Named { id: 7, name: b"seven\0".as_ptr().cast() };
/// let mut ser = Serializer::new(&named).unwrap();
/// unsafe { ser.add_string(&named.name).unwrap() };
/// let buf = ser.into_buffer();
///
/// let view = FlatView::new(buf.as_slice());
/// let name_pos = view.resolve(0, mem::offset_of!(Named, name)).unwrap().unwrap();
/// assert_eq!(view.cstr_at(name_pos).unwrap().to_bytes(), b"seven");
/// ```
#[derive(Copy, Clone, Debug)]
pub struct FlatView<'a> {
	bytes: &'a [u8],
}

impl<'a> FlatView<'a> {
	#[inline]
	pub fn new(bytes: &'a [u8]) -> Self {
		Self { bytes }
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.bytes.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.bytes.is_empty()
	}

	#[inline]
	pub fn as_bytes(&self) -> &'a [u8] {
		self.bytes
	}

	/// Read a `usize` at `pos`.
	pub fn read_usize(&self, pos: usize) -> Result<usize> {
		let bytes = self.bytes_at(pos, PTR_SIZE)?;
		// `bytes_at` returns exactly `PTR_SIZE` bytes
		Ok(unsafe { ptr::read_unaligned(bytes.as_ptr().cast::<usize>()) })
	}

	/// Read the offset stored in the pointer slot at `slot_pos`.
	#[inline]
	pub fn offset_at(&self, slot_pos: usize) -> Result<Offset> {
		self.read_usize(slot_pos).map(Offset::new)
	}

	/// Get position of the value pointed to by the pointer field at
	/// `field_offset` within the structure at `container_pos`.
	///
	/// Returns `None` if the pointer is null.
	///
	/// Only the start of the target is checked, and it may equal the buffer
	/// length (a zero-sized value pushed last). Use
	/// [`bytes_at`](FlatView::bytes_at) to check the target's full extent.
	pub fn resolve(&self, container_pos: usize, field_offset: usize) -> Result<Option<usize>> {
		let slot_pos = container_pos
			.checked_add(field_offset)
			.ok_or(self.out_of_bounds(usize::MAX))?;
		let offset = self.offset_at(slot_pos)?;
		if offset.is_null() {
			return Ok(None);
		}

		match container_pos.checked_add(offset.get()) {
			Some(pos) if pos <= self.bytes.len() => Ok(Some(pos)),
			Some(pos) => Err(self.out_of_bounds(pos)),
			None => Err(self.out_of_bounds(usize::MAX)),
		}
	}

	/// Get NUL-terminated string at `pos`.
	pub fn cstr_at(&self, pos: usize) -> Result<&'a CStr> {
		let tail = self.bytes.get(pos..).ok_or(self.out_of_bounds(pos))?;
		CStr::from_bytes_until_nul(tail).map_err(|_| Error::UnterminatedString { pos })
	}

	/// Get `len` bytes starting at `pos`.
	pub fn bytes_at(&self, pos: usize, len: usize) -> Result<&'a [u8]> {
		pos
			.checked_add(len)
			.and_then(|end| self.bytes.get(pos..end))
			.ok_or(self.out_of_bounds(pos))
	}

	#[inline]
	fn out_of_bounds(&self, pos: usize) -> Error {
		Error::OffsetOutOfBounds {
			pos,
			len: self.bytes.len(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn bytes_with_slots(slots: &[usize]) -> Vec<u8> {
		slots.iter().flat_map(|slot| slot.to_ne_bytes()).collect()
	}

	#[test]
	fn resolve_relative_to_container() {
		// Container at `PTR_SIZE`, its slot points 2 slots further on
		let mut bytes = bytes_with_slots(&[0, PTR_SIZE * 2, 0]);
		bytes.extend_from_slice(b"hi\0");
		let view = FlatView::new(&bytes);

		assert_eq!(view.resolve(PTR_SIZE, 0).unwrap(), Some(PTR_SIZE * 3));
		assert_eq!(view.cstr_at(PTR_SIZE * 3).unwrap().to_bytes(), b"hi");
		assert_eq!(view.resolve(0, 0).unwrap(), None);
	}

	#[test]
	fn out_of_bounds_offset() {
		let bytes = bytes_with_slots(&[1000]);
		let view = FlatView::new(&bytes);
		assert!(matches!(
			view.resolve(0, 0),
			Err(Error::OffsetOutOfBounds { pos: 1000, .. })
		));
		assert!(matches!(
			view.resolve(0, 4),
			Err(Error::OffsetOutOfBounds { .. })
		));
	}

	#[test]
	fn target_at_end_of_buffer() {
		// Zero-sized value pushed last lies at the buffer length
		let bytes = bytes_with_slots(&[PTR_SIZE]);
		let view = FlatView::new(&bytes);
		assert_eq!(view.resolve(0, 0).unwrap(), Some(PTR_SIZE));
		assert_eq!(view.bytes_at(PTR_SIZE, 0).unwrap(), &[] as &[u8]);
		assert!(view.bytes_at(PTR_SIZE, 1).is_err());

		let bytes = bytes_with_slots(&[PTR_SIZE + 1]);
		let view = FlatView::new(&bytes);
		assert!(matches!(
			view.resolve(0, 0),
			Err(Error::OffsetOutOfBounds { pos, .. }) if pos == PTR_SIZE + 1
		));
	}

	#[test]
	fn unterminated_string() {
		let view = FlatView::new(b"abc");
		assert!(matches!(
			view.cstr_at(1),
			Err(Error::UnterminatedString { pos: 1 })
		));
		assert!(matches!(
			view.cstr_at(4),
			Err(Error::OffsetOutOfBounds { .. })
		));
	}
}
