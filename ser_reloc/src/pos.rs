use crate::{util::PTR_SIZE, Error, Result};

/// Value stored in a serialized pointer slot.
///
/// Either the null sentinel (0), or the distance in bytes from the start of
/// the serialized copy of the structure containing the slot to the start of
/// the value it points to. Offsets are never relative to the start of the
/// buffer, so a buffer can be moved without rewriting them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Offset(usize);

impl Offset {
	/// The null sentinel.
	pub const NULL: Self = Self(0);

	/// Create `Offset` from the raw value of a slot.
	#[inline]
	pub const fn new(raw: usize) -> Self {
		Self(raw)
	}

	/// Get raw value to store in a slot.
	#[inline]
	pub const fn get(self) -> usize {
		self.0
	}

	#[inline]
	pub const fn is_null(self) -> bool {
		self.0 == 0
	}

	/// Get address of target, given address of the containing structure.
	///
	/// Returns `None` for the null sentinel. Never fails otherwise: a garbage
	/// offset produces a garbage address.
	#[inline]
	pub fn target_addr(self, container_addr: usize) -> Option<usize> {
		if self.is_null() {
			None
		} else {
			Some(container_addr.wrapping_add(self.0))
		}
	}
}

/// Bookkeeping for one structure being serialized.
///
/// Maps from input address (i.e. memory address of the structure being
/// serialized) to output position (i.e. position of its copy in the output).
///
/// A frame can cover an array of structures, each `stride` bytes. Offsets are
/// then relative to the element containing the slot, not the array.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Frame {
	source_addr: usize,
	size: usize,
	stride: usize,
	target_pos: usize,
}

impl Frame {
	/// Create frame for a single structure, or a block treated as one.
	#[inline]
	pub fn new(source_addr: usize, size: usize, target_pos: usize) -> Self {
		Self {
			source_addr,
			size,
			stride: size,
			target_pos,
		}
	}

	/// Create frame for an array of elements `stride` bytes each.
	#[inline]
	pub fn new_array(source_addr: usize, size: usize, stride: usize, target_pos: usize) -> Self {
		debug_assert!(stride == 0 || size % stride == 0);
		Self {
			source_addr,
			size,
			stride,
			target_pos,
		}
	}

	#[inline]
	pub fn target_pos(&self) -> usize {
		self.target_pos
	}

	/// Get position in output of the pointer slot at `field_addr`.
	///
	/// The slot must lie entirely within the source structure.
	pub fn pos_for_addr(&self, field_addr: usize) -> Result<usize> {
		let in_bounds = field_addr >= self.source_addr
			&& self.size >= PTR_SIZE
			&& field_addr - self.source_addr <= self.size - PTR_SIZE;
		if !in_bounds {
			return Err(Error::FieldOutOfBounds {
				field_offset: (field_addr as isize).wrapping_sub(self.source_addr as isize),
				struct_size: self.size,
			});
		}

		Ok(field_addr - self.source_addr + self.target_pos)
	}

	/// Get position in output of the structure (or array element) containing
	/// the slot at `slot_pos`.
	#[inline]
	pub fn container_pos(&self, slot_pos: usize) -> usize {
		debug_assert!(slot_pos >= self.target_pos);
		if self.stride == 0 {
			return self.target_pos;
		}
		let index = (slot_pos - self.target_pos) / self.stride;
		self.target_pos + index * self.stride
	}

	/// Get offset to store in the slot at `slot_pos` for a value written at
	/// `pos`.
	#[inline]
	pub fn offset_to(&self, slot_pos: usize, pos: usize) -> Offset {
		let container_pos = self.container_pos(slot_pos);
		// Values are only ever appended after their containing structure
		debug_assert!(pos > container_pos);
		Offset(pos - container_pos)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn null_has_no_target() {
		assert_eq!(Offset::NULL.target_addr(1000), None);
		assert_eq!(Offset::new(24).target_addr(1000), Some(1024));
	}

	#[test]
	fn field_positions() {
		let frame = Frame::new(1000, 32, 64);
		assert_eq!(frame.pos_for_addr(1000).unwrap(), 64);
		assert_eq!(frame.pos_for_addr(1024).unwrap(), 88);
		assert_eq!(frame.offset_to(88, 96), Offset::new(32));
	}

	#[test]
	fn array_offsets_relative_to_element() {
		// 3 elements of 16 bytes at output position 64
		let frame = Frame::new_array(1000, 48, 16, 64);
		assert_eq!(frame.pos_for_addr(1040).unwrap(), 104);
		assert_eq!(frame.container_pos(104), 96);
		assert_eq!(frame.offset_to(104, 120), Offset::new(24));
		assert_eq!(frame.container_pos(64), 64);
		assert_eq!(frame.container_pos(79), 64);

		// Block without elements is a single container
		let block = Frame::new(1000, 48, 64);
		assert_eq!(block.offset_to(104, 120), Offset::new(56));
	}

	#[test]
	fn field_outside_structure() {
		let frame = Frame::new(1000, 32, 64);
		assert!(matches!(
			frame.pos_for_addr(992),
			Err(Error::FieldOutOfBounds {
				field_offset: -8,
				struct_size: 32
			})
		));
		// Slot would straddle the end of the structure
		assert!(matches!(
			frame.pos_for_addr(1028),
			Err(Error::FieldOutOfBounds { field_offset: 28, .. })
		));
		assert!(frame.pos_for_addr(1032).is_err());
	}
}
