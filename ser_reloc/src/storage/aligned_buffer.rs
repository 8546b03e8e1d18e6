use std::{
	alloc::{self, Layout},
	cmp, fmt, fs,
	path::Path,
	ptr::{self, NonNull},
	slice,
};

use crate::{
	util::{align_up_to, is_aligned_to, MAX_CAPACITY, PTR_SIZE, STORAGE_ALIGNMENT},
	Error, Result,
};

/// Aligned, growable, contiguous byte buffer.
///
/// Backing storage for [`Serializer`]. The start of the buffer is always
/// aligned to [`STORAGE_ALIGNMENT`], so any value placed at a position aligned
/// for its type is correctly aligned in memory too.
///
/// Growing the buffer may move it in memory, but positions within it never
/// change. Callers should hold on to positions, not addresses.
///
/// # Example
///
/// ```
/// use ser_reloc::storage::AlignedBuffer;
///
/// let mut buf = AlignedBuffer::with_capacity(8).unwrap();
/// assert_eq!(buf.as_ptr() as usize % 16, 0);
///
/// // Initial capacity is rounded up to a multiple of `STORAGE_ALIGNMENT`
/// assert_eq!(buf.capacity(), 16);
///
/// buf.push_bytes(b"abc").unwrap();
/// buf.align_to(8).unwrap();
/// assert_eq!(buf.as_slice(), &[b'a', b'b', b'c', 0, 0, 0, 0, 0]);
///
/// // Capacity grows in powers of 2
/// buf.push_bytes(&[1; 12]).unwrap();
/// assert_eq!(buf.len(), 20);
/// assert_eq!(buf.capacity(), 32);
/// ```
///
/// [`Serializer`]: crate::Serializer
/// [`STORAGE_ALIGNMENT`]: crate::util::STORAGE_ALIGNMENT
pub struct AlignedBuffer {
	ptr: NonNull<u8>,
	capacity: usize,
	len: usize,
}

// `AlignedBuffer` uniquely owns a plain byte allocation
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
	/// Create new [`AlignedBuffer`] with no memory allocated.
	#[inline]
	pub fn new() -> Self {
		Self {
			ptr: dangling(),
			capacity: 0,
			len: 0,
		}
	}

	/// Create new [`AlignedBuffer`] with pre-allocated capacity.
	///
	/// Capacity will be rounded up to a multiple of [`STORAGE_ALIGNMENT`].
	///
	/// [`STORAGE_ALIGNMENT`]: crate::util::STORAGE_ALIGNMENT
	pub fn with_capacity(capacity: usize) -> Result<Self> {
		let mut buf = Self::new();
		if capacity > 0 {
			if capacity > MAX_CAPACITY {
				return Err(Error::CapacityOverflow);
			}
			// `MAX_CAPACITY` is a multiple of `STORAGE_ALIGNMENT` so this can't overflow
			buf.change_capacity(align_up_to(capacity, STORAGE_ALIGNMENT))?;
		}
		Ok(buf)
	}

	/// Create new [`AlignedBuffer`] holding a copy of `bytes`.
	///
	/// The copy is at a new address, aligned to [`STORAGE_ALIGNMENT`], so this
	/// is also the way to relocate a serialized buffer.
	///
	/// [`STORAGE_ALIGNMENT`]: crate::util::STORAGE_ALIGNMENT
	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		let mut buf = Self::with_capacity(bytes.len())?;
		buf.push_bytes(bytes)?;
		Ok(buf)
	}

	/// Returns current capacity of buffer in bytes.
	#[inline]
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Returns number of bytes written to buffer.
	#[inline]
	pub fn len(&self) -> usize {
		self.len
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Ensure capacity is at least `min_capacity` bytes.
	#[inline]
	pub fn ensure(&mut self, min_capacity: usize) -> Result<()> {
		if min_capacity > self.capacity {
			// `len <= capacity < min_capacity`, so this always grows
			self.grow_for_reserve(min_capacity - self.len)?;
		}
		Ok(())
	}

	/// Reserve capacity for at least `additional` more bytes.
	///
	/// Growth of capacity occurs in powers of 2 up to [`MAX_CAPACITY`].
	///
	/// [`MAX_CAPACITY`]: crate::util::MAX_CAPACITY
	#[inline]
	pub fn reserve(&mut self, additional: usize) -> Result<()> {
		if additional > self.capacity - self.len {
			self.grow_for_reserve(additional)?;
		}
		Ok(())
	}

	/// Round up length of buffer to a multiple of `alignment`, filling the gap
	/// with zeros.
	///
	/// # Panics
	///
	/// Panics if `alignment` is not a power of 2, or exceeds
	/// [`STORAGE_ALIGNMENT`].
	///
	/// [`STORAGE_ALIGNMENT`]: crate::util::STORAGE_ALIGNMENT
	pub fn align_to(&mut self, alignment: usize) -> Result<()> {
		assert!(
			alignment.is_power_of_two() && alignment <= STORAGE_ALIGNMENT,
			"alignment must be a power of 2 no greater than STORAGE_ALIGNMENT"
		);

		// `len` is always `<= MAX_CAPACITY`, so rounding up cannot overflow
		let new_len = align_up_to(self.len, alignment);
		if new_len != self.len {
			let padding = new_len - self.len;
			self.reserve(padding)?;
			// `reserve` ensures space for padding
			unsafe { ptr::write_bytes(self.ptr.as_ptr().add(self.len), 0, padding) };
			self.len = new_len;
		}
		Ok(())
	}

	/// Append bytes to buffer. Returns position they were written at.
	#[inline]
	pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
		// A `&[u8]` is valid for reads of its length
		unsafe { self.push_raw(bytes.as_ptr(), bytes.len()) }
	}

	/// Append `size` bytes read from `src`. Returns position they were written
	/// at.
	///
	/// Bytes are copied untyped, so `src` may contain padding.
	///
	/// # Safety
	///
	/// `src` must be valid for reads of `size` bytes, and must not point into
	/// this buffer.
	pub(crate) unsafe fn push_raw(&mut self, src: *const u8, size: usize) -> Result<usize> {
		let pos = self.len;
		if size == 0 {
			return Ok(pos);
		}

		self.reserve(size)?;
		// `reserve` ensures sufficient capacity
		ptr::copy_nonoverlapping(src, self.ptr.as_ptr().add(pos), size);
		self.len = pos + size;
		Ok(pos)
	}

	/// Overwrite the pointer-sized slot at `pos` with `value`.
	///
	/// The slot must lie entirely within the bytes already written.
	pub fn write_usize(&mut self, pos: usize, value: usize) -> Result<()> {
		self.check_slot(pos)?;
		// Bounds checked above
		unsafe { ptr::write_unaligned(self.ptr.as_ptr().add(pos).cast::<usize>(), value) };
		Ok(())
	}

	/// Read the pointer-sized slot at `pos`.
	///
	/// Returns `None` if the slot is not within the bytes written.
	pub fn read_usize(&self, pos: usize) -> Option<usize> {
		self.check_slot(pos).ok()?;
		// Bounds checked above
		Some(unsafe { ptr::read_unaligned(self.ptr.as_ptr().add(pos).cast::<usize>()) })
	}

	#[inline]
	fn check_slot(&self, pos: usize) -> Result<()> {
		match pos.checked_add(PTR_SIZE) {
			Some(end) if end <= self.len => Ok(()),
			_ => Err(Error::OffsetOutOfBounds { pos, len: self.len }),
		}
	}

	/// Shrink the capacity of the buffer as much as possible.
	/// `capacity` will remain a multiple of [`STORAGE_ALIGNMENT`].
	///
	/// [`STORAGE_ALIGNMENT`]: crate::util::STORAGE_ALIGNMENT
	pub fn shrink_to_fit(&mut self) -> Result<()> {
		let new_capacity = align_up_to(self.len, STORAGE_ALIGNMENT);
		if new_capacity != self.capacity {
			self.change_capacity(new_capacity)?;
		}
		Ok(())
	}

	/// Returns a raw pointer to the start of the buffer.
	///
	/// Pushing to the buffer may cause it to reallocate, invalidating the
	/// pointer.
	#[inline]
	pub fn as_ptr(&self) -> *const u8 {
		self.ptr.as_ptr()
	}

	/// Returns a mutable raw pointer to the start of the buffer.
	///
	/// Pushing to the buffer may cause it to reallocate, invalidating the
	/// pointer.
	#[inline]
	pub fn as_mut_ptr(&mut self) -> *mut u8 {
		self.ptr.as_ptr()
	}

	#[inline]
	pub fn as_slice(&self) -> &[u8] {
		// `ptr` is valid for `len` bytes (or dangling with `len == 0`)
		unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
	}

	#[inline]
	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		// `ptr` is valid for `len` bytes (or dangling with `len == 0`)
		unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
	}

	/// Write buffer contents to a file.
	pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		fs::write(path, self.as_slice())?;
		Ok(())
	}

	/// Read file contents into a new buffer.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
		Self::from_bytes(&fs::read(path)?)
	}

	/// Extend capacity after `reserve` has found it's necessary.
	///
	/// In a separate `#[cold]` function so the common path where capacity is
	/// already sufficient stays small enough to inline.
	#[cold]
	fn grow_for_reserve(&mut self, additional: usize) -> Result<()> {
		let new_cap = self
			.len
			.checked_add(additional)
			.ok_or(Error::CapacityOverflow)?;

		let new_cap = if new_cap > MAX_CAPACITY.next_power_of_two() >> 1 {
			// Rounding up to next power of 2 would exceed `MAX_CAPACITY`,
			// so cap at max instead
			if new_cap > MAX_CAPACITY {
				return Err(Error::CapacityOverflow);
			}
			MAX_CAPACITY
		} else {
			// Growth in powers of 2 from at least `STORAGE_ALIGNMENT` keeps capacity
			// a multiple of `STORAGE_ALIGNMENT`
			cmp::max(new_cap.next_power_of_two(), STORAGE_ALIGNMENT)
		};

		self.change_capacity(new_cap)
	}

	/// Reallocate to `new_capacity` bytes.
	///
	/// On failure the buffer is left as it was.
	fn change_capacity(&mut self, new_capacity: usize) -> Result<()> {
		debug_assert!(new_capacity >= self.len);
		debug_assert!(new_capacity <= MAX_CAPACITY);
		debug_assert!(is_aligned_to(new_capacity, STORAGE_ALIGNMENT));

		let failed = Error::AllocationFailed {
			capacity: new_capacity,
		};

		if new_capacity == 0 {
			self.dealloc();
			self.ptr = dangling();
			self.capacity = 0;
			return Ok(());
		}

		let new_ptr = if self.capacity == 0 {
			let layout = layout_for(new_capacity)?;
			unsafe { alloc::alloc(layout) }
		} else {
			// Current allocation was made with this same layout
			let old_layout = layout_for(self.capacity)?;
			unsafe { alloc::realloc(self.ptr.as_ptr(), old_layout, new_capacity) }
		};

		self.ptr = NonNull::new(new_ptr).ok_or(failed)?;
		self.capacity = new_capacity;
		Ok(())
	}

	fn dealloc(&mut self) {
		if self.capacity > 0 {
			// Allocation was made with this layout, so it's valid
			unsafe {
				alloc::dealloc(
					self.ptr.as_ptr(),
					Layout::from_size_align_unchecked(self.capacity, STORAGE_ALIGNMENT),
				)
			};
		}
	}
}

impl Drop for AlignedBuffer {
	fn drop(&mut self) {
		self.dealloc();
	}
}

impl Default for AlignedBuffer {
	fn default() -> Self {
		Self::new()
	}
}

impl AsRef<[u8]> for AlignedBuffer {
	fn as_ref(&self) -> &[u8] {
		self.as_slice()
	}
}

impl fmt::Debug for AlignedBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AlignedBuffer")
			.field("len", &self.len)
			.field("capacity", &self.capacity)
			.finish()
	}
}

/// Dangling pointer aligned to `STORAGE_ALIGNMENT`, for a buffer with no
/// allocation.
#[inline]
fn dangling() -> NonNull<u8> {
	// `STORAGE_ALIGNMENT` is non-zero
	unsafe { NonNull::new_unchecked(STORAGE_ALIGNMENT as *mut u8) }
}

#[inline]
fn layout_for(capacity: usize) -> Result<Layout> {
	Layout::from_size_align(capacity, STORAGE_ALIGNMENT).map_err(|_| Error::CapacityOverflow)
}
