use std::{cmp, ffi::CStr, marker::PhantomData, mem, os::raw::c_char, ptr};

use tracing::{debug, trace};

use crate::{
	pos::{Frame, Offset},
	storage::AlignedBuffer,
	util::{align_up_to, is_aligned_to, struct_alignment, PTR_SIZE, STORAGE_ALIGNMENT},
	Error, PtrField, Result,
};

/// Serializer which flattens a graph of structures into a single buffer,
/// replacing every pointer with an offset relative to the structure which
/// contains it.
///
/// The caller drives serialization, as only the caller knows the layout of
/// its structures:
///
/// * [`push`](Serializer::push) a pointer field to copy the structure it
///   points to, and make that structure the current one.
///   [`push_slice`](Serializer::push_slice) and
///   [`push_sized`](Serializer::push_sized) do the same for arrays and blocks
///   whose size is only known at runtime.
/// * [`add_string`](Serializer::add_string) a C string field to copy the
///   string.
/// * [`set_null`](Serializer::set_null) a field which should not be
///   serialized.
/// * [`pop`](Serializer::pop) to return to the containing structure.
///
/// Fields passed to these methods must belong to the current structure (the
/// one on top of the frame stack). Fields outside it are rejected with
/// [`Error::FieldOutOfBounds`].
///
/// Sub-structures are aligned to at least
/// [`DEFAULT_ALIGNMENT`](crate::util::DEFAULT_ALIGNMENT). Strings are not
/// aligned.
///
/// # Example
///
/// ```
/// use std::{ffi::CStr, os::raw::c_char, ptr};
/// use ser_reloc::{peek, Serializer};
///
/// #[repr(C)]
/// struct Child {
/// 	value: u64,
/// }
///
/// #[repr(C)]
/// struct Parent {
/// 	name: *const c_char,
/// 	child: *const Child,
/// }
///
/// let child = Child { value: 42 };
/// let parent = Parent {
/// 	name: b"root\0".as_ptr().cast(),
/// 	child: &child,
/// };
///
/// let mut ser = Serializer::new(&parent).unwrap();
/// unsafe {
/// 	ser.add_string(&parent.name).unwrap();
/// 	if ser.push(&parent.child).unwrap() {
/// 		ser.pop().unwrap();
/// 	}
/// }
/// ser.pop().unwrap();
/// let buf = ser.into_buffer();
///
/// let root = buf.as_ptr().cast::<Parent>();
/// unsafe {
/// 	let name = peek(root, ptr::addr_of!((*root).name));
/// 	assert_eq!(CStr::from_ptr(name).to_bytes(), b"root");
/// 	let child = peek(root, ptr::addr_of!((*root).child));
/// 	assert_eq!((*child).value, 42);
/// }
/// ```
pub struct Serializer {
	storage: AlignedBuffer,
	frames: Vec<Frame>,
}

/// Position of a pointer slot in output, and the structure containing it.
#[derive(Copy, Clone)]
struct Slot {
	pos: usize,
	container: Frame,
}

impl Serializer {
	/// Create new [`Serializer`] with `root` as the root structure.
	pub fn new<T>(root: &T) -> Result<Self> {
		Self::init(Some(root), 0)
	}

	/// Create new [`Serializer`] with `root` as the root structure, and buffer
	/// pre-allocated with capacity of at least `capacity` bytes.
	///
	/// If you can estimate the size of the output in advance, allocating upfront
	/// avoids repeated reallocation while serializing.
	pub fn with_capacity<T>(root: &T, capacity: usize) -> Result<Self> {
		Self::init(Some(root), capacity)
	}

	/// Create new [`Serializer`] with no root structure.
	///
	/// The first [`push`](Serializer::push) establishes the root structure.
	/// Strings added before that are written without recording any pointer.
	pub fn without_root(capacity: usize) -> Result<Self> {
		Self::init::<()>(None, capacity)
	}

	/// Create new [`Serializer`].
	///
	/// Buffer is allocated with capacity of at least `size_of::<T>()` or
	/// `suggested_capacity`, whichever is larger. If `root` is provided, it's
	/// copied to start of buffer and becomes the current structure.
	pub fn init<T>(root: Option<&T>, suggested_capacity: usize) -> Result<Self> {
		let root = root.map_or(ptr::null(), |root| root as *const T);
		// `root` is null or a valid reference, so readable for `size_of::<T>()` bytes
		unsafe { Self::init_sized(root, mem::size_of::<T>(), suggested_capacity) }
	}

	/// Create new [`Serializer`] with a root block of `size` bytes at `root`.
	///
	/// Same as [`init`](Serializer::init), but size of the root is given at
	/// runtime, so the root can be e.g. an array of `T`s. If `root` is null,
	/// there is no root structure.
	///
	/// # Safety
	///
	/// If `root` is non-null, it must be valid for reads of `size` bytes.
	pub unsafe fn init_sized<T>(
		root: *const T,
		size: usize,
		suggested_capacity: usize,
	) -> Result<Self> {
		let _ = AlignmentCheck::<T>::ASSERT_ALIGNMENT_DOES_NOT_EXCEED;

		let mut storage = AlignedBuffer::with_capacity(cmp::max(size, suggested_capacity))?;
		let mut frames = Vec::new();

		if !root.is_null() {
			let addr = root as usize;
			let pos = storage.push_raw(addr as *const u8, size)?;
			trace!(pos, size, "serialize root");
			frames.push(Frame::new(addr, size, pos));
		}

		Ok(Self { storage, frames })
	}

	/// Serialize the structure which `field` points to, and make it the current
	/// structure.
	///
	/// `field` must be a pointer field within the current structure (or any
	/// pointer, if there is no current structure yet).
	///
	/// If `field` is non-null, the structure it points to is appended to output
	/// (aligned), the slot for `field` in the output is overwritten with its
	/// offset, and `true` is returned. The caller must call
	/// [`pop`](Serializer::pop) once it has finished serializing the
	/// structure's own fields.
	///
	/// If `field` is null, its slot is set to null, nothing is appended, and
	/// `false` is returned. Do not [`pop`](Serializer::pop) in this case.
	///
	/// # Safety
	///
	/// If `field` is non-null, it must point to a valid `P::Target` which
	/// remains valid until it is popped.
	pub unsafe fn push<P: PtrField>(&mut self, field: &P) -> Result<bool> {
		self.push_sized(field, mem::size_of::<P::Target>())
	}

	/// Serialize the `len` consecutive values which `field` points to, and make
	/// the whole array the current structure.
	///
	/// Fields of any element can then be serialized before a single
	/// [`pop`](Serializer::pop). Null handling is same as
	/// [`push`](Serializer::push).
	///
	/// # Safety
	///
	/// If `field` is non-null, it must point to `len` valid `P::Target`s which
	/// remain valid until they are popped.
	pub unsafe fn push_slice<P: PtrField>(&mut self, field: &P, len: usize) -> Result<bool> {
		let stride = mem::size_of::<P::Target>();
		let size = stride.checked_mul(len).ok_or(Error::CapacityOverflow)?;
		self.push_block(field, size, stride)
	}

	/// Serialize the block of `size` bytes which `field` points to, and make it
	/// the current structure.
	///
	/// Same as [`push`](Serializer::push), but size of the block is given at
	/// runtime. The block is aligned for `P::Target`. Fields within the whole
	/// block are accepted by later calls, until it is popped, and their offsets
	/// are relative to the start of the block. Use
	/// [`push_slice`](Serializer::push_slice) for arrays of structures.
	///
	/// # Safety
	///
	/// If `field` is non-null, it must be valid for reads of `size` bytes until
	/// it is popped.
	pub unsafe fn push_sized<P: PtrField>(&mut self, field: &P, size: usize) -> Result<bool> {
		self.push_block(field, size, size)
	}

	/// Push block of `size` bytes, made of elements `stride` bytes each.
	unsafe fn push_block<P: PtrField>(
		&mut self,
		field: &P,
		size: usize,
		stride: usize,
	) -> Result<bool> {
		let _ = P::ASSERT_POINTER_SIZED;
		let _ = AlignmentCheck::<P::Target>::ASSERT_ALIGNMENT_DOES_NOT_EXCEED;

		let slot = self.slot_for(field)?;

		let addr = field.target_addr();
		if addr == 0 {
			if let Some(slot) = slot {
				self.storage.write_usize(slot.pos, Offset::NULL.get())?;
			}
			trace!(depth = self.frames.len(), "push null");
			return Ok(false);
		}

		// Reserve space for padding and the structure upfront, so failure to grow
		// leaves output untouched
		let len = self.storage.len();
		let target_pos = align_up_to(len, struct_alignment::<P::Target>());
		let additional = (target_pos - len)
			.checked_add(size)
			.ok_or(Error::CapacityOverflow)?;
		self.storage.reserve(additional)?;
		self.storage.align_to(struct_alignment::<P::Target>())?;
		debug_assert_eq!(self.storage.len(), target_pos);

		if let Some(slot) = slot {
			self.write_slot(slot, target_pos)?;
		}

		// Caller guarantees `addr` is valid for reads of `size` bytes
		self.storage.push_raw(addr as *const u8, size)?;
		self.frames.push(Frame::new_array(addr, size, stride, target_pos));
		trace!(pos = target_pos, size, depth = self.frames.len(), "push");

		Ok(true)
	}

	/// Serialize the structure which `field` points to, then call `process` to
	/// serialize its contents, then return to the current structure.
	///
	/// `process` receives the source structure. It is not called if `field` is
	/// null.
	///
	/// # Safety
	///
	/// Same requirements as [`push`](Serializer::push).
	pub unsafe fn push_and_process<P, F>(&mut self, field: &P, process: F) -> Result<()>
	where
		P: PtrField,
		F: FnOnce(&mut Self, &P::Target) -> Result<()>,
	{
		if self.push(field)? {
			// `push` only returns `true` for non-null pointers, which caller
			// guarantees are valid
			let target = &*(field.target_addr() as *const P::Target);
			process(self, target)?;
			self.pop()?;
		}
		Ok(())
	}

	/// Finish with the current structure and return to the structure which
	/// contains it.
	///
	/// Popping the root structure is allowed, but popping beyond it returns
	/// [`Error::EmptyFrameStack`].
	pub fn pop(&mut self) -> Result<()> {
		let frame = self.frames.pop().ok_or(Error::EmptyFrameStack)?;
		trace!(pos = frame.target_pos(), depth = self.frames.len(), "pop");
		Ok(())
	}

	/// Serialize the NUL-terminated string which `field` points to.
	///
	/// `field` must be a pointer field within the current structure (or any
	/// pointer, if there is no current structure).
	///
	/// String is appended to output including its terminator, without
	/// alignment, and the slot for `field` is overwritten with its offset.
	/// If `field` is null, the slot is set to null and nothing is appended.
	///
	/// # Safety
	///
	/// If `field` is non-null, it must point to a valid NUL-terminated string.
	pub unsafe fn add_string<P>(&mut self, field: &P) -> Result<()>
	where P: PtrField<Target = c_char> {
		let _ = P::ASSERT_POINTER_SIZED;

		let slot = self.slot_for(field)?;

		let addr = field.target_addr();
		if addr == 0 {
			if let Some(slot) = slot {
				self.storage.write_usize(slot.pos, Offset::NULL.get())?;
			}
			trace!(depth = self.frames.len(), "add null string");
			return Ok(());
		}

		// Caller guarantees `addr` is a valid C string
		let bytes = CStr::from_ptr(addr as *const c_char).to_bytes_with_nul();
		self.storage.reserve(bytes.len())?;

		let pos = self.storage.len();
		if let Some(slot) = slot {
			self.write_slot(slot, pos)?;
		}
		self.storage.push_bytes(bytes)?;
		trace!(pos, len = bytes.len(), "add string");

		Ok(())
	}

	/// Set the slot for `field` in the output to null.
	///
	/// For pointers which are non-null in the source but should not be
	/// serialized (e.g. pointers to transient data).
	///
	/// `field` must be a pointer field within the current structure.
	pub fn set_null<P: PtrField>(&mut self, field: &P) -> Result<()> {
		let _ = P::ASSERT_POINTER_SIZED;

		let slot = self.slot_for(field)?.ok_or(Error::EmptyFrameStack)?;
		self.storage.write_usize(slot.pos, Offset::NULL.get())?;
		trace!(pos = slot.pos, "set null");
		Ok(())
	}

	/// Get output buffer.
	///
	/// Can be called at any time. Usually called once all structures have been
	/// popped, but this is not enforced.
	#[inline]
	pub fn buffer(&self) -> &AlignedBuffer {
		&self.storage
	}

	/// Consume [`Serializer`] and return output buffer.
	pub fn into_buffer(self) -> AlignedBuffer {
		debug!(
			len = self.storage.len(),
			open_frames = self.frames.len(),
			"finished serializing"
		);
		self.storage
	}

	/// Get current position in output.
	#[inline]
	pub fn pos(&self) -> usize {
		self.storage.len()
	}

	/// Get number of structures currently on the frame stack.
	#[inline]
	pub fn depth(&self) -> usize {
		self.frames.len()
	}

	/// Locate slot in output which mirrors `field`.
	///
	/// Returns `None` if there is no current structure.
	fn slot_for<P>(&self, field: &P) -> Result<Option<Slot>> {
		let container = match self.frames.last() {
			Some(frame) => *frame,
			None => return Ok(None),
		};

		let pos = container.pos_for_addr(field as *const P as usize)?;
		// Field is aligned in source, and structures are aligned in output
		debug_assert!(is_aligned_to(pos, mem::align_of::<usize>()));
		debug_assert!(pos + PTR_SIZE <= self.storage.len());

		Ok(Some(Slot { pos, container }))
	}

	/// Overwrite slot with offset to a value at `target_pos`.
	#[inline]
	fn write_slot(&mut self, slot: Slot, target_pos: usize) -> Result<()> {
		let offset = slot.container.offset_to(slot.pos, target_pos);
		self.storage.write_usize(slot.pos, offset.get())
	}
}

/// Type for static assertion that types being serialized do not have a higher
/// alignment requirement than the alignment of the output buffer.
struct AlignmentCheck<T> {
	_marker: PhantomData<T>,
}

impl<T> AlignmentCheck<T> {
	const ASSERT_ALIGNMENT_DOES_NOT_EXCEED: () = assert!(
		mem::align_of::<T>() <= STORAGE_ALIGNMENT,
		"alignment of serialized types cannot exceed STORAGE_ALIGNMENT"
	);
}
