use std::{fs::File, path::Path};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::{FlatView, Result};

/// Serialized buffer memory-mapped from a file.
///
/// The mapping is private and copy-on-write, so resolving pointers in place
/// modifies only this process's view of the file, never the file itself.
///
/// Mappings start on a page boundary, which satisfies the alignment of any
/// serialized structure.
///
/// # Example
///
/// ```
/// use std::ptr;
/// use ser_reloc::{peek, MappedBuffer, Serializer};
///
/// #[repr(C)]
/// struct Node {
/// 	next: *const Node,
/// 	value: u64,
/// }
///
/// let tail = Node { next: ptr::null(), value: 2 };
/// let head = Node { next: &tail, value: 1 };
///
/// let mut ser = Serializer::new(&head).unwrap();
/// unsafe {
/// 	assert!(ser.push(&head.next).unwrap());
/// 	assert!(!ser.push(&tail.next).unwrap());
/// }
/// ser.pop().unwrap(); // tail
/// ser.pop().unwrap(); // head
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("list.bin");
/// ser.into_buffer().save(&path).unwrap();
///
/// let mapped = MappedBuffer::open(&path).unwrap();
/// let head = mapped.as_ptr().cast::<Node>();
/// unsafe {
/// 	let tail = peek(head, ptr::addr_of!((*head).next));
/// 	assert_eq!((*tail).value, 2);
/// 	assert!(peek(tail, ptr::addr_of!((*tail).next)).is_null());
/// }
/// ```
pub struct MappedBuffer {
	mmap: MmapMut,
}

impl MappedBuffer {
	/// Map file at `path` into memory.
	pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
		let file = File::open(path.as_ref())?;
		// File must not be truncated by another process while mapped
		let mmap = unsafe { MmapOptions::new().map_copy(&file)? };
		debug!(
			path = %path.as_ref().display(),
			len = mmap.len(),
			"mapped serialized buffer"
		);
		Ok(Self { mmap })
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.mmap.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.mmap.is_empty()
	}

	#[inline]
	pub fn as_ptr(&self) -> *const u8 {
		self.mmap.as_ptr()
	}

	#[inline]
	pub fn as_mut_ptr(&mut self) -> *mut u8 {
		self.mmap.as_mut_ptr()
	}

	#[inline]
	pub fn as_slice(&self) -> &[u8] {
		&self.mmap
	}

	#[inline]
	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		&mut self.mmap
	}

	/// Get bounds-checked view of the mapped buffer.
	#[inline]
	pub fn view(&self) -> FlatView<'_> {
		FlatView::new(&self.mmap)
	}
}
