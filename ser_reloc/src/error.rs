use thiserror::Error;

/// Errors produced while building or reading a serialized buffer.
///
/// Errors which relate to misuse of the push / pop protocol are reported
/// before the [`Serializer`] is mutated, but a session which hit one is
/// broken and should be abandoned.
///
/// [`Serializer`]: crate::Serializer
#[derive(Error, Debug)]
pub enum Error {
	#[error("field at offset {field_offset} lies outside the current structure ({struct_size} bytes)")]
	FieldOutOfBounds {
		field_offset: isize,
		struct_size: usize,
	},

	#[error("no structure on the frame stack")]
	EmptyFrameStack,

	#[error("failed to allocate {capacity} bytes")]
	AllocationFailed { capacity: usize },

	#[error("buffer cannot grow beyond maximum capacity")]
	CapacityOverflow,

	#[error("position {pos} is out of bounds of buffer of {len} bytes")]
	OffsetOutOfBounds { pos: usize, len: usize },

	#[error("string at position {pos} has no terminating NUL")]
	UnterminatedString { pos: usize },

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
