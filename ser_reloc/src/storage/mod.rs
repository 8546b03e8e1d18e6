//! Storage for serializer output.

mod aligned_buffer;
pub use aligned_buffer::AlignedBuffer;
