//! Serialize graphs of `#[repr(C)]` structures into a single relocatable
//! buffer.
//!
//! Each pointer in the output is replaced by an offset relative to the
//! structure which contains it, so a buffer can be moved, copied, written to
//! disk or memory-mapped, and its pointers recovered wherever it lands, with
//! [`resolve_in_place`] (eager, one-shot) or [`peek`] (lazy, read-only).

#[cfg(feature = "derive")]
pub use ser_reloc_derive::{Resolve, Serialize};

mod error;
pub use error::{Error, Result};

mod pos;
pub use pos::Offset;

mod ptr;
pub use ptr::PtrField;

mod serializer;
pub use serializer::Serializer;

mod serialize;
pub use serialize::{deserialize, serialize, serialize_with_capacity, Resolve, Serialize};

mod resolve;
pub use resolve::{peek, resolve_in_place};

mod view;
pub use view::FlatView;

#[cfg(feature = "mmap")]
mod mapped;
#[cfg(feature = "mmap")]
pub use mapped::MappedBuffer;

pub mod storage;
pub mod util;
