//! Types shared by the cachefs crates.

mod byterange;

pub use byterange::{ByteRange, ByteRanges, ByteRangesIter};
