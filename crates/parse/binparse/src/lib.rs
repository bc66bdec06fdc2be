//! `trellis-binparse` --- safe reads of packed firmware structures from byte slices.
//!
//! Firmware tables arrive as raw byte images whose contents cannot be
//! trusted. [`FromBytes`] lets a parser pull a fixed-layout value out of a
//! `&[u8]` at an arbitrary (possibly unaligned) offset, returning `None`
//! instead of reading past the end of the slice.
//!
//! Multi-byte integers are read in host byte order. Every table this
//! workspace parses is little-endian and every supported target is too.
//!
//! Use `#[derive(FromBytes)]` on `#[repr(C)]` / `#[repr(C, packed)]` structs
//! whose fields are themselves `FromBytes`.

#![no_std]
#![warn(missing_docs)]

// Lets the derive's `::trellis_binparse::FromBytes` path resolve in this crate's own tests.
extern crate self as trellis_binparse;

pub use trellis_binparse_macros::FromBytes;

/// Types that can be reconstructed from any bit pattern of the right size.
///
/// # Safety
///
/// Implementors must be `Copy`, have a layout with no padding-dependent
/// invariants, and accept every possible bit pattern as a valid value. Use
/// the derive macro for structs; it checks `#[repr(C)]` and that each field
/// implements `FromBytes`.
pub unsafe trait FromBytes: Copy {
    /// Reads a value from the start of `data`.
    ///
    /// Returns `None` if `data` is shorter than `size_of::<Self>()`.
    #[must_use]
    fn read_from(data: &[u8]) -> Option<Self> {
        Self::read_at(data, 0)
    }

    /// Reads a value starting `offset` bytes into `data`.
    ///
    /// Returns `None` if the value would extend past the end of `data` or
    /// the end offset overflows.
    #[must_use]
    fn read_at(data: &[u8], offset: usize) -> Option<Self> {
        let end = offset.checked_add(core::mem::size_of::<Self>())?;
        let bytes = data.get(offset..end)?;
        // SAFETY: `bytes` covers exactly `size_of::<Self>()` readable bytes,
        // `read_unaligned` has no alignment requirement, and the trait
        // contract guarantees every bit pattern is a valid `Self`.
        Some(unsafe { core::ptr::read_unaligned(bytes.as_ptr().cast::<Self>()) })
    }
}

macro_rules! impl_from_bytes {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: primitive integers accept every bit pattern.
            unsafe impl FromBytes for $ty {}
        )*
    };
}

impl_from_bytes!(u8, u16, u32, u64, i8, i16, i32, i64);

// SAFETY: an array of `FromBytes` elements has no padding and accepts every
// bit pattern its elements accept.
unsafe impl<T: FromBytes, const N: usize> FromBytes for [T; N] {}
