use std::ffi::CStr;
use std::ffi::OsStr;
use std::mem::size_of;
#[cfg(unix)]
use std::os::unix::ffi::OsStrExt as _;
use std::str;

#[cfg(not(unix))]
use crate::Error;
use crate::Result;


/// Convert a byte slice into a [`str`], trimming everything starting
/// at the first NUL byte, if any.
///
/// This is the representation of fixed-size name fields in various
/// binary formats.
pub(crate) fn fixed_str(bytes: &[u8]) -> Option<&str> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    str::from_utf8(&bytes[..end]).ok()
}


/// Convert raw bytes, as stored in a binary, into an [`OsStr`].
#[cfg(unix)]
pub(crate) fn bytes_to_os_str(bytes: &[u8]) -> Result<&OsStr> {
    Ok(OsStr::from_bytes(bytes))
}

/// Convert raw bytes, as stored in a binary, into an [`OsStr`].
#[cfg(not(unix))]
pub(crate) fn bytes_to_os_str(bytes: &[u8]) -> Result<&OsStr> {
    let s = str::from_utf8(bytes).map_err(Error::with_invalid_data)?;
    Ok(OsStr::new(s))
}


/// A marker trait for "plain old data" data types.
///
/// # Safety
/// Only safe to implement for types that are valid for any bit pattern.
pub(crate) unsafe trait Pod {}

unsafe impl Pod for i8 {}
unsafe impl Pod for u8 {}
unsafe impl Pod for i16 {}
unsafe impl Pod for u16 {}
unsafe impl Pod for i32 {}
unsafe impl Pod for u32 {}
unsafe impl Pod for i64 {}
unsafe impl Pod for u64 {}


/// An trait providing utility functions for reading data from a byte buffer.
pub(crate) trait ReadRaw<'data> {
    /// Ensure that `len` bytes are available for consumption.
    fn ensure(&self, len: usize) -> Option<()>;

    /// Skip `len` bytes.
    fn advance(&mut self, len: usize) -> Option<()>;

    /// Consume and return `len` bytes.
    fn read_slice(&mut self, len: usize) -> Option<&'data [u8]>;

    /// Consume and return `N` bytes as an array.
    #[inline]
    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let data = self.read_slice(N)?;
        <[u8; N]>::try_from(data).ok()
    }

    /// Read a NUL terminated string.
    fn read_cstr(&mut self) -> Option<&'data CStr>;

    /// Read anything implementing `Pod`.
    #[inline]
    fn read_pod<T>(&mut self) -> Option<T>
    where
        T: Pod,
    {
        let data = self.read_slice(size_of::<T>())?;
        // SAFETY: `T` is `Pod` and hence valid for any bit pattern. The pointer
        //         is guaranteed to be valid and to point to memory of at least
        //         `sizeof(T)` bytes.
        let value = unsafe { data.as_ptr().cast::<T>().read_unaligned() };
        Some(value)
    }

    /// Read a big endian `u32` value.
    #[inline]
    fn read_u32_be(&mut self) -> Option<u32> {
        self.read_array::<4>().map(u32::from_be_bytes)
    }

    /// Read a big endian `u64` value.
    #[inline]
    fn read_u64_be(&mut self) -> Option<u64> {
        self.read_array::<8>().map(u64::from_be_bytes)
    }

    /// Read a `u32` value stored with the given endianness.
    #[inline]
    fn read_u32_endian(&mut self, little_endian: bool) -> Option<u32> {
        let bytes = self.read_array::<4>()?;
        if little_endian {
            Some(u32::from_le_bytes(bytes))
        } else {
            Some(u32::from_be_bytes(bytes))
        }
    }
}

impl<'data> ReadRaw<'data> for &'data [u8] {
    #[inline]
    fn ensure(&self, len: usize) -> Option<()> {
        if len > self.len() {
            return None
        }
        Some(())
    }

    #[inline]
    fn advance(&mut self, len: usize) -> Option<()> {
        let _slice = self.read_slice(len)?;
        Some(())
    }

    #[inline]
    fn read_slice(&mut self, len: usize) -> Option<&'data [u8]> {
        self.ensure(len)?;
        let (a, b) = self.split_at(len);
        *self = b;
        Some(a)
    }

    #[inline]
    fn read_cstr(&mut self) -> Option<&'data CStr> {
        let idx = self.iter().position(|byte| *byte == b'\0')?;
        CStr::from_bytes_with_nul(self.read_slice(idx + 1)?).ok()
    }
}
