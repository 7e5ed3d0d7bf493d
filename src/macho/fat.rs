//! Support for Mach-O universal ("fat") binaries.
//!
//! A universal binary starts with a big endian `fat_header`, followed by
//! one `fat_arch` (or `fat_arch_64`) record per contained object.

use std::ops::Deref as _;
use std::ops::Range;

use crate::arch::Arch;
use crate::log::debug;
use crate::mmap::Mmap;
use crate::util::ReadRaw as _;
use crate::Error;
use crate::IntoError as _;
use crate::Result;

use super::parser::MachObject;
use super::types::FAT_MAGIC;
use super::types::FAT_MAGIC_64;


/// The maximum number of architectures we accept in a universal binary.
///
/// Java class files share the `FAT_MAGIC` value, with the class file
/// version in place of the architecture count. Class file versions are
/// all larger than this limit.
const MAX_FAT_ARCHS: u32 = 30;


/// Check whether `data` starts with a universal binary magic.
pub(crate) fn is_fat(mut data: &[u8]) -> bool {
    match data.read_u32_be() {
        Some(FAT_MAGIC | FAT_MAGIC_64) => {
            matches!(data.read_u32_be(), Some(count) if count <= MAX_FAT_ARCHS)
        }
        _ => false,
    }
}


/// An object contained in a universal binary.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct FatSlice {
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    pub range: Range<u64>,
}


/// A parsed Mach-O universal binary.
#[derive(Debug)]
pub(crate) struct FatBinary {
    /// The memory mapped file.
    mmap: Mmap,
    /// The contained objects.
    slices: Box<[FatSlice]>,
}

impl FatBinary {
    /// Parse the universal binary contained in `mmap`.
    pub(crate) fn parse(mmap: Mmap) -> Result<Self> {
        let mut data = mmap.deref();
        let magic = data
            .read_u32_be()
            .ok_or_invalid_data(|| "failed to read fat header magic")?;
        let is_64 = match magic {
            FAT_MAGIC => false,
            FAT_MAGIC_64 => true,
            magic => {
                return Err(Error::with_invalid_data(format!(
                    "encountered unexpected universal binary magic: {magic:#x}"
                )))
            }
        };

        let count = data
            .read_u32_be()
            .ok_or_invalid_data(|| "failed to read fat header architecture count")?;
        if count > MAX_FAT_ARCHS {
            return Err(Error::with_invalid_data(format!(
                "universal binary reports implausible architecture count {count}"
            )))
        }

        let slices = (0..count)
            .map(|_| {
                let cpu_type = data.read_u32_be();
                let cpu_subtype = data.read_u32_be();
                let (offset, size) = if is_64 {
                    let offset = data.read_u64_be();
                    let size = data.read_u64_be();
                    // `align` and `reserved`
                    let _rest = data.advance(8);
                    (offset, size)
                } else {
                    let offset = data.read_u32_be().map(u64::from);
                    let size = data.read_u32_be().map(u64::from);
                    // `align`
                    let _align = data.advance(4);
                    (offset, size)
                };

                let (cpu_type, cpu_subtype, offset, size) =
                    match (cpu_type, cpu_subtype, offset, size) {
                        (Some(t), Some(s), Some(o), Some(z)) => (t, s, o, z),
                        _ => return Err(Error::with_invalid_data("fat_arch record is truncated")),
                    };

                let end = offset
                    .checked_add(size)
                    .ok_or_invalid_data(|| "fat_arch record has invalid size")?;
                if end > mmap.len() as u64 {
                    return Err(Error::with_invalid_data(format!(
                        "fat_arch record for CPU type {cpu_type:#x} exceeds file bounds"
                    )))
                }

                Ok(FatSlice {
                    cpu_type,
                    cpu_subtype,
                    range: offset..end,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let slf = Self {
            slices: slices.into_boxed_slice(),
            mmap,
        };
        Ok(slf)
    }

    /// The objects contained in this universal binary.
    #[cfg(test)]
    pub(crate) fn slices(&self) -> &[FatSlice] {
        &self.slices
    }

    /// Extract the object for the given architecture.
    ///
    /// Returns `Ok(None)` if the universal binary does not contain an
    /// object for `arch`. The returned object shares the binary's
    /// memory mapping.
    pub(crate) fn object_for_arch(&self, arch: Arch) -> Result<Option<MachObject>> {
        let cpu_type = if let Some(cpu_type) = arch.macho_cpu_type() {
            cpu_type
        } else {
            return Ok(None)
        };

        let slice = if let Some(slice) = self.slices.iter().find(|s| s.cpu_type == cpu_type) {
            slice
        } else {
            debug!("universal binary contains no object for {arch}");
            return Ok(None)
        };

        let mmap = self
            .mmap
            .constrain(slice.range.clone())
            .ok_or_invalid_data(|| "fat_arch record exceeds file bounds")?;
        let obj = MachObject::parse(mmap)?;
        debug!(
            "selected {arch} object with CPU subtype {:#x} from universal binary",
            slice.cpu_subtype
        );
        Ok(Some(obj))
    }
}
