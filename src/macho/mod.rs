mod fat;
mod parser;
#[allow(non_camel_case_types)]
mod types;

pub(crate) use fat::is_fat;
pub(crate) use fat::FatBinary;
pub(crate) use parser::is_macho;
pub(crate) use parser::MachObject;

#[cfg(any(test, feature = "test"))]
pub(crate) use types::FAT_MAGIC;
#[cfg(any(test, feature = "test"))]
pub(crate) use types::FAT_MAGIC_64;
#[cfg(any(test, feature = "test"))]
pub(crate) use types::MH_MAGIC_64;
