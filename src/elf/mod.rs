#[allow(non_camel_case_types)]
mod parser;
#[allow(non_camel_case_types)]
mod types;

pub(crate) use parser::is_elf;
pub(crate) use parser::ElfObject;

#[cfg(all(any(test, feature = "test"), feature = "zlib"))]
pub(crate) use types::ELFCOMPRESS_ZLIB;
#[cfg(any(test, feature = "test"))]
pub(crate) use types::SHF_COMPRESSED;
#[cfg(any(test, feature = "test"))]
pub(crate) use types::SHN_COMMON;
#[cfg(any(test, feature = "test"))]
pub(crate) use types::SHT_DYNSYM;
#[cfg(any(test, feature = "test"))]
pub(crate) use types::SHT_SYMTAB;
