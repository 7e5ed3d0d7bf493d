//! Format independent access to object files.

use std::borrow::Cow;
use std::fmt::Debug;
use std::path::Path;

use crate::arch::Arch;
use crate::elf::is_elf;
use crate::elf::ElfObject;
use crate::macho::is_fat;
use crate::macho::is_macho;
use crate::macho::FatBinary;
use crate::macho::MachObject;
use crate::mmap::Mmap;
use crate::Addr;
use crate::Error;
use crate::ErrorExt as _;
use crate::Result;
use crate::SymType;


/// The container format of an object file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Format {
    Elf,
    MachO,
}


/// The symbol table to enumerate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SymTable {
    /// The regular (static) symbol table.
    Static,
    /// The dynamic symbol table, if the format has one.
    Dynamic,
}


/// A symbol as reported by an object file.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ObjSym<'obj> {
    /// The symbol's name, as stored in the file.
    pub name: &'obj str,
    /// The symbol's address, if it is defined.
    pub addr: Option<Addr>,
    /// The symbol's size, if the format records one.
    pub size: Option<u64>,
    /// The symbol's type, if it is a function or a variable.
    pub sym_type: Option<SymType>,
}


/// An iterator over the symbols of an object file.
pub(crate) type SymIter<'obj> = Box<dyn Iterator<Item = Result<ObjSym<'obj>>> + 'obj>;


/// Read access to a single-architecture object file.
pub(crate) trait ObjectReader: Debug {
    /// The container format.
    fn format(&self) -> Format;

    /// The architecture the object was built for, if known.
    fn arch(&self) -> Option<Arch>;

    /// Whether the object's data is stored in little endian byte order.
    fn is_little_endian(&self) -> bool;

    /// Retrieve the data of the section with the given name.
    ///
    /// Names are given in ELF style (e.g., `.debug_info`); formats
    /// using a different naming scheme map them as necessary.
    /// Compressed sections are decompressed transparently.
    fn section_data(&self, name: &str) -> Result<Option<Cow<'_, [u8]>>>;

    /// Check whether a section with the given name exists, without
    /// reading its contents.
    fn has_section(&self, name: &str) -> Result<bool>;

    /// Enumerate the symbols of the given symbol table.
    ///
    /// Returns `None` if the format has no such table. A table that
    /// could exist but is missing is reported as empty.
    fn symbols(&self, table: SymTable) -> Result<Option<SymIter<'_>>>;
}


/// A parsed binary file.
#[derive(Debug)]
pub(crate) enum Binary {
    /// A single-architecture object file.
    Object(Box<dyn ObjectReader>),
    /// A container bundling objects for several architectures.
    Universal(FatBinary),
}

impl Binary {
    /// Open and parse the binary at `path`.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let mmap = Mmap::open(path)?;
        Self::parse(mmap).with_context(|| format!("failed to parse `{}`", path.display()))
    }

    /// Parse a memory mapped binary, detecting its format.
    pub(crate) fn parse(mmap: Mmap) -> Result<Self> {
        if is_elf(&mmap) {
            let elf = ElfObject::parse(mmap)?;
            Ok(Self::Object(Box::new(elf)))
        } else if is_macho(&mmap) {
            let macho = MachObject::parse(mmap)?;
            Ok(Self::Object(Box::new(macho)))
        } else if is_fat(&mmap) {
            let fat = FatBinary::parse(mmap)?;
            Ok(Self::Universal(fat))
        } else {
            Err(Error::with_unsupported("unrecognized binary format"))
        }
    }

    /// Retrieve the object, if this binary is a single-architecture one.
    pub(crate) fn as_object(&self) -> Option<&dyn ObjectReader> {
        match self {
            Self::Object(obj) => Some(obj.as_ref()),
            Self::Universal(..) => None,
        }
    }

    /// Check whether the binary belongs to the Mach-O family.
    pub(crate) fn is_macho(&self) -> bool {
        match self {
            Self::Object(obj) => obj.format() == Format::MachO,
            Self::Universal(..) => true,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;

    use tempfile::NamedTempFile;
    use test_log::test;

    use crate::test_helper::ElfBuilder;
    use crate::test_helper::FatBuilder;
    use crate::test_helper::MachOBuilder;
    use crate::ErrorKind;


    fn write(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let () = file.write_all(data).unwrap();
        let () = file.flush().unwrap();
        file
    }


    /// Check that binary formats are detected based on their magic.
    #[test]
    fn format_detection() {
        let elf = write(&ElfBuilder::new().build());
        let binary = Binary::open(elf.path()).unwrap();
        assert_eq!(binary.as_object().unwrap().format(), Format::Elf);
        assert!(!binary.is_macho());

        let macho = write(&MachOBuilder::new(Arch::X86_64).build());
        let binary = Binary::open(macho.path()).unwrap();
        assert_eq!(binary.as_object().unwrap().format(), Format::MachO);
        assert!(binary.is_macho());

        let fat = FatBuilder::new()
            .add(MachOBuilder::new(Arch::X86_64).build())
            .build();
        let fat = write(&fat);
        let binary = Binary::open(fat.path()).unwrap();
        assert!(binary.as_object().is_none());
        assert!(binary.is_macho());
    }

    /// Make sure that unknown formats are reported as unsupported.
    #[test]
    fn unknown_format() {
        let file = write(b"definitely not a binary");
        let err = Binary::open(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let file = write(b"");
        let err = Binary::open(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    /// Check that a missing file is reported as such.
    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Binary::open(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
