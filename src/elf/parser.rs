use std::borrow::Cow;
use std::mem::size_of;
use std::ops::Deref as _;

use crate::arch::Arch;
use crate::log::debug;
use crate::mmap::Mmap;
use crate::object::Format;
use crate::object::ObjSym;
use crate::object::ObjectReader;
use crate::object::SymTable;
use crate::object::SymIter;
use crate::util::ReadRaw as _;
use crate::Addr;
use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;
use crate::SymType;

use super::types::Elf64_Chdr;
use super::types::Elf64_Ehdr;
use super::types::Elf64_Shdr;
use super::types::Elf64_Sym;
use super::types::ELFCLASS64;
use super::types::ELFCOMPRESS_ZLIB;
use super::types::ELFCOMPRESS_ZSTD;
use super::types::ELFDATA2LSB;
use super::types::ELFDATA2MSB;
use super::types::ELF_MAGIC;
use super::types::EI_CLASS;
use super::types::EI_DATA;
use super::types::SHF_COMPRESSED;
use super::types::SHN_COMMON;
use super::types::SHN_UNDEF;
use super::types::SHN_XINDEX;
use super::types::SHT_DYNSYM;
use super::types::SHT_NOBITS;
use super::types::SHT_SYMTAB;


/// Check whether `data` starts with the ELF magic.
#[inline]
pub(crate) fn is_elf(data: &[u8]) -> bool {
    data.starts_with(&ELF_MAGIC)
}


#[cfg(feature = "zlib")]
fn decompress_zlib(data: &[u8], size: usize) -> Result<Vec<u8>> {
    use miniz_oxide::inflate::decompress_to_vec_zlib_with_limit;

    let decompressed = decompress_to_vec_zlib_with_limit(data, size)
        .map_err(|err| {
            Error::with_invalid_data(format!("failed to inflate data: {:?}", err.status))
        })
        .context("failed to decompress zlib compressed section")?;

    if decompressed.len() != size {
        return Err(Error::with_invalid_data(format!(
            "zlib compressed section decompressed to {} bytes, but {size} were expected",
            decompressed.len()
        )))
    }
    Ok(decompressed)
}

#[cfg(not(feature = "zlib"))]
fn decompress_zlib(_data: &[u8], _size: usize) -> Result<Vec<u8>> {
    Err(Error::with_unsupported(
        "ELF section is zlib compressed but zlib compression support is not enabled",
    ))
}


#[cfg(feature = "zstd")]
fn decompress_zstd(data: &[u8], size: usize) -> Result<Vec<u8>> {
    let decompressed = zstd::bulk::decompress(data, size)
        .context("failed to decompress zstd compressed section")?;

    if decompressed.len() != size {
        return Err(Error::with_invalid_data(format!(
            "zstd compressed section decompressed to {} bytes, but {size} were expected",
            decompressed.len()
        )))
    }
    Ok(decompressed)
}

#[cfg(not(feature = "zstd"))]
fn decompress_zstd(_data: &[u8], _size: usize) -> Result<Vec<u8>> {
    Err(Error::with_unsupported(
        "ELF section is zstd compressed but zstd compression support is not enabled",
    ))
}


/// A parser for 64 bit ELF files.
///
/// Headers are decoded eagerly and converted to host byte order. Section
/// and symbol data is read lazily out of the memory mapping.
#[derive(Debug)]
pub(crate) struct ElfObject {
    /// The memory mapped file.
    mmap: Mmap,
    /// Whether the file uses a byte order different from the host's.
    swap: bool,
    /// The `e_machine` value of the ELF header.
    machine: u16,
    /// All section headers, in host byte order.
    shdrs: Box<[Elf64_Shdr]>,
    /// Index of the section name string table.
    shstrndx: usize,
}

impl ElfObject {
    /// Parse the ELF file contained in `mmap`.
    pub(crate) fn parse(mmap: Mmap) -> Result<Self> {
        let mut data = mmap.deref();
        let ehdr = data
            .read_pod::<Elf64_Ehdr>()
            .ok_or_invalid_data(|| "failed to read Elf64_Ehdr")?;

        if ehdr.e_ident[..ELF_MAGIC.len()] != ELF_MAGIC {
            return Err(Error::with_invalid_data(format!(
                "encountered unexpected e_ident: {:x?}",
                &ehdr.e_ident[0..4]
            )))
        }

        if ehdr.e_ident[EI_CLASS] != ELFCLASS64 {
            return Err(Error::with_unsupported(format!(
                "ELF class {} is not supported; only 64 bit ELF files are",
                ehdr.e_ident[EI_CLASS]
            )))
        }

        let little_endian = match ehdr.e_ident[EI_DATA] {
            ELFDATA2LSB => true,
            ELFDATA2MSB => false,
            data => {
                return Err(Error::with_invalid_data(format!(
                    "encountered invalid ELF data encoding: {data}"
                )))
            }
        };
        let swap = little_endian != cfg!(target_endian = "little");
        let ehdr = if swap { ehdr.swap_bytes() } else { ehdr };

        let read_shdr = |idx: usize| -> Result<Elf64_Shdr> {
            let offset = idx
                .checked_mul(size_of::<Elf64_Shdr>())
                .and_then(|offset| offset.checked_add(ehdr.e_shoff as usize))
                .ok_or_invalid_data(|| "Elf64_Ehdr::e_shoff is invalid")?;
            let shdr = mmap
                .get(offset..)
                .ok_or_invalid_data(|| "Elf64_Ehdr::e_shoff is invalid")?
                .read_pod::<Elf64_Shdr>()
                .ok_or_invalid_data(|| "failed to read Elf64_Shdr")?;
            let shdr = if swap { shdr.swap_bytes() } else { shdr };
            Ok(shdr)
        };

        let shdrs = if ehdr.e_shoff == 0 {
            Vec::new()
        } else {
            // "If the number of entries in the section header table is
            // larger than or equal to SHN_LORESERVE, e_shnum holds the
            // value zero and the real number of entries in the section
            // header table is held in the sh_size member of the initial
            // entry in section header table."
            let shnum = if ehdr.e_shnum == 0 {
                let shdr = read_shdr(0)?;
                usize::try_from(shdr.sh_size).ok().ok_or_invalid_data(|| {
                    format!(
                        "ELF file contains unsupported number of sections ({})",
                        shdr.sh_size
                    )
                })?
            } else {
                usize::from(ehdr.e_shnum)
            };

            let table_size = shnum
                .checked_mul(size_of::<Elf64_Shdr>())
                .ok_or_invalid_data(|| "ELF section header table size overflows")?;
            let () = mmap
                .get(ehdr.e_shoff as usize..)
                .ok_or_invalid_data(|| "Elf64_Ehdr::e_shoff is invalid")?
                .ensure(table_size)
                .ok_or_invalid_data(|| "ELF section header table is truncated")?;

            (0..shnum).map(read_shdr).collect::<Result<Vec<_>>>()?
        };

        // "If the index of section name string table section is larger
        // than or equal to SHN_LORESERVE (0xff00), this member holds
        // SHN_XINDEX (0xffff) and the real index of the section name
        // string table section is held in the sh_link member of the
        // initial entry in section header table."
        let shstrndx = if ehdr.e_shstrndx == SHN_XINDEX {
            shdrs
                .first()
                .map(|shdr| shdr.sh_link as usize)
                .ok_or_invalid_data(|| "ELF file lacks initial section header")?
        } else {
            usize::from(ehdr.e_shstrndx)
        };

        let slf = Self {
            mmap,
            swap,
            machine: ehdr.e_machine,
            shdrs: shdrs.into_boxed_slice(),
            shstrndx,
        };
        Ok(slf)
    }

    /// Retrieve the raw (potentially compressed) data of the section at
    /// index `idx`.
    fn raw_section_data(&self, idx: usize) -> Result<&[u8]> {
        let shdr = self
            .shdrs
            .get(idx)
            .ok_or_invalid_input(|| format!("ELF section index ({idx}) out of bounds"))?;

        if shdr.sh_type == SHT_NOBITS {
            return Ok(&[])
        }

        let data = self
            .mmap
            .get(shdr.sh_offset as usize..)
            .ok_or_invalid_data(|| "failed to read section data: invalid offset")?
            .read_slice(shdr.sh_size as usize)
            .ok_or_invalid_data(|| "failed to read section data: invalid size")?;
        Ok(data)
    }

    /// Get the name of the section at a given index.
    fn section_name(&self, idx: usize) -> Result<&str> {
        let shstrtab = self.raw_section_data(self.shstrndx)?;
        let shdr = self
            .shdrs
            .get(idx)
            .ok_or_invalid_input(|| "ELF section index out of bounds")?;
        let name = shstrtab
            .get(shdr.sh_name as usize..)
            .ok_or_invalid_input(|| "string table index out of bounds")?
            .read_cstr()
            .ok_or_invalid_input(|| "no valid string found in string table")?
            .to_str()
            .map_err(Error::with_invalid_data)
            .context("invalid section name")?;
        Ok(name)
    }

    /// Find the section of a given name.
    ///
    /// This function return the index of the section if found.
    fn find_section(&self, name: &str) -> Result<Option<usize>> {
        for idx in 1..self.shdrs.len() {
            if self.section_name(idx)? == name {
                return Ok(Some(idx))
            }
        }
        Ok(None)
    }

    /// Find the first section of the given type.
    fn find_section_by_type(&self, sh_type: u32) -> Option<usize> {
        self.shdrs
            .iter()
            .enumerate()
            .skip(1)
            .find_map(|(idx, shdr)| (shdr.sh_type == sh_type).then_some(idx))
    }

    fn decompress(&self, mut data: &[u8]) -> Result<Vec<u8>> {
        let chdr = data
            .read_pod::<Elf64_Chdr>()
            .ok_or_invalid_data(|| "failed to read Elf64_Chdr")?;
        let chdr = if self.swap { chdr.swap_bytes() } else { chdr };
        let size = usize::try_from(chdr.ch_size)
            .map_err(Error::with_invalid_data)
            .context("decompressed section size is too large")?;

        match chdr.ch_type {
            ELFCOMPRESS_ZLIB => decompress_zlib(data, size),
            ELFCOMPRESS_ZSTD => decompress_zstd(data, size),
            ty => Err(Error::with_unsupported(format!(
                "ELF section is compressed with unknown compression type {ty}"
            ))),
        }
    }

    fn parse_sym(&self, mut data: &[u8]) -> Result<Elf64_Sym> {
        let sym = data
            .read_pod::<Elf64_Sym>()
            .ok_or_invalid_data(|| "failed to read Elf64_Sym")?;
        let sym = if self.swap { sym.swap_bytes() } else { sym };
        Ok(sym)
    }

    fn symbols_of(&self, sh_type: u32) -> Result<SymIter<'_>> {
        let idx = if let Some(idx) = self.find_section_by_type(sh_type) {
            idx
        } else {
            // The symbol table does not exist. Fake an empty one.
            return Ok(Box::new([].into_iter()))
        };

        let syms = self.raw_section_data(idx)?;
        if syms.len() % size_of::<Elf64_Sym>() != 0 {
            return Err(Error::with_invalid_data(
                "size of symbol table section is invalid",
            ))
        }

        let strtab_idx = self.shdrs[idx].sh_link as usize;
        let strtab = self
            .raw_section_data(strtab_idx)
            .context("failed to read symbol string table")?;

        let iter = syms
            .chunks_exact(size_of::<Elf64_Sym>())
            // The first entry is always the undefined symbol.
            .skip(1)
            .map(move |data| {
                let sym = self.parse_sym(data)?;
                let name = strtab
                    .get(sym.st_name as usize..)
                    .ok_or_invalid_data(|| "string table index out of bounds")?
                    .read_cstr()
                    .ok_or_invalid_data(|| "no valid string found in string table")?
                    .to_str()
                    .map_err(Error::with_invalid_data)
                    .context("invalid symbol name")?;

                // The value of a common symbol is its alignment, as it
                // has not been allocated yet.
                let defined = !matches!(sym.st_shndx, SHN_UNDEF | SHN_COMMON);
                let addr = defined.then_some(sym.st_value as Addr);
                let sym = ObjSym {
                    name,
                    addr,
                    size: Some(sym.st_size),
                    sym_type: SymType::try_from(&sym).ok(),
                };
                Ok(sym)
            });
        Ok(Box::new(iter))
    }
}

impl ObjectReader for ElfObject {
    fn format(&self) -> Format {
        Format::Elf
    }

    fn arch(&self) -> Option<Arch> {
        Arch::from_elf_machine(self.machine)
    }

    fn is_little_endian(&self) -> bool {
        cfg!(target_endian = "little") != self.swap
    }

    fn has_section(&self, name: &str) -> Result<bool> {
        let idx = self.find_section(name)?;
        Ok(idx.is_some())
    }

    fn section_data(&self, name: &str) -> Result<Option<Cow<'_, [u8]>>> {
        let idx = if let Some(idx) = self.find_section(name)? {
            idx
        } else {
            return Ok(None)
        };

        let data = self.raw_section_data(idx)?;
        if self.shdrs[idx].sh_flags & SHF_COMPRESSED != 0 {
            debug!("decompressing ELF section `{name}`");
            let data = self
                .decompress(data)
                .with_context(|| format!("failed to decompress section `{name}`"))?;
            Ok(Some(Cow::Owned(data)))
        } else {
            Ok(Some(Cow::Borrowed(data)))
        }
    }

    fn symbols(&self, table: SymTable) -> Result<Option<SymIter<'_>>> {
        let sh_type = match table {
            SymTable::Static => SHT_SYMTAB,
            SymTable::Dynamic => SHT_DYNSYM,
        };
        self.symbols_of(sh_type).map(Some)
    }
}
