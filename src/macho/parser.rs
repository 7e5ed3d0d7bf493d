use std::borrow::Cow;
use std::mem::size_of;
use std::ops::Deref as _;

use crate::arch::Arch;
use crate::mmap::Mmap;
use crate::object::Format;
use crate::object::ObjSym;
use crate::object::ObjectReader;
use crate::object::SymIter;
use crate::object::SymTable;
use crate::util::fixed_str;
use crate::util::ReadRaw as _;
use crate::Addr;
use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;
use crate::SymType;

use super::types::load_command;
use super::types::mach_header_64;
use super::types::nlist_64;
use super::types::section_64;
use super::types::segment_command_64;
use super::types::symtab_command;
use super::types::LC_SEGMENT_64;
use super::types::LC_SYMTAB;
use super::types::MH_CIGAM;
use super::types::MH_CIGAM_64;
use super::types::MH_MAGIC;
use super::types::MH_MAGIC_64;
use super::types::N_SECT;
use super::types::N_STAB;
use super::types::N_TYPE;


/// Check whether `data` starts with a (thin) Mach-O magic.
pub(crate) fn is_macho(mut data: &[u8]) -> bool {
    let magic = data.read_array::<4>().map(u32::from_ne_bytes);
    matches!(magic, Some(MH_MAGIC_64 | MH_CIGAM_64 | MH_MAGIC | MH_CIGAM))
}


/// Map an ELF style section name (e.g., `.debug_info`) to the name
/// Mach-O uses for the same content (`__debug_info`).
///
/// Mach-O section names are limited to 16 bytes.
pub(crate) fn macho_section_name(name: &str) -> Cow<'_, str> {
    const MAX_LEN: usize = 16;

    if let Some(name) = name.strip_prefix('.') {
        let mut mapped = format!("__{name}");
        // Section names are ASCII, so truncation at a byte offset is
        // on a character boundary.
        if mapped.len() > MAX_LEN && mapped.is_char_boundary(MAX_LEN) {
            let () = mapped.truncate(MAX_LEN);
        }
        Cow::Owned(mapped)
    } else {
        Cow::Borrowed(name)
    }
}


/// A parser for thin 64 bit Mach-O files.
#[derive(Debug)]
pub(crate) struct MachObject {
    /// The memory mapped file (or slice of a universal binary).
    mmap: Mmap,
    /// The `cputype` of the Mach-O header.
    cpu_type: u32,
    /// All sections, across all segments, in file order.
    sections: Box<[section_64]>,
    /// The symbol table load command, if present.
    symtab: Option<symtab_command>,
}

impl MachObject {
    /// Parse the Mach-O file contained in `mmap`.
    pub(crate) fn parse(mmap: Mmap) -> Result<Self> {
        let mut data = mmap.deref();
        let hdr = data
            .read_pod::<mach_header_64>()
            .ok_or_invalid_data(|| "failed to read mach_header_64")?;

        match hdr.magic {
            MH_MAGIC_64 => (),
            MH_CIGAM_64 => {
                return Err(Error::with_unsupported(
                    "Mach-O files of non-native byte order are not supported",
                ))
            }
            MH_MAGIC | MH_CIGAM => {
                return Err(Error::with_unsupported(
                    "32 bit Mach-O files are not supported",
                ))
            }
            magic => {
                return Err(Error::with_invalid_data(format!(
                    "encountered unexpected Mach-O magic: {magic:#x}"
                )))
            }
        }

        let mut cmds = data
            .read_slice(hdr.sizeofcmds as usize)
            .ok_or_invalid_data(|| "Mach-O load commands are truncated")?;

        let mut sections = Vec::new();
        let mut symtab = None;

        for _ in 0..hdr.ncmds {
            let mut peek = cmds;
            let cmd = peek
                .read_pod::<load_command>()
                .ok_or_invalid_data(|| "failed to read Mach-O load command")?;
            let cmdsize = cmd.cmdsize as usize;
            if cmdsize < size_of::<load_command>() {
                return Err(Error::with_invalid_data(format!(
                    "Mach-O load command has invalid size {cmdsize}"
                )))
            }
            let mut cmd_data = cmds
                .read_slice(cmdsize)
                .ok_or_invalid_data(|| "Mach-O load command is truncated")?;

            match cmd.cmd {
                LC_SEGMENT_64 => {
                    let segment = cmd_data
                        .read_pod::<segment_command_64>()
                        .ok_or_invalid_data(|| "failed to read segment_command_64")?;
                    for _ in 0..segment.nsects {
                        let section = cmd_data
                            .read_pod::<section_64>()
                            .ok_or_invalid_data(|| "failed to read section_64")?;
                        let () = sections.push(section);
                    }
                }
                LC_SYMTAB => {
                    let cmd = cmd_data
                        .read_pod::<symtab_command>()
                        .ok_or_invalid_data(|| "failed to read symtab_command")?;
                    symtab = Some(cmd);
                }
                _ => (),
            }
        }

        let slf = Self {
            mmap,
            cpu_type: hdr.cputype,
            sections: sections.into_boxed_slice(),
            symtab,
        };
        Ok(slf)
    }

    fn section_bytes(&self, section: &section_64) -> Result<&[u8]> {
        if section.is_zerofill() {
            return Ok(&[])
        }

        let data = self
            .mmap
            .get(section.offset as usize..)
            .ok_or_invalid_data(|| "failed to read section data: invalid offset")?
            .read_slice(section.size as usize)
            .ok_or_invalid_data(|| "failed to read section data: invalid size")?;
        Ok(data)
    }

    fn static_symbols(&self, symtab: &symtab_command) -> Result<SymIter<'_>> {
        let syms = self
            .mmap
            .get(symtab.symoff as usize..)
            .ok_or_invalid_data(|| "Mach-O symbol table offset is invalid")?
            .read_slice((symtab.nsyms as usize).saturating_mul(size_of::<nlist_64>()))
            .ok_or_invalid_data(|| "Mach-O symbol table is truncated")?;
        let strtab = self
            .mmap
            .get(symtab.stroff as usize..)
            .ok_or_invalid_data(|| "Mach-O string table offset is invalid")?
            .read_slice(symtab.strsize as usize)
            .ok_or_invalid_data(|| "Mach-O string table is truncated")?;

        let iter = syms
            .chunks_exact(size_of::<nlist_64>())
            .filter_map(move |mut data| {
                let nlist = data.read_pod::<nlist_64>()?;
                // Debugging entries are not symbols.
                if nlist.n_type & N_STAB != 0 {
                    return None
                }
                Some(nlist)
            })
            .map(move |nlist| {
                let name = strtab
                    .get(nlist.n_strx as usize..)
                    .ok_or_invalid_data(|| "string table index out of bounds")?
                    .read_cstr()
                    .ok_or_invalid_data(|| "no valid string found in string table")?
                    .to_str()
                    .map_err(Error::with_invalid_data)
                    .context("invalid symbol name")?;

                let (addr, sym_type) = if nlist.n_type & N_TYPE == N_SECT {
                    // Section indices are one based.
                    let section = usize::from(nlist.n_sect)
                        .checked_sub(1)
                        .and_then(|idx| self.sections.get(idx))
                        .ok_or_invalid_data(|| {
                            format!("symbol `{name}` references invalid section {}", nlist.n_sect)
                        })?;
                    let sym_type = if section.is_text() {
                        SymType::Function
                    } else {
                        SymType::Variable
                    };
                    (Some(nlist.n_value as Addr), Some(sym_type))
                } else {
                    (None, None)
                };

                let sym = ObjSym {
                    name,
                    addr,
                    size: None,
                    sym_type,
                };
                Ok(sym)
            });
        Ok(Box::new(iter))
    }
}

impl ObjectReader for MachObject {
    fn format(&self) -> Format {
        Format::MachO
    }

    fn arch(&self) -> Option<Arch> {
        Arch::from_macho_cpu_type(self.cpu_type)
    }

    fn is_little_endian(&self) -> bool {
        cfg!(target_endian = "little")
    }

    fn has_section(&self, name: &str) -> Result<bool> {
        let name = macho_section_name(name);
        let found = self
            .sections
            .iter()
            .any(|section| fixed_str(&section.sectname) == Some(name.as_ref()));
        Ok(found)
    }

    fn section_data(&self, name: &str) -> Result<Option<Cow<'_, [u8]>>> {
        let name = macho_section_name(name);
        let section = self
            .sections
            .iter()
            .find(|section| fixed_str(&section.sectname) == Some(name.as_ref()));

        if let Some(section) = section {
            let data = self
                .section_bytes(section)
                .with_context(|| format!("failed to read section `{name}`"))?;
            Ok(Some(Cow::Borrowed(data)))
        } else {
            Ok(None)
        }
    }

    fn symbols(&self, table: SymTable) -> Result<Option<SymIter<'_>>> {
        match table {
            SymTable::Static => {
                if let Some(symtab) = &self.symtab {
                    self.static_symbols(symtab).map(Some)
                } else {
                    Ok(Some(Box::new([].into_iter())))
                }
            }
            SymTable::Dynamic => Ok(None),
        }
    }
}
