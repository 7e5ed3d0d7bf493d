//! Builders for synthetic object files used in tests and benchmarks.
//!
//! The produced files are minimal but well formed: they contain just
//! enough structure for our readers (and `gimli`) to make sense of them.

use std::ops::Range;

use crate::arch::Arch;
#[cfg(feature = "zlib")]
use crate::elf::ELFCOMPRESS_ZLIB;
use crate::elf::SHF_COMPRESSED;
use crate::elf::SHN_COMMON;
use crate::elf::SHT_DYNSYM;
use crate::elf::SHT_SYMTAB;
use crate::macho::FAT_MAGIC;
use crate::macho::FAT_MAGIC_64;
use crate::macho::MH_MAGIC_64;
use crate::symbolize;
use crate::Addr;


const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHN_ABS: u16 = 0xfff1;
const EM_X86_64: u16 = 62;
const ELF_SYM_SIZE: u64 = 24;

const STB_GLOBAL: u8 = 1;
const STT_OBJECT: u8 = 1;
const STT_FUNC: u8 = 2;

const LC_SEGMENT_64: u32 = 0x19;
const LC_SYMTAB: u32 = 0x2;
const MH_EXECUTE: u32 = 0x2;
const S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
const S_ATTR_DEBUG: u32 = 0x0200_0000;
const N_EXT: u8 = 0x01;
const N_SECT: u8 = 0x0e;
const N_SO: u8 = 0x64;

/// Alignment of objects in universal binaries, as a power of two.
const FAT_ALIGN: u32 = 12;


/// A byte buffer with helpers for writing integers of a fixed byte
/// order as well as LEB128 values.
#[derive(Debug)]
struct Writer {
    data: Vec<u8>,
    big_endian: bool,
}

impl Writer {
    fn new(big_endian: bool) -> Self {
        Self {
            data: Vec::new(),
            big_endian,
        }
    }

    fn native() -> Self {
        Self::new(cfg!(target_endian = "big"))
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn bytes(&mut self, bytes: &[u8]) {
        let () = self.data.extend_from_slice(bytes);
    }

    fn u8(&mut self, value: u8) {
        let () = self.data.push(value);
    }

    fn u16(&mut self, value: u16) {
        if self.big_endian {
            self.bytes(&value.to_be_bytes())
        } else {
            self.bytes(&value.to_le_bytes())
        }
    }

    fn u32(&mut self, value: u32) {
        if self.big_endian {
            self.bytes(&value.to_be_bytes())
        } else {
            self.bytes(&value.to_le_bytes())
        }
    }

    fn u64(&mut self, value: u64) {
        if self.big_endian {
            self.bytes(&value.to_be_bytes())
        } else {
            self.bytes(&value.to_le_bytes())
        }
    }

    fn cstr(&mut self, s: &str) {
        let () = self.bytes(s.as_bytes());
        let () = self.u8(0);
    }

    fn uleb(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                break self.u8(byte)
            }
            let () = self.u8(byte | 0x80);
        }
    }

    fn sleb(&mut self, mut value: i64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
            if done {
                break self.u8(byte)
            }
            let () = self.u8(byte | 0x80);
        }
    }

    /// Pad with zeroes up to the given offset.
    fn pad_to(&mut self, offset: usize) {
        assert!(offset >= self.len(), "{offset} < {}", self.len());
        let () = self.data.resize(offset, 0);
    }

    /// Overwrite a previously written `u32` at `offset`.
    fn patch_u32(&mut self, offset: usize, value: u32) {
        let bytes = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        let () = self.data[offset..offset + 4].copy_from_slice(&bytes);
    }

    fn finish(self) -> Vec<u8> {
        self.data
    }
}


fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

fn fixed16(name: &str) -> [u8; 16] {
    assert!(name.len() <= 16, "name `{name}` is too long");
    let mut fixed = [0; 16];
    let () = fixed[..name.len()].copy_from_slice(name.as_bytes());
    fixed
}


/// Create the contents of a `.gnu_debuglink` section.
pub fn debug_link_section(file: &str, crc: u32, little_endian: bool) -> Vec<u8> {
    let mut writer = Writer::new(!little_endian);
    let () = writer.cstr(file);
    let () = writer.pad_to(align_up(writer.len(), 4));
    let () = writer.u32(crc);
    writer.finish()
}

/// Calculate the checksum used by `.gnu_debuglink` sections.
pub fn crc32(data: &[u8]) -> u32 {
    symbolize::crc32(data)
}


#[derive(Clone, Debug)]
struct ElfSection {
    name: String,
    sh_type: u32,
    flags: u64,
    data: Vec<u8>,
    link: u32,
    info: u32,
    entsize: u64,
}

#[derive(Clone, Debug)]
struct ElfSymbol {
    name: String,
    info: u8,
    shndx: u16,
    value: Addr,
    size: u64,
}


/// A builder for 64 bit x86-64 ELF files.
///
/// Section headers are placed at the very end of the file. Defined
/// symbols are absolute, so no code or data sections are needed.
#[derive(Clone, Debug, Default)]
pub struct ElfBuilder {
    big_endian: bool,
    sections: Vec<ElfSection>,
    symbols: Vec<ElfSymbol>,
    dynamic: Vec<ElfSymbol>,
}

impl ElfBuilder {
    /// Create a builder for an empty little endian ELF file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select big endian (`true`) or little endian (`false`) encoding.
    pub fn set_big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    fn symbol(name: &str, stt: u8, shndx: u16, value: Addr, size: u64) -> ElfSymbol {
        ElfSymbol {
            name: name.to_string(),
            info: (STB_GLOBAL << 4) | stt,
            shndx,
            value,
            size,
        }
    }

    /// Add a function to the static symbol table.
    pub fn add_func(mut self, name: &str, addr: Addr, size: u64) -> Self {
        let sym = Self::symbol(name, STT_FUNC, SHN_ABS, addr, size);
        let () = self.symbols.push(sym);
        self
    }

    /// Add a variable to the static symbol table.
    pub fn add_var(mut self, name: &str, addr: Addr, size: u64) -> Self {
        let sym = Self::symbol(name, STT_OBJECT, SHN_ABS, addr, size);
        let () = self.symbols.push(sym);
        self
    }

    /// Add a common (tentatively defined, not yet allocated) variable
    /// to the static symbol table.
    pub fn add_common_var(mut self, name: &str, align: u64, size: u64) -> Self {
        let sym = Self::symbol(name, STT_OBJECT, SHN_COMMON, align, size);
        let () = self.symbols.push(sym);
        self
    }

    /// Add an undefined (imported) function to the static symbol table.
    pub fn add_undefined_func(mut self, name: &str) -> Self {
        let sym = Self::symbol(name, STT_FUNC, 0, 0, 0);
        let () = self.symbols.push(sym);
        self
    }

    /// Add a function to the dynamic symbol table.
    pub fn add_dynamic_func(mut self, name: &str, addr: Addr, size: u64) -> Self {
        let sym = Self::symbol(name, STT_FUNC, SHN_ABS, addr, size);
        let () = self.dynamic.push(sym);
        self
    }

    /// Add a section with the given raw contents.
    pub fn add_section(mut self, name: &str, data: &[u8]) -> Self {
        let section = ElfSection {
            name: name.to_string(),
            sh_type: SHT_PROGBITS,
            flags: 0,
            data: data.to_vec(),
            link: 0,
            info: 0,
            entsize: 0,
        };
        let () = self.sections.push(section);
        self
    }

    /// Add a `SHF_COMPRESSED` section. `data` is used as the compressed
    /// payload as-is and `size` is reported as the decompressed size.
    pub fn add_compressed_section(mut self, name: &str, ch_type: u32, data: &[u8], size: u64) -> Self {
        let mut writer = Writer::new(self.big_endian);
        let () = writer.u32(ch_type);
        // `ch_reserved`
        let () = writer.u32(0);
        let () = writer.u64(size);
        // `ch_addralign`
        let () = writer.u64(1);
        let () = writer.bytes(data);

        let section = ElfSection {
            name: name.to_string(),
            sh_type: SHT_PROGBITS,
            flags: SHF_COMPRESSED,
            data: writer.finish(),
            link: 0,
            info: 0,
            entsize: 0,
        };
        let () = self.sections.push(section);
        self
    }

    /// Add a section holding the zlib compressed form of `data`.
    #[cfg(feature = "zlib")]
    pub fn add_zlib_section(self, name: &str, data: &[u8]) -> Self {
        use miniz_oxide::deflate::compress_to_vec_zlib;

        let compressed = compress_to_vec_zlib(data, 6);
        self.add_compressed_section(name, ELFCOMPRESS_ZLIB, &compressed, data.len() as u64)
    }

    fn symbol_sections(
        &self,
        symbols: &[ElfSymbol],
        sh_type: u32,
        names: (&str, &str),
        first_idx: usize,
    ) -> [ElfSection; 2] {
        let mut syms = Writer::new(self.big_endian);
        let mut strs = Writer::new(self.big_endian);
        let () = strs.u8(0);
        // The initial undefined symbol.
        let () = syms.bytes(&[0; ELF_SYM_SIZE as usize]);

        for sym in symbols {
            let () = syms.u32(strs.len() as u32);
            let () = strs.cstr(&sym.name);
            let () = syms.u8(sym.info);
            let () = syms.u8(0);
            let () = syms.u16(sym.shndx);
            let () = syms.u64(sym.value);
            let () = syms.u64(sym.size);
        }

        let symtab = ElfSection {
            name: names.0.to_string(),
            sh_type,
            flags: 0,
            data: syms.finish(),
            link: (first_idx + 1) as u32,
            info: 1,
            entsize: ELF_SYM_SIZE,
        };
        let strtab = ElfSection {
            name: names.1.to_string(),
            sh_type: SHT_STRTAB,
            flags: 0,
            data: strs.finish(),
            link: 0,
            info: 0,
            entsize: 0,
        };
        [symtab, strtab]
    }

    /// Produce the ELF file.
    pub fn build(self) -> Vec<u8> {
        const EHDR_SIZE: usize = 64;
        const SHDR_SIZE: usize = 64;

        let mut sections = self.sections.clone();
        if !self.symbols.is_empty() {
            let idx = sections.len() + 1;
            let tables =
                self.symbol_sections(&self.symbols, SHT_SYMTAB, (".symtab", ".strtab"), idx);
            let () = sections.extend(tables);
        }
        if !self.dynamic.is_empty() {
            let idx = sections.len() + 1;
            let tables =
                self.symbol_sections(&self.dynamic, SHT_DYNSYM, (".dynsym", ".dynstr"), idx);
            let () = sections.extend(tables);
        }

        let mut shstrtab = vec![0];
        let mut name_offsets = Vec::with_capacity(sections.len() + 1);
        for name in sections
            .iter()
            .map(|section| section.name.as_str())
            .chain([".shstrtab"])
        {
            let () = name_offsets.push(shstrtab.len() as u32);
            let () = shstrtab.extend_from_slice(name.as_bytes());
            let () = shstrtab.push(0);
        }
        let shstrndx = sections.len() + 1;
        let () = sections.push(ElfSection {
            name: ".shstrtab".to_string(),
            sh_type: SHT_STRTAB,
            flags: 0,
            data: shstrtab,
            link: 0,
            info: 0,
            entsize: 0,
        });

        let mut offsets = Vec::with_capacity(sections.len());
        let mut offset = EHDR_SIZE;
        for section in &sections {
            offset = align_up(offset, 8);
            let () = offsets.push(offset);
            offset += section.data.len();
        }
        let shoff = align_up(offset, 8);

        let mut w = Writer::new(self.big_endian);
        // e_ident
        let () = w.bytes(b"\x7fELF");
        let () = w.u8(2);
        let () = w.u8(if self.big_endian { 2 } else { 1 });
        let () = w.u8(1);
        let () = w.pad_to(16);
        // e_type: ET_EXEC
        let () = w.u16(2);
        let () = w.u16(EM_X86_64);
        let () = w.u32(1);
        // e_entry, e_phoff
        let () = w.u64(0);
        let () = w.u64(0);
        let () = w.u64(shoff as u64);
        let () = w.u32(0);
        let () = w.u16(EHDR_SIZE as u16);
        // e_phentsize, e_phnum
        let () = w.u16(56);
        let () = w.u16(0);
        let () = w.u16(SHDR_SIZE as u16);
        let () = w.u16((sections.len() + 1) as u16);
        let () = w.u16(shstrndx as u16);

        for (section, offset) in sections.iter().zip(&offsets) {
            let () = w.pad_to(*offset);
            let () = w.bytes(&section.data);
        }

        let () = w.pad_to(shoff);
        let () = w.bytes(&[0; SHDR_SIZE]);
        for ((section, offset), name) in sections.iter().zip(&offsets).zip(&name_offsets) {
            let () = w.u32(*name);
            let () = w.u32(section.sh_type);
            let () = w.u64(section.flags);
            // sh_addr
            let () = w.u64(0);
            let () = w.u64(*offset as u64);
            let () = w.u64(section.data.len() as u64);
            let () = w.u32(section.link);
            let () = w.u32(section.info);
            // sh_addralign
            let () = w.u64(if section.entsize != 0 { 8 } else { 1 });
            let () = w.u64(section.entsize);
        }
        w.finish()
    }
}


#[derive(Clone, Debug)]
struct MachOSection {
    sectname: String,
    segname: &'static str,
    flags: u32,
    data: Vec<u8>,
}

#[derive(Clone, Debug)]
struct MachOSymbol {
    name: String,
    n_type: u8,
    n_sect: u8,
    value: Addr,
}


/// A builder for thin 64 bit Mach-O files in host byte order.
///
/// The file always contains a `__text` (section 1) and a `__data`
/// section (section 2), which defined symbols refer to.
#[derive(Clone, Debug)]
pub struct MachOBuilder {
    arch: Arch,
    sections: Vec<MachOSection>,
    symbols: Vec<MachOSymbol>,
}

impl MachOBuilder {
    /// Create a builder for an object of the given architecture.
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            sections: Vec::new(),
            symbols: Vec::new(),
        }
    }

    fn symbol(mut self, name: &str, n_type: u8, n_sect: u8, value: Addr) -> Self {
        let sym = MachOSymbol {
            name: name.to_string(),
            n_type,
            n_sect,
            value,
        };
        let () = self.symbols.push(sym);
        self
    }

    /// Add a function defined in `__text`.
    pub fn add_func(self, name: &str, addr: Addr) -> Self {
        self.symbol(name, N_SECT | N_EXT, 1, addr)
    }

    /// Add a variable defined in `__data`.
    pub fn add_var(self, name: &str, addr: Addr) -> Self {
        self.symbol(name, N_SECT | N_EXT, 2, addr)
    }

    /// Add an undefined (imported) symbol.
    pub fn add_undefined(self, name: &str) -> Self {
        self.symbol(name, N_EXT, 0, 0)
    }

    /// Add an `N_SO` debugging entry.
    pub fn add_stab(self, name: &str) -> Self {
        self.symbol(name, N_SO, 0, 0)
    }

    /// Add a section with the given (Mach-O style) name and contents.
    pub fn add_section(mut self, sectname: &str, data: &[u8]) -> Self {
        let section = MachOSection {
            sectname: sectname.to_string(),
            segname: "__DWARF",
            flags: S_ATTR_DEBUG,
            data: data.to_vec(),
        };
        let () = self.sections.push(section);
        self
    }

    /// Produce the Mach-O file.
    pub fn build(self) -> Vec<u8> {
        const HDR_SIZE: usize = 32;
        const SEGMENT_SIZE: usize = 72;
        const SECTION_SIZE: usize = 80;
        const SYMTAB_SIZE: usize = 24;
        const NLIST_SIZE: usize = 16;

        let Self {
            arch,
            sections: extra,
            symbols,
        } = self;

        let mut sections = vec![
            MachOSection {
                sectname: "__text".to_string(),
                segname: "__TEXT",
                flags: S_ATTR_PURE_INSTRUCTIONS,
                data: Vec::new(),
            },
            MachOSection {
                sectname: "__data".to_string(),
                segname: "__DATA",
                flags: 0,
                data: Vec::new(),
            },
        ];
        let () = sections.extend(extra);

        let segment_size = SEGMENT_SIZE + SECTION_SIZE * sections.len();
        let sizeofcmds = segment_size + SYMTAB_SIZE;

        let mut offsets = Vec::with_capacity(sections.len());
        let mut offset = HDR_SIZE + sizeofcmds;
        for section in &sections {
            offset = align_up(offset, 8);
            let () = offsets.push(if section.data.is_empty() { 0 } else { offset });
            offset += section.data.len();
        }
        let symoff = align_up(offset, 8);
        let stroff = symoff + NLIST_SIZE * symbols.len();

        let mut strtab = vec![0];
        let mut name_offsets = Vec::with_capacity(symbols.len());
        for sym in &symbols {
            let () = name_offsets.push(strtab.len() as u32);
            let () = strtab.extend_from_slice(sym.name.as_bytes());
            let () = strtab.push(0);
        }

        let cpu_type = arch
            .macho_cpu_type()
            .unwrap_or_else(|| panic!("{arch} has no Mach-O CPU type"));
        let cpu_subtype = match arch {
            Arch::X86 | Arch::X86_64 => 3,
            _ => 0,
        };

        let mut w = Writer::native();
        let () = w.u32(MH_MAGIC_64);
        let () = w.u32(cpu_type);
        let () = w.u32(cpu_subtype);
        let () = w.u32(MH_EXECUTE);
        // ncmds
        let () = w.u32(2);
        let () = w.u32(sizeofcmds as u32);
        // flags, reserved
        let () = w.u32(0);
        let () = w.u32(0);

        let () = w.u32(LC_SEGMENT_64);
        let () = w.u32(segment_size as u32);
        let () = w.bytes(&fixed16(""));
        // vmaddr, vmsize, fileoff, filesize
        let () = w.u64(0);
        let () = w.u64(0);
        let () = w.u64(0);
        let () = w.u64(0);
        // maxprot, initprot
        let () = w.u32(7);
        let () = w.u32(5);
        let () = w.u32(sections.len() as u32);
        let () = w.u32(0);

        for (section, offset) in sections.iter().zip(&offsets) {
            let () = w.bytes(&fixed16(&section.sectname));
            let () = w.bytes(&fixed16(section.segname));
            // addr
            let () = w.u64(0);
            let () = w.u64(section.data.len() as u64);
            let () = w.u32(*offset as u32);
            // align, reloff, nreloc
            let () = w.u32(0);
            let () = w.u32(0);
            let () = w.u32(0);
            let () = w.u32(section.flags);
            // reserved1-3
            let () = w.u32(0);
            let () = w.u32(0);
            let () = w.u32(0);
        }

        let () = w.u32(LC_SYMTAB);
        let () = w.u32(SYMTAB_SIZE as u32);
        let () = w.u32(symoff as u32);
        let () = w.u32(symbols.len() as u32);
        let () = w.u32(stroff as u32);
        let () = w.u32(strtab.len() as u32);

        for (section, offset) in sections.iter().zip(&offsets) {
            if !section.data.is_empty() {
                let () = w.pad_to(*offset);
                let () = w.bytes(&section.data);
            }
        }

        let () = w.pad_to(symoff);
        for (sym, name) in symbols.iter().zip(&name_offsets) {
            let () = w.u32(*name);
            let () = w.u8(sym.n_type);
            let () = w.u8(sym.n_sect);
            // n_desc
            let () = w.u16(0);
            let () = w.u64(sym.value);
        }
        let () = w.bytes(&strtab);
        let () = w.pad_to(align_up(w.len(), 8));
        w.finish()
    }
}


/// A builder for Mach-O universal binaries.
#[derive(Clone, Debug, Default)]
pub struct FatBuilder {
    is_64: bool,
    objects: Vec<Vec<u8>>,
}

impl FatBuilder {
    /// Create a builder for an empty universal binary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `fat_arch_64` records instead of `fat_arch` ones.
    pub fn set_64(mut self, is_64: bool) -> Self {
        self.is_64 = is_64;
        self
    }

    /// Add a thin Mach-O object, as produced by [`MachOBuilder`].
    pub fn add(mut self, object: Vec<u8>) -> Self {
        let () = self.objects.push(object);
        self
    }

    /// Produce the universal binary. The last object ends at the end of
    /// the file.
    pub fn build(self) -> Vec<u8> {
        let record_size = if self.is_64 { 32 } else { 20 };
        let mut offset = 8 + record_size * self.objects.len();
        let mut offsets = Vec::with_capacity(self.objects.len());
        for object in &self.objects {
            offset = align_up(offset, 1 << FAT_ALIGN);
            let () = offsets.push(offset);
            offset += object.len();
        }

        let mut w = Writer::new(true);
        let () = w.u32(if self.is_64 { FAT_MAGIC_64 } else { FAT_MAGIC });
        let () = w.u32(self.objects.len() as u32);

        for (object, offset) in self.objects.iter().zip(&offsets) {
            let field = |range: Range<usize>| {
                let mut bytes = [0; 4];
                let () = bytes.copy_from_slice(&object[range]);
                u32::from_ne_bytes(bytes)
            };
            let () = w.u32(field(4..8));
            let () = w.u32(field(8..12));
            if self.is_64 {
                let () = w.u64(*offset as u64);
                let () = w.u64(object.len() as u64);
                let () = w.u32(FAT_ALIGN);
                let () = w.u32(0);
            } else {
                let () = w.u32(*offset as u32);
                let () = w.u32(object.len() as u32);
                let () = w.u32(FAT_ALIGN);
            }
        }

        for (object, offset) in self.objects.iter().zip(&offsets) {
            let () = w.pad_to(*offset);
            let () = w.bytes(object);
        }
        w.finish()
    }
}


#[derive(Clone, Debug)]
struct DwarfInlined {
    name: String,
    linkage_name: Option<String>,
    low_pc: Addr,
    high_pc: Addr,
    call_file: u64,
    call_line: u64,
}

#[derive(Clone, Debug)]
struct DwarfFunction {
    name: String,
    linkage_name: Option<String>,
    low_pc: Addr,
    high_pc: Addr,
    inlined: Vec<DwarfInlined>,
}

#[derive(Clone, Debug)]
struct DwarfRow {
    addr: Addr,
    file: u64,
    line: u64,
    column: u64,
}


const DW_TAG_COMPILE_UNIT: u64 = 0x11;
const DW_TAG_SUBPROGRAM: u64 = 0x2e;
const DW_TAG_INLINED_SUBROUTINE: u64 = 0x1d;
const DW_AT_NAME: u64 = 0x03;
const DW_AT_STMT_LIST: u64 = 0x10;
const DW_AT_LOW_PC: u64 = 0x11;
const DW_AT_HIGH_PC: u64 = 0x12;
const DW_AT_COMP_DIR: u64 = 0x1b;
const DW_AT_CALL_FILE: u64 = 0x58;
const DW_AT_CALL_LINE: u64 = 0x59;
const DW_AT_ABSTRACT_ORIGIN: u64 = 0x31;
const DW_AT_LINKAGE_NAME: u64 = 0x6e;
const DW_FORM_ADDR: u64 = 0x01;
const DW_FORM_STRING: u64 = 0x08;
const DW_FORM_UDATA: u64 = 0x0f;
const DW_FORM_REF4: u64 = 0x13;
const DW_FORM_SEC_OFFSET: u64 = 0x17;

const DW_LNS_COPY: u8 = 0x01;
const DW_LNS_ADVANCE_LINE: u8 = 0x03;
const DW_LNS_SET_FILE: u8 = 0x04;
const DW_LNS_SET_COLUMN: u8 = 0x05;
const DW_LNE_END_SEQUENCE: u8 = 0x01;
const DW_LNE_SET_ADDRESS: u8 = 0x02;

const ABBREV_CU: u64 = 1;
const ABBREV_SUBPROGRAM: u64 = 2;
const ABBREV_INLINED: u64 = 3;
const ABBREV_SUBPROGRAM_LINKAGE: u64 = 4;
const ABBREV_ABSTRACT: u64 = 5;
const ABBREV_ABSTRACT_LINKAGE: u64 = 6;


/// A builder for a single DWARF 4 compilation unit with a line program.
///
/// File indices are one based, as is the convention for DWARF 4. All
/// files are relative to the compilation directory. Inlined calls refer
/// to an abstract `DW_TAG_subprogram` carrying their names, the way
/// compilers emit them.
#[derive(Clone, Debug)]
pub struct DwarfBuilder {
    comp_dir: String,
    files: Vec<String>,
    functions: Vec<DwarfFunction>,
    rows: Vec<DwarfRow>,
    end: Addr,
    /// Whether the most recently added entry is an inlined call.
    last_inlined: bool,
    compressed: bool,
}

impl DwarfBuilder {
    /// Create a builder for a unit compiled in `comp_dir`.
    pub fn new(comp_dir: &str) -> Self {
        Self {
            comp_dir: comp_dir.to_string(),
            files: Vec::new(),
            functions: Vec::new(),
            rows: Vec::new(),
            end: 0,
            last_inlined: false,
            compressed: false,
        }
    }

    /// Add a source file to the line program's file table.
    pub fn add_file(mut self, name: &str) -> Self {
        let () = self.files.push(name.to_string());
        self
    }

    /// Add a function covering `[low_pc, high_pc)`.
    pub fn add_function(mut self, name: &str, low_pc: Addr, high_pc: Addr) -> Self {
        let function = DwarfFunction {
            name: name.to_string(),
            linkage_name: None,
            low_pc,
            high_pc,
            inlined: Vec::new(),
        };
        let () = self.functions.push(function);
        self.last_inlined = false;
        self
    }

    /// Add an inlined call to the most recently added function.
    pub fn add_inlined(
        mut self,
        name: &str,
        low_pc: Addr,
        high_pc: Addr,
        call_file: u64,
        call_line: u64,
    ) -> Self {
        let inlined = DwarfInlined {
            name: name.to_string(),
            linkage_name: None,
            low_pc,
            high_pc,
            call_file,
            call_line,
        };
        let function = self
            .functions
            .last_mut()
            .expect("inlined calls need a containing function");
        let () = function.inlined.push(inlined);
        self.last_inlined = true;
        self
    }

    /// Set the linkage (mangled) name of the most recently added
    /// function or inlined call.
    pub fn set_linkage_name(mut self, linkage_name: &str) -> Self {
        let function = self
            .functions
            .last_mut()
            .expect("linkage names need a function");
        let slot = if self.last_inlined {
            &mut function
                .inlined
                .last_mut()
                .expect("inlined call is missing")
                .linkage_name
        } else {
            &mut function.linkage_name
        };
        *slot = Some(linkage_name.to_string());
        self
    }

    /// Add a row to the line table. Rows have to be added in ascending
    /// address order.
    pub fn add_line(mut self, addr: Addr, file: u64, line: u64, column: u64) -> Self {
        let row = DwarfRow {
            addr,
            file,
            line,
            column,
        };
        let () = self.rows.push(row);
        self
    }

    /// Set the end address of the line table's only sequence.
    pub fn end_sequence(mut self, addr: Addr) -> Self {
        self.end = addr;
        self
    }

    /// Store all DWARF sections zlib compressed.
    #[cfg(feature = "zlib")]
    pub fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }

    fn abbrev(&self) -> Vec<u8> {
        let mut w = Writer::new(false);
        let mut abbrev = |code: u64, tag: u64, children: bool, attrs: &[(u64, u64)]| {
            let () = w.uleb(code);
            let () = w.uleb(tag);
            let () = w.u8(u8::from(children));
            for (name, form) in attrs {
                let () = w.uleb(*name);
                let () = w.uleb(*form);
            }
            let () = w.uleb(0);
            let () = w.uleb(0);
        };

        let () = abbrev(
            ABBREV_CU,
            DW_TAG_COMPILE_UNIT,
            true,
            &[
                (DW_AT_NAME, DW_FORM_STRING),
                (DW_AT_COMP_DIR, DW_FORM_STRING),
                (DW_AT_STMT_LIST, DW_FORM_SEC_OFFSET),
                (DW_AT_LOW_PC, DW_FORM_ADDR),
                (DW_AT_HIGH_PC, DW_FORM_UDATA),
            ],
        );
        let () = abbrev(
            ABBREV_SUBPROGRAM,
            DW_TAG_SUBPROGRAM,
            true,
            &[
                (DW_AT_NAME, DW_FORM_STRING),
                (DW_AT_LOW_PC, DW_FORM_ADDR),
                (DW_AT_HIGH_PC, DW_FORM_UDATA),
            ],
        );
        let () = abbrev(
            ABBREV_SUBPROGRAM_LINKAGE,
            DW_TAG_SUBPROGRAM,
            true,
            &[
                (DW_AT_NAME, DW_FORM_STRING),
                (DW_AT_LINKAGE_NAME, DW_FORM_STRING),
                (DW_AT_LOW_PC, DW_FORM_ADDR),
                (DW_AT_HIGH_PC, DW_FORM_UDATA),
            ],
        );
        let () = abbrev(
            ABBREV_ABSTRACT,
            DW_TAG_SUBPROGRAM,
            false,
            &[(DW_AT_NAME, DW_FORM_STRING)],
        );
        let () = abbrev(
            ABBREV_ABSTRACT_LINKAGE,
            DW_TAG_SUBPROGRAM,
            false,
            &[
                (DW_AT_NAME, DW_FORM_STRING),
                (DW_AT_LINKAGE_NAME, DW_FORM_STRING),
            ],
        );
        let () = abbrev(
            ABBREV_INLINED,
            DW_TAG_INLINED_SUBROUTINE,
            false,
            &[
                (DW_AT_ABSTRACT_ORIGIN, DW_FORM_REF4),
                (DW_AT_LOW_PC, DW_FORM_ADDR),
                (DW_AT_HIGH_PC, DW_FORM_UDATA),
                (DW_AT_CALL_FILE, DW_FORM_UDATA),
                (DW_AT_CALL_LINE, DW_FORM_UDATA),
            ],
        );
        let () = w.uleb(0);
        w.finish()
    }

    fn info(&self, big_endian: bool) -> Vec<u8> {
        let low_pc = self.functions.iter().map(|f| f.low_pc).min().unwrap_or(0);
        let high_pc = self.functions.iter().map(|f| f.high_pc).max().unwrap_or(0);

        let mut w = Writer::new(big_endian);
        // unit_length; patched below
        let () = w.u32(0);
        let () = w.u16(4);
        // debug_abbrev_offset
        let () = w.u32(0);
        // address_size
        let () = w.u8(8);

        let () = w.uleb(ABBREV_CU);
        let () = w.cstr(self.files.first().map(String::as_str).unwrap_or(""));
        let () = w.cstr(&self.comp_dir);
        let () = w.u32(0);
        let () = w.u64(low_pc);
        let () = w.uleb(high_pc - low_pc);

        // Abstract instances of all inlined functions, in order of
        // appearance.
        let mut origins = Vec::new();
        for inlined in self.functions.iter().flat_map(|f| &f.inlined) {
            let () = origins.push(w.len() as u32);
            if let Some(linkage_name) = &inlined.linkage_name {
                let () = w.uleb(ABBREV_ABSTRACT_LINKAGE);
                let () = w.cstr(&inlined.name);
                let () = w.cstr(linkage_name);
            } else {
                let () = w.uleb(ABBREV_ABSTRACT);
                let () = w.cstr(&inlined.name);
            }
        }

        let mut origins = origins.into_iter();
        for function in &self.functions {
            if let Some(linkage_name) = &function.linkage_name {
                let () = w.uleb(ABBREV_SUBPROGRAM_LINKAGE);
                let () = w.cstr(&function.name);
                let () = w.cstr(linkage_name);
            } else {
                let () = w.uleb(ABBREV_SUBPROGRAM);
                let () = w.cstr(&function.name);
            }
            let () = w.u64(function.low_pc);
            let () = w.uleb(function.high_pc - function.low_pc);

            for inlined in &function.inlined {
                let () = w.uleb(ABBREV_INLINED);
                let () = w.u32(origins.next().unwrap_or(0));
                let () = w.u64(inlined.low_pc);
                let () = w.uleb(inlined.high_pc - inlined.low_pc);
                let () = w.uleb(inlined.call_file);
                let () = w.uleb(inlined.call_line);
            }
            // End of the subprogram's children.
            let () = w.uleb(0);
        }
        // End of the unit's children.
        let () = w.uleb(0);

        let len = w.len() - 4;
        let () = w.patch_u32(0, len as u32);
        w.finish()
    }

    fn line(&self, big_endian: bool) -> Vec<u8> {
        let mut w = Writer::new(big_endian);
        // unit_length; patched below
        let () = w.u32(0);
        let () = w.u16(4);
        // header_length; patched below
        let () = w.u32(0);
        let header_start = w.len();
        // minimum_instruction_length
        let () = w.u8(1);
        // maximum_operations_per_instruction
        let () = w.u8(1);
        // default_is_stmt
        let () = w.u8(1);
        // line_base
        let () = w.u8(-5i8 as u8);
        // line_range
        let () = w.u8(14);
        // opcode_base
        let () = w.u8(13);
        let () = w.bytes(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        // No include directories.
        let () = w.u8(0);
        for file in &self.files {
            let () = w.cstr(file);
            // directory index, mtime, length
            let () = w.uleb(0);
            let () = w.uleb(0);
            let () = w.uleb(0);
        }
        let () = w.u8(0);
        let header_len = w.len() - header_start;
        let () = w.patch_u32(6, header_len as u32);

        let set_address = |w: &mut Writer, addr: Addr| {
            let () = w.u8(0);
            let () = w.uleb(9);
            let () = w.u8(DW_LNE_SET_ADDRESS);
            let () = w.u64(addr);
        };

        let mut line = 1;
        for row in &self.rows {
            let () = set_address(&mut w, row.addr);
            let () = w.u8(DW_LNS_SET_FILE);
            let () = w.uleb(row.file);
            let () = w.u8(DW_LNS_SET_COLUMN);
            let () = w.uleb(row.column);
            let () = w.u8(DW_LNS_ADVANCE_LINE);
            let () = w.sleb(row.line as i64 - line as i64);
            let () = w.u8(DW_LNS_COPY);
            line = row.line;
        }

        let () = set_address(&mut w, self.end);
        let () = w.u8(0);
        let () = w.uleb(1);
        let () = w.u8(DW_LNE_END_SEQUENCE);

        let len = w.len() - 4;
        let () = w.patch_u32(0, len as u32);
        w.finish()
    }

    /// Add the DWARF sections to an ELF file, using its byte order.
    pub fn add_to(self, elf: ElfBuilder) -> ElfBuilder {
        let big_endian = elf.big_endian;
        let sections = [
            (".debug_abbrev", self.abbrev()),
            (".debug_info", self.info(big_endian)),
            (".debug_line", self.line(big_endian)),
        ];

        sections
            .into_iter()
            .fold(elf, |elf, (name, data)| self.add_section(elf, name, &data))
    }

    /// Add the DWARF sections to a Mach-O file, as found in `.dSYM`
    /// bundles.
    pub fn add_to_macho(self, macho: MachOBuilder) -> MachOBuilder {
        let big_endian = cfg!(target_endian = "big");
        let sections = [
            ("__debug_abbrev", self.abbrev()),
            ("__debug_info", self.info(big_endian)),
            ("__debug_line", self.line(big_endian)),
        ];

        sections
            .into_iter()
            .fold(macho, |macho, (name, data)| macho.add_section(name, &data))
    }

    #[cfg(feature = "zlib")]
    fn add_section(&self, elf: ElfBuilder, name: &str, data: &[u8]) -> ElfBuilder {
        if self.compressed {
            elf.add_zlib_section(name, data)
        } else {
            elf.add_section(name, data)
        }
    }

    #[cfg(not(feature = "zlib"))]
    fn add_section(&self, elf: ElfBuilder, name: &str, data: &[u8]) -> ElfBuilder {
        debug_assert!(!self.compressed);
        elf.add_section(name, data)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use test_tag::tag;


    /// Check our LEB128 encoding against well known values.
    #[tag(miri)]
    #[test]
    fn leb128_encoding() {
        let mut w = Writer::new(false);
        let () = w.uleb(624485);
        assert_eq!(w.finish(), [0xe5, 0x8e, 0x26]);

        let mut w = Writer::new(false);
        let () = w.sleb(-123456);
        assert_eq!(w.finish(), [0xc0, 0xbb, 0x78]);

        let mut w = Writer::new(false);
        let () = w.sleb(2);
        let () = w.sleb(-1);
        let () = w.sleb(64);
        assert_eq!(w.finish(), [0x02, 0x7f, 0xc0, 0x00]);
    }

    /// Check that debug link sections are padded before the checksum.
    #[tag(miri)]
    #[test]
    fn debug_link_layout() {
        let section = debug_link_section("ab", 0x11223344, true);
        assert_eq!(section, b"ab\0\0\x44\x33\x22\x11");

        let section = debug_link_section("abc", 0x11223344, false);
        assert_eq!(section, b"abc\0\x11\x22\x33\x44");
    }
}
