use crate::util::Pod;
use crate::SymType;

pub(crate) const EI_NIDENT: usize = 16;
pub(crate) const EI_CLASS: usize = 4;
pub(crate) const EI_DATA: usize = 5;

pub(crate) const ELFCLASS64: u8 = 2;
pub(crate) const ELFDATA2LSB: u8 = 1;
pub(crate) const ELFDATA2MSB: u8 = 2;

pub(crate) const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

type Elf64_Addr = u64;
type Elf64_Half = u16;
type Elf64_Off = u64;
type Elf64_Word = u32;
type Elf64_Xword = u64;


#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct Elf64_Ehdr {
    pub e_ident: [u8; EI_NIDENT], /* ELF "magic number" */
    pub e_type: Elf64_Half,
    pub e_machine: Elf64_Half,
    pub e_version: Elf64_Word,
    pub e_entry: Elf64_Addr, /* Entry point virtual address */
    pub e_phoff: Elf64_Off,  /* Program header table file offset */
    pub e_shoff: Elf64_Off,  /* Section header table file offset */
    pub e_flags: Elf64_Word,
    pub e_ehsize: Elf64_Half,
    pub e_phentsize: Elf64_Half,
    pub e_phnum: Elf64_Half,
    pub e_shentsize: Elf64_Half,
    pub e_shnum: Elf64_Half,
    pub e_shstrndx: Elf64_Half,
}

impl Elf64_Ehdr {
    pub(crate) fn swap_bytes(self) -> Self {
        Self {
            e_ident: self.e_ident,
            e_type: self.e_type.swap_bytes(),
            e_machine: self.e_machine.swap_bytes(),
            e_version: self.e_version.swap_bytes(),
            e_entry: self.e_entry.swap_bytes(),
            e_phoff: self.e_phoff.swap_bytes(),
            e_shoff: self.e_shoff.swap_bytes(),
            e_flags: self.e_flags.swap_bytes(),
            e_ehsize: self.e_ehsize.swap_bytes(),
            e_phentsize: self.e_phentsize.swap_bytes(),
            e_phnum: self.e_phnum.swap_bytes(),
            e_shentsize: self.e_shentsize.swap_bytes(),
            e_shnum: self.e_shnum.swap_bytes(),
            e_shstrndx: self.e_shstrndx.swap_bytes(),
        }
    }
}

// SAFETY: `Elf64_Ehdr` is valid for any bit pattern.
unsafe impl Pod for Elf64_Ehdr {}


pub(crate) const SHN_UNDEF: u16 = 0;
pub(crate) const SHN_COMMON: u16 = 0xfff2;
pub(crate) const SHN_XINDEX: u16 = 0xffff;

pub(crate) const SHT_SYMTAB: Elf64_Word = 2;
pub(crate) const SHT_NOBITS: Elf64_Word = 8;
pub(crate) const SHT_DYNSYM: Elf64_Word = 11;

pub(crate) const SHF_COMPRESSED: Elf64_Xword = 0x800;

#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct Elf64_Shdr {
    pub sh_name: Elf64_Word,       /* Section name, index in string tbl */
    pub sh_type: Elf64_Word,       /* Type of section */
    pub sh_flags: Elf64_Xword,     /* Miscellaneous section attributes */
    pub sh_addr: Elf64_Addr,       /* Section virtual addr at execution */
    pub sh_offset: Elf64_Off,      /* Section file offset */
    pub sh_size: Elf64_Xword,      /* Size of section in bytes */
    pub sh_link: Elf64_Word,       /* Index of another section */
    pub sh_info: Elf64_Word,       /* Additional section information */
    pub sh_addralign: Elf64_Xword, /* Section alignment */
    pub sh_entsize: Elf64_Xword,   /* Entry size if section holds table */
}

impl Elf64_Shdr {
    pub(crate) fn swap_bytes(self) -> Self {
        Self {
            sh_name: self.sh_name.swap_bytes(),
            sh_type: self.sh_type.swap_bytes(),
            sh_flags: self.sh_flags.swap_bytes(),
            sh_addr: self.sh_addr.swap_bytes(),
            sh_offset: self.sh_offset.swap_bytes(),
            sh_size: self.sh_size.swap_bytes(),
            sh_link: self.sh_link.swap_bytes(),
            sh_info: self.sh_info.swap_bytes(),
            sh_addralign: self.sh_addralign.swap_bytes(),
            sh_entsize: self.sh_entsize.swap_bytes(),
        }
    }
}

// SAFETY: `Elf64_Shdr` is valid for any bit pattern.
unsafe impl Pod for Elf64_Shdr {}


pub(crate) const STT_OBJECT: u8 = 1;
pub(crate) const STT_FUNC: u8 = 2;
pub(crate) const STT_COMMON: u8 = 5;
pub(crate) const STT_GNU_IFUNC: u8 = 10;

#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct Elf64_Sym {
    pub st_name: Elf64_Word,  /* Symbol name, index in string tbl */
    pub st_info: u8,          /* Type and binding attributes */
    pub st_other: u8,         /* No defined meaning, 0 */
    pub st_shndx: Elf64_Half, /* Associated section index */
    pub st_value: Elf64_Addr, /* Value of the symbol */
    pub st_size: Elf64_Xword, /* Associated symbol size */
}

impl Elf64_Sym {
    /// Extract the symbols type, typically represented by a STT_* constant.
    #[inline]
    pub fn type_(&self) -> u8 {
        self.st_info & 0xf
    }

    pub(crate) fn swap_bytes(self) -> Self {
        Self {
            st_name: self.st_name.swap_bytes(),
            st_info: self.st_info,
            st_other: self.st_other,
            st_shndx: self.st_shndx.swap_bytes(),
            st_value: self.st_value.swap_bytes(),
            st_size: self.st_size.swap_bytes(),
        }
    }
}

impl TryFrom<&Elf64_Sym> for SymType {
    type Error = ();

    fn try_from(other: &Elf64_Sym) -> Result<Self, Self::Error> {
        match other.type_() {
            STT_FUNC | STT_GNU_IFUNC => Ok(SymType::Function),
            STT_OBJECT | STT_COMMON => Ok(SymType::Variable),
            _ => Err(()),
        }
    }
}

// SAFETY: `Elf64_Sym` is valid for any bit pattern.
unsafe impl Pod for Elf64_Sym {}


pub(crate) const ELFCOMPRESS_ZLIB: Elf64_Word = 1;
pub(crate) const ELFCOMPRESS_ZSTD: Elf64_Word = 2;

/// The header preceding the data of a `SHF_COMPRESSED` section.
#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct Elf64_Chdr {
    pub ch_type: Elf64_Word,
    pub ch_reserved: Elf64_Word,
    pub ch_size: Elf64_Xword,
    pub ch_addralign: Elf64_Xword,
}

impl Elf64_Chdr {
    pub(crate) fn swap_bytes(self) -> Self {
        Self {
            ch_type: self.ch_type.swap_bytes(),
            ch_reserved: self.ch_reserved.swap_bytes(),
            ch_size: self.ch_size.swap_bytes(),
            ch_addralign: self.ch_addralign.swap_bytes(),
        }
    }
}

// SAFETY: `Elf64_Chdr` is valid for any bit pattern.
unsafe impl Pod for Elf64_Chdr {}
