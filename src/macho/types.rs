use crate::util::Pod;


pub(crate) const MH_MAGIC_64: u32 = 0xfeed_facf;
pub(crate) const MH_CIGAM_64: u32 = 0xcffa_edfe;
pub(crate) const MH_MAGIC: u32 = 0xfeed_face;
pub(crate) const MH_CIGAM: u32 = 0xcefa_edfe;

pub(crate) const FAT_MAGIC: u32 = 0xcafe_babe;
pub(crate) const FAT_MAGIC_64: u32 = 0xcafe_babf;

pub(crate) const LC_SYMTAB: u32 = 0x2;
pub(crate) const LC_SEGMENT_64: u32 = 0x19;

/// The section contains only true machine instructions.
pub(crate) const S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
/// The section contains some machine instructions.
pub(crate) const S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;
pub(crate) const SECTION_TYPE: u32 = 0x0000_00ff;
pub(crate) const S_ZEROFILL: u32 = 0x1;
pub(crate) const S_GB_ZEROFILL: u32 = 0xc;
pub(crate) const S_THREAD_LOCAL_ZEROFILL: u32 = 0x12;

pub(crate) const N_STAB: u8 = 0xe0;
pub(crate) const N_TYPE: u8 = 0x0e;
pub(crate) const N_SECT: u8 = 0xe;


#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct mach_header_64 {
    pub magic: u32,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    pub reserved: u32,
}

// SAFETY: `mach_header_64` is valid for any bit pattern.
unsafe impl Pod for mach_header_64 {}


#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct load_command {
    pub cmd: u32,
    pub cmdsize: u32,
}

// SAFETY: `load_command` is valid for any bit pattern.
unsafe impl Pod for load_command {}


#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct segment_command_64 {
    pub cmd: u32,
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub nsects: u32,
    pub flags: u32,
}

// SAFETY: `segment_command_64` is valid for any bit pattern.
unsafe impl Pod for segment_command_64 {}


#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct section_64 {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: u32,
}

impl section_64 {
    /// Check whether the section holds code.
    #[inline]
    pub fn is_text(&self) -> bool {
        self.flags & (S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS) != 0
    }

    /// Check whether the section occupies no space in the file.
    #[inline]
    pub fn is_zerofill(&self) -> bool {
        matches!(
            self.flags & SECTION_TYPE,
            S_ZEROFILL | S_GB_ZEROFILL | S_THREAD_LOCAL_ZEROFILL
        )
    }
}

// SAFETY: `section_64` is valid for any bit pattern.
unsafe impl Pod for section_64 {}


#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct symtab_command {
    pub cmd: u32,
    pub cmdsize: u32,
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

// SAFETY: `symtab_command` is valid for any bit pattern.
unsafe impl Pod for symtab_command {}


#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct nlist_64 {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u64,
}

// SAFETY: `nlist_64` is valid for any bit pattern.
unsafe impl Pod for nlist_64 {}


#[cfg(test)]
mod tests {
    use super::*;

    use std::mem::size_of;

    use test_tag::tag;


    /// Make sure that our type definitions match the on-disk layout.
    #[tag(miri)]
    #[test]
    fn type_sizes() {
        assert_eq!(size_of::<mach_header_64>(), 32);
        assert_eq!(size_of::<load_command>(), 8);
        assert_eq!(size_of::<segment_command_64>(), 72);
        assert_eq!(size_of::<section_64>(), 80);
        assert_eq!(size_of::<symtab_command>(), 24);
        assert_eq!(size_of::<nlist_64>(), 16);
    }

    /// Check section attribute decoding.
    #[tag(miri)]
    #[test]
    fn section_attributes() {
        let mut sect = section_64 {
            sectname: *b"__text\0\0\0\0\0\0\0\0\0\0",
            segname: *b"__TEXT\0\0\0\0\0\0\0\0\0\0",
            addr: 0x1000,
            size: 0x100,
            offset: 0x1000,
            align: 4,
            reloff: 0,
            nreloc: 0,
            flags: S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS,
            reserved1: 0,
            reserved2: 0,
            reserved3: 0,
        };
        assert!(sect.is_text());
        assert!(!sect.is_zerofill());
        assert_ne!(format!("{sect:?}"), "");

        sect.flags = S_ZEROFILL;
        assert!(!sect.is_text());
        assert!(sect.is_zerofill());
    }
}
