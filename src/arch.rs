use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::str::FromStr;

use crate::Error;


/// Mach-O CPU type flag for 64 bit ABIs.
const CPU_ARCH_ABI64: u32 = 0x0100_0000;

const CPU_TYPE_X86: u32 = 7;
const CPU_TYPE_ARM: u32 = 12;
const CPU_TYPE_POWERPC: u32 = 18;


/// A CPU architecture.
///
/// Architectures are named the way target triples name them, e.g.,
/// `x86_64` or `arm64`. Only the first dash separated component of a
/// triple is considered, so `x86_64-unknown-linux-gnu` parses as well.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Arch {
    /// 32 bit x86.
    X86,
    /// 64 bit x86.
    X86_64,
    /// 32 bit ARM, including Thumb.
    Arm,
    /// 64 bit ARM.
    Aarch64,
    /// 32 bit PowerPC.
    PowerPc,
    /// 64 bit PowerPC.
    PowerPc64,
    /// 64 bit RISC-V.
    RiscV64,
}

impl Arch {
    /// Parse an architecture name.
    ///
    /// Returns `None` if the name does not denote a known architecture.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.split('-').next().unwrap_or("");
        let arch = match name {
            "i386" | "i486" | "i586" | "i686" | "i786" | "i886" | "i986" | "x86" => Self::X86,
            "amd64" | "x86_64" | "x86_64h" => Self::X86_64,
            "aarch64" | "arm64" | "arm64e" => Self::Aarch64,
            "ppc" | "powerpc" | "ppc32" => Self::PowerPc,
            "ppc64" | "powerpc64" => Self::PowerPc64,
            "riscv64" => Self::RiscV64,
            _ if name.starts_with("armv")
                || name.starts_with("thumbv")
                || name == "arm"
                || name == "thumb"
                || name == "xscale" =>
            {
                Self::Arm
            }
            _ => return None,
        };
        Some(arch)
    }

    /// Retrieve the architecture of the host we are running on.
    pub fn host() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Self::X86_64)
        } else if cfg!(target_arch = "x86") {
            Some(Self::X86)
        } else if cfg!(target_arch = "aarch64") {
            Some(Self::Aarch64)
        } else if cfg!(target_arch = "arm") {
            Some(Self::Arm)
        } else if cfg!(target_arch = "powerpc64") {
            Some(Self::PowerPc64)
        } else if cfg!(target_arch = "powerpc") {
            Some(Self::PowerPc)
        } else if cfg!(target_arch = "riscv64") {
            Some(Self::RiscV64)
        } else {
            None
        }
    }

    /// The canonical name of the architecture.
    pub fn name(&self) -> &'static str {
        match self {
            Self::X86 => "i386",
            Self::X86_64 => "x86_64",
            Self::Arm => "arm",
            Self::Aarch64 => "arm64",
            Self::PowerPc => "ppc",
            Self::PowerPc64 => "ppc64",
            Self::RiscV64 => "riscv64",
        }
    }

    /// The Mach-O `cputype` value identifying this architecture, if the
    /// format supports it.
    pub(crate) fn macho_cpu_type(&self) -> Option<u32> {
        let cpu_type = match self {
            Self::X86 => CPU_TYPE_X86,
            Self::X86_64 => CPU_TYPE_X86 | CPU_ARCH_ABI64,
            Self::Arm => CPU_TYPE_ARM,
            Self::Aarch64 => CPU_TYPE_ARM | CPU_ARCH_ABI64,
            Self::PowerPc => CPU_TYPE_POWERPC,
            Self::PowerPc64 => CPU_TYPE_POWERPC | CPU_ARCH_ABI64,
            Self::RiscV64 => return None,
        };
        Some(cpu_type)
    }

    /// Map a Mach-O `cputype` to an architecture.
    pub(crate) fn from_macho_cpu_type(cpu_type: u32) -> Option<Self> {
        [
            Self::X86,
            Self::X86_64,
            Self::Arm,
            Self::Aarch64,
            Self::PowerPc,
            Self::PowerPc64,
        ]
        .into_iter()
        .find(|arch| arch.macho_cpu_type() == Some(cpu_type))
    }

    /// Map an ELF `e_machine` value to an architecture.
    pub(crate) fn from_elf_machine(machine: u16) -> Option<Self> {
        let arch = match machine {
            3 => Self::X86,
            62 => Self::X86_64,
            40 => Self::Arm,
            183 => Self::Aarch64,
            20 => Self::PowerPc,
            21 => Self::PowerPc64,
            243 => Self::RiscV64,
            _ => return None,
        };
        Some(arch)
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::with_invalid_input(format!("unknown architecture `{s}`")))
    }
}
