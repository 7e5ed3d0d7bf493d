//! Discovery of separate debug files.
//!
//! Two conventions are supported:
//! - Mach-O binaries may have a `.dSYM` bundle next to them, holding a
//!   companion file with the same base name under
//!   `Contents/Resources/DWARF/`.
//! - Binaries may carry a GNU debug link, a section named
//!   `.gnu_debuglink` containing the name of the debug file, followed by
//!   padding up to the next four byte boundary and a CRC32 checksum of
//!   the debug file's full contents, stored in the binary's byte order.

use std::env::current_dir;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::log::debug;
use crate::log::warn;
use crate::mmap::Mmap;
use crate::object::Binary;
use crate::object::ObjectReader;
use crate::util::bytes_to_os_str;
use crate::util::ReadRaw as _;
use crate::ErrorExt as _;
use crate::ErrorKind;
use crate::IntoError as _;
use crate::Result;


/// The name of the GNU debug link section.
const DEBUG_LINK_SECTION: &str = ".gnu_debuglink";

/// The global debug directories searched by default.
pub(crate) const DEFAULT_DEBUG_DIRS: &[&str] = &["/usr/lib/debug"];


const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xedb88320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};


/// Calculate the CRC32 checksum used by GNU debug links.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let crc = 0u32;
    let crc = data.iter().fold(!crc, |crc, byte| {
        let idx = (crc ^ u32::from(*byte)) & 0xff;
        CRC32_TABLE[idx as usize] ^ (crc >> 8)
    });

    !crc
}


fn parse_debug_link_section_data(mut data: &[u8], little_endian: bool) -> Result<(&OsStr, u32)> {
    let data_start = data;
    let file = data
        .read_cstr()
        .ok_or_invalid_data(|| "failed to read debug link file name")?;
    let file = bytes_to_os_str(file.to_bytes())?;

    let cur_offset = data_start.len() - data.len();
    // The checksum is aligned to the next four byte boundary relative
    // to the start of the section.
    let align = 4;
    let crc_offset = (cur_offset + (align - 1)) & !(align - 1);
    let () = data
        .advance(crc_offset - cur_offset)
        .ok_or_invalid_data(|| {
            "debug link section contains insufficient data: checksum not found"
        })?;
    let crc = data
        .read_u32_endian(little_endian)
        .ok_or_invalid_data(|| "failed to read debug link checksum")?;
    Ok((file, crc))
}


/// Read the debug link of `obj`, if it has one.
fn read_debug_link(obj: &dyn ObjectReader) -> Result<Option<(OsString, u32)>> {
    let data = if let Some(data) = obj.section_data(DEBUG_LINK_SECTION)? {
        data
    } else {
        return Ok(None)
    };

    let (file, crc) = parse_debug_link_section_data(&data, obj.is_little_endian())?;
    Ok(Some((file.to_os_string(), crc)))
}


/// Generate the paths at which the debug link target `linkee` may be
/// found, in the order they should be tried.
///
/// `linker_dir` is the symlink-resolved directory of the binary
/// containing the debug link.
fn debug_link_candidates<'path>(
    linker_dir: &'path Path,
    linkee: &'path OsStr,
    debug_dirs: &'path [PathBuf],
) -> impl Iterator<Item = PathBuf> + 'path {
    // The linker's directory without root (or prefix), for joining onto
    // the global debug directories.
    let rel_dir = linker_dir
        .components()
        .filter(|component| matches!(component, Component::Normal(..)))
        .collect::<PathBuf>();

    [
        linker_dir.join(linkee),
        linker_dir.join(".debug").join(linkee),
    ]
    .into_iter()
    .chain(
        debug_dirs
            .iter()
            .map(move |dir| dir.join(&rel_dir).join(linkee)),
    )
}


/// A type for finding the separate debug file of a binary.
#[derive(Debug)]
pub(crate) struct DebugBinaryLocator {
    /// The global debug directories to search for debug link targets.
    debug_dirs: Vec<PathBuf>,
    /// Whether to check debug link targets against the recorded
    /// checksum.
    verify_checksum: bool,
}

impl DebugBinaryLocator {
    pub(crate) fn new(debug_dirs: Vec<PathBuf>, verify_checksum: bool) -> Self {
        Self {
            debug_dirs,
            verify_checksum,
        }
    }

    /// Find the debug file of the binary at `path`.
    ///
    /// Returns `None` if no separate debug file could be found, in which
    /// case the binary itself is supposed to serve as the debug source.
    /// Problems encountered along the way are logged but are otherwise
    /// not fatal.
    pub(crate) fn locate(&self, path: &Path, binary: &Binary) -> Option<Binary> {
        if binary.is_macho() {
            if let Some(dsym) = self.find_dsym(path) {
                return Some(dsym)
            }
        }

        let obj = binary.as_object()?;
        match read_debug_link(obj) {
            Ok(Some((linkee, crc))) => self.find_debug_link(path, &linkee, crc),
            Ok(None) => None,
            Err(err) => {
                warn!(
                    "failed to read debug link of `{}`: {err:#}",
                    path.display()
                );
                None
            }
        }
    }

    fn find_dsym(&self, path: &Path) -> Option<Binary> {
        let basename = path.file_name()?;
        let mut bundle = path.as_os_str().to_os_string();
        let () = bundle.push(".dSYM");
        let dsym = PathBuf::from(bundle)
            .join("Contents")
            .join("Resources")
            .join("DWARF")
            .join(basename);

        match Binary::open(&dsym) {
            Ok(binary) => {
                debug!("using dSYM companion `{}`", dsym.display());
                Some(binary)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!("failed to load dSYM companion: {err:#}");
                None
            }
        }
    }

    fn find_debug_link(&self, path: &Path, linkee: &OsStr, crc: u32) -> Option<Binary> {
        let real_path = path.canonicalize().unwrap_or_else(|_err| {
            current_dir()
                .map(|dir| dir.join(path))
                .unwrap_or_else(|_err| path.to_path_buf())
        });
        let linker_dir = real_path.parent().unwrap_or_else(|| Path::new(""));

        for candidate in debug_link_candidates(linker_dir, linkee, &self.debug_dirs) {
            match self.load_candidate(&candidate, crc) {
                Ok(Some(binary)) => {
                    debug!(
                        "using debug link target `{}` for `{}`",
                        candidate.display(),
                        path.display()
                    );
                    return Some(binary)
                }
                Ok(None) => (),
                Err(err) => {
                    warn!("failed to load debug link candidate: {err:#}");
                }
            }
        }

        debug!(
            "no debug link target `{}` found for `{}`",
            linkee.to_string_lossy(),
            path.display()
        );
        None
    }

    fn load_candidate(&self, path: &Path, crc: u32) -> Result<Option<Binary>> {
        let mmap = match Mmap::open(path) {
            Ok(mmap) => mmap,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        if self.verify_checksum {
            let actual = crc32(&mmap);
            if actual != crc {
                debug!(
                    "checksum mismatch for `{}`: expected {crc:#x}, found {actual:#x}",
                    path.display()
                );
                return Ok(None)
            }
        }

        let binary =
            Binary::parse(mmap).with_context(|| format!("failed to parse `{}`", path.display()))?;
        Ok(Some(binary))
    }
}
