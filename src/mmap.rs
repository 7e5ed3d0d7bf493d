use std::fs::File;
use std::ops::Deref;
use std::ops::Range;
use std::path::Path;
use std::rc::Rc;

use memmap2::Mmap as Mapping;
use memmap2::MmapOptions;

use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


/// A type encapsulating a region of mapped memory.
#[derive(Clone, Debug)]
pub(crate) struct Mmap {
    /// The actual memory mapping.
    mapping: Option<Rc<Mapping>>,
    /// The view on the memory mapping that this object represents.
    view: Range<u64>,
}

impl Mmap {
    /// Memory map the file at the provided `path`.
    pub(crate) fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::map(&file).with_context(|| format!("failed to map `{}`", path.display()))
    }

    /// Map the provided file into memory, in its entirety.
    pub(crate) fn map(file: &File) -> Result<Self> {
        let len = usize::try_from(file.metadata()?.len())
            .map_err(Error::with_invalid_data)
            .context("file is too large to mmap")?;

        // The kernel does not allow mmap'ing a region of size 0. We
        // want to enable this case transparently, though.
        let mmap = if len == 0 {
            Self {
                mapping: None,
                view: 0..0,
            }
        } else {
            let opts = MmapOptions::new();
            // SAFETY: We map read-only and never hand out mutable views.
            //         Concurrent modification of the file by other
            //         processes is outside of our control.
            let mapping = unsafe { opts.map(file) }?;

            Self {
                mapping: Some(Rc::new(mapping)),
                view: 0..len as u64,
            }
        };
        Ok(mmap)
    }

    /// Create a new `Mmap` object (sharing the same underlying memory mapping
    /// as the current one) that restricts its view to the provided `range`.
    /// Adjustment happens relative to the current view.
    pub(crate) fn constrain(&self, range: Range<u64>) -> Option<Self> {
        if range.start > range.end {
            return None
        }

        let end = self.view.start.checked_add(range.end)?;
        if end > self.view.end {
            return None
        }

        let mut mmap = self.clone();
        mmap.view.end = end;
        mmap.view.start += range.start;
        Some(mmap)
    }
}

impl Deref for Mmap {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        if let Some(mapping) = &self.mapping {
            mapping
                .deref()
                .get(self.view.start as usize..self.view.end as usize)
                .unwrap_or(&[])
        } else {
            &[]
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::ffi::CStr;
    use std::io::Write;

    use tempfile::NamedTempFile;
    use test_log::test;

    use crate::util::ReadRaw;
    use crate::ErrorKind;


    /// Check that we can `mmap` an empty file.
    #[test]
    fn mmap_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let file = file.as_file();
        let mmap = Mmap::map(file).unwrap();
        assert_eq!(mmap.deref(), &[]);
        assert!(mmap.constrain(0..0).is_some());
        assert!(mmap.constrain(0..1).is_none());
    }

    /// Check that we can `mmap` a file.
    #[test]
    fn mmap() {
        let file = NamedTempFile::new().unwrap();
        let mut file = file.as_file();
        let cstr = b"modsym was here. Briefly.\0";
        let () = file.write_all(cstr).unwrap();
        let () = file.sync_all().unwrap();

        let mmap = Mmap::map(file).unwrap();
        let mut data = mmap.deref();
        let s = data.read_cstr().unwrap();
        assert_eq!(
            s.to_str().unwrap(),
            CStr::from_bytes_with_nul(cstr).unwrap().to_str().unwrap()
        );
    }

    /// Make sure that opening a non-existent path reports `NotFound`.
    #[test]
    fn open_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Mmap::open(dir.path().join("does-not-exist")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    /// Check that we can properly restrict the view of a `Mmap`.
    #[test]
    fn view_constraining() {
        let file = NamedTempFile::new().unwrap();
        let mut file = file.as_file();
        let s = b"abcdefghijklmnopqrstuvwxyz";
        let () = file.write_all(s).unwrap();
        let () = file.sync_all().unwrap();

        let mmap = Mmap::map(file).unwrap();
        assert_eq!(mmap.deref(), b"abcdefghijklmnopqrstuvwxyz");

        let mmap = mmap.constrain(1..15).unwrap();
        assert_eq!(mmap.deref(), b"bcdefghijklmno");

        let mmap = mmap.constrain(5..6).unwrap();
        assert_eq!(mmap.deref(), b"g");

        assert!(mmap.constrain(1..2).is_none());
        assert!(mmap.constrain(1..0).is_none());
        assert!(mmap.constrain(0..u64::MAX).is_none());
    }
}
