use std::collections::HashMap;

use crate::arch::Arch;
use crate::log::debug;
use crate::log::warn;
use crate::object::Binary;
use crate::object::ObjectReader;


/// A handle to a binary owned by a [`BinaryArena`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct BinaryId(usize);

#[cfg(test)]
impl BinaryId {
    pub(crate) fn new(idx: usize) -> Self {
        Self(idx)
    }
}


/// The owner of all parsed binaries.
#[derive(Debug, Default)]
pub(crate) struct BinaryArena {
    binaries: Vec<Binary>,
}

impl BinaryArena {
    /// Take ownership of `binary`, returning a handle to it.
    pub(crate) fn insert(&mut self, binary: Binary) -> BinaryId {
        let id = BinaryId(self.binaries.len());
        let () = self.binaries.push(binary);
        id
    }

    /// Retrieve the binary with the given handle.
    ///
    /// # Panics
    /// This function panics if `id` was not handed out by this arena.
    pub(crate) fn get(&self, id: BinaryId) -> &Binary {
        &self.binaries[id.0]
    }

    /// Retrieve the object with the given handle.
    ///
    /// Returns `None` if the binary is a universal one.
    pub(crate) fn object(&self, id: BinaryId) -> Option<&dyn ObjectReader> {
        self.get(id).as_object()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.binaries.len()
    }
}


/// A type for picking the object matching an architecture out of a
/// binary.
#[derive(Debug, Default)]
pub(crate) struct ArchSelector {
    /// Objects extracted from universal binaries, keyed by the
    /// universal binary and the requested architecture name.
    cache: HashMap<(BinaryId, String), Option<BinaryId>>,
}

impl ArchSelector {
    /// Resolve the binary `id` to the object for `arch`.
    ///
    /// Single-architecture objects resolve to themselves, irrespective
    /// of `arch`. Universal binaries resolve to the contained object
    /// whose CPU type matches `arch`, if any. Extracted objects are
    /// added to `arena`; results, including failures, are cached.
    pub(crate) fn resolve(
        &mut self,
        arena: &mut BinaryArena,
        id: BinaryId,
        arch: &str,
    ) -> Option<BinaryId> {
        let fat = match arena.get(id) {
            Binary::Object(..) => return Some(id),
            Binary::Universal(fat) => fat,
        };

        let key = (id, arch.to_string());
        if let Some(resolved) = self.cache.get(&key) {
            return *resolved
        }

        let obj = match Arch::parse(arch) {
            Some(parsed) => match fat.object_for_arch(parsed) {
                Ok(Some(obj)) => Some(obj),
                Ok(None) => {
                    debug!("universal binary has no `{arch}` object");
                    None
                }
                Err(err) => {
                    warn!("failed to extract `{arch}` object from universal binary: {err:#}");
                    None
                }
            },
            None => {
                debug!("unknown architecture `{arch}`");
                None
            }
        };

        let resolved = obj.map(|obj| arena.insert(Binary::Object(Box::new(obj))));
        let _prev = self.cache.insert(key, resolved);
        resolved
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


    fn binary(data: &[u8]) -> Binary {
        let mut file = NamedTempFile::new().unwrap();
        let () = file.write_all(data).unwrap();
        let () = file.flush().unwrap();
        Binary::open(file.path()).unwrap()
    }


    /// Check that single-architecture objects resolve to themselves.
    #[test]
    fn object_resolution() {
        let mut arena = BinaryArena::default();
        let mut selector = ArchSelector::default();
        let id = arena.insert(binary(&ElfBuilder::new().build()));

        assert_eq!(selector.resolve(&mut arena, id, "x86_64"), Some(id));
        assert_eq!(selector.resolve(&mut arena, id, "arm64"), Some(id));
        assert_eq!(selector.resolve(&mut arena, id, ""), Some(id));
        assert_eq!(arena.len(), 1);
    }

    /// Check that objects extracted from universal binaries are cached.
    #[test]
    fn universal_resolution() {
        let data = FatBuilder::new()
            .add(MachOBuilder::new(Arch::X86_64).build())
            .add(MachOBuilder::new(Arch::Aarch64).build())
            .build();
        let mut arena = BinaryArena::default();
        let mut selector = ArchSelector::default();
        let fat = arena.insert(binary(&data));

        let arm = selector.resolve(&mut arena, fat, "arm64").unwrap();
        assert_ne!(arm, fat);
        assert_eq!(arena.object(arm).unwrap().arch(), Some(Arch::Aarch64));
        assert_eq!(arena.len(), 2);

        // The `aarch64` spelling denotes the same architecture, but is
        // cached separately.
        let arm2 = selector.resolve(&mut arena, fat, "aarch64-apple-darwin").unwrap();
        assert_eq!(arena.object(arm2).unwrap().arch(), Some(Arch::Aarch64));
        assert_eq!(arena.len(), 3);

        let arm3 = selector.resolve(&mut arena, fat, "arm64").unwrap();
        assert_eq!(arm3, arm);
        assert_eq!(arena.len(), 3);

        let x86 = selector.resolve(&mut arena, fat, "x86_64").unwrap();
        assert_eq!(arena.object(x86).unwrap().arch(), Some(Arch::X86_64));
    }

    /// Check that failures are reported as `None` and cached.
    #[test]
    fn failed_resolution() {
        let data = FatBuilder::new()
            .add(MachOBuilder::new(Arch::X86_64).build())
            .build();
        let mut arena = BinaryArena::default();
        let mut selector = ArchSelector::default();
        let fat = arena.insert(binary(&data));

        assert_eq!(selector.resolve(&mut arena, fat, "ppc64"), None);
        assert_eq!(selector.resolve(&mut arena, fat, "not-an-arch"), None);
        assert_eq!(selector.resolve(&mut arena, fat, ""), None);
        assert_eq!(arena.len(), 1);
        assert_eq!(selector.cache.len(), 3);
    }
}
