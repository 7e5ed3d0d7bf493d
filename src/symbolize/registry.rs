use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use crate::arch::Arch;
#[cfg(feature = "dwarf")]
use crate::dwarf::DwarfProvider;
use crate::log::debug;
use crate::log::warn;
use crate::object::Binary;
use crate::object::ObjectReader;
#[cfg(feature = "dwarf")]
use crate::ErrorKind;

use super::locate::DebugBinaryLocator;
use super::module::Module;
use super::select::ArchSelector;
use super::select::BinaryArena;
use super::select::BinaryId;
use super::symtab::SymbolIndex;
use super::DebugInfoProvider;


/// Split a module identifier into path and architecture.
///
/// An identifier of the form `<path>:<arch>` is split at the last
/// colon, but only if `<arch>` is a known architecture name. Otherwise
/// the full identifier is the path and `default_arch` is used.
pub(crate) fn split_module_id<'id>(
    id: &'id str,
    default_arch: &'id str,
) -> (&'id str, &'id str) {
    if let Some((path, arch)) = id.rsplit_once(':') {
        if Arch::parse(arch).is_some() {
            return (path, arch)
        }
    }
    (id, default_arch)
}


#[cfg(feature = "dwarf")]
fn create_provider(obj: &dyn ObjectReader) -> Option<Box<dyn DebugInfoProvider>> {
    match obj.has_section(".debug_info") {
        Ok(true) => (),
        Ok(false) => {
            debug!("object contains no DWARF debug information");
            return None
        }
        Err(err) => {
            warn!("failed to check for DWARF debug information: {err:#}");
            return None
        }
    }

    match DwarfProvider::new(obj) {
        Ok(provider) => Some(Box::new(provider)),
        Err(err) if err.kind() == ErrorKind::Unsupported => {
            debug!("debug information is unusable: {err:#}");
            None
        }
        Err(err) => {
            warn!("failed to load debug information: {err:#}");
            None
        }
    }
}

#[cfg(not(feature = "dwarf"))]
fn create_provider(_obj: &dyn ObjectReader) -> Option<Box<dyn DebugInfoProvider>> {
    None
}


/// The cache of all modules and the binaries backing them.
#[derive(Debug)]
pub(crate) struct ModuleRegistry {
    /// The architecture used for identifiers not naming one.
    default_arch: String,
    locator: DebugBinaryLocator,
    arena: BinaryArena,
    selector: ArchSelector,
    /// The primary and debug binaries of a path. `None` marks a path
    /// that could not be loaded.
    binaries: HashMap<PathBuf, Option<(BinaryId, BinaryId)>>,
    /// Modules by identifier. `None` marks a permanent failure.
    modules: HashMap<String, Option<Module>>,
}

impl ModuleRegistry {
    pub(crate) fn new(default_arch: String, locator: DebugBinaryLocator) -> Self {
        Self {
            default_arch,
            locator,
            arena: BinaryArena::default(),
            selector: ArchSelector::default(),
            binaries: HashMap::new(),
            modules: HashMap::new(),
        }
    }

    /// Retrieve the module for the identifier `id`, creating it if
    /// necessary.
    ///
    /// Creation is attempted at most once per identifier; failures are
    /// remembered and reported as `None` from then on.
    pub(crate) fn get_or_create(&mut self, id: &str) -> Option<&Module> {
        if !self.modules.contains_key(id) {
            let module = self.create(id);
            let _prev = self.modules.insert(id.to_string(), module);
        }
        self.modules.get(id).and_then(Option::as_ref)
    }

    /// Drop all modules and binaries.
    pub(crate) fn flush(&mut self) {
        let () = self.modules.clear();
        let () = self.binaries.clear();
        self.selector = ArchSelector::default();
        self.arena = BinaryArena::default();
    }

    fn create(&mut self, id: &str) -> Option<Module> {
        let default_arch = self.default_arch.clone();
        let (path, arch) = split_module_id(id, &default_arch);
        let (primary, debug) = self.load_binaries(Path::new(path))?;

        let object = if let Some(object) = self.selector.resolve(&mut self.arena, primary, arch) {
            object
        } else {
            debug!("`{path}` contains no object for architecture `{arch}`");
            return None
        };
        let debug_object = self
            .selector
            .resolve(&mut self.arena, debug, arch)
            .unwrap_or(object);

        let symbols = SymbolIndex::build(self.arena.object(object)?);
        let provider = create_provider(self.arena.object(debug_object)?);

        let module = Module {
            object,
            debug_object,
            symbols,
            provider,
        };
        Some(module)
    }

    fn load_binaries(&mut self, path: &Path) -> Option<(BinaryId, BinaryId)> {
        if let Some(ids) = self.binaries.get(path) {
            return *ids
        }

        let ids = match Binary::open(path) {
            Ok(binary) => {
                let debug = self.locator.locate(path, &binary);
                let primary = self.arena.insert(binary);
                let debug = debug
                    .map(|binary| self.arena.insert(binary))
                    .unwrap_or(primary);
                Some((primary, debug))
            }
            Err(err) => {
                warn!("failed to load `{}`: {err:#}", path.display());
                None
            }
        };

        let _prev = self.binaries.insert(path.to_path_buf(), ids);
        ids
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::ptr;

    use test_log::test;
    use test_tag::tag;

    use crate::symbolize::locate::DEFAULT_DEBUG_DIRS;
    use crate::test_helper::ElfBuilder;
    use crate::test_helper::FatBuilder;
    use crate::test_helper::MachOBuilder;
    use crate::SymType;


    fn new_registry(default_arch: &str) -> ModuleRegistry {
        let dirs = DEFAULT_DEBUG_DIRS.iter().map(PathBuf::from).collect();
        ModuleRegistry::new(default_arch.to_string(), DebugBinaryLocator::new(dirs, true))
    }


    /// Check the splitting of module identifiers.
    #[tag(miri)]
    #[test]
    fn module_id_splitting() {
        assert_eq!(split_module_id("/bin/ls:x86_64", "arm64"), ("/bin/ls", "x86_64"));
        assert_eq!(
            split_module_id("/bin/ls:not-an-arch", "arm64"),
            ("/bin/ls:not-an-arch", "arm64")
        );
        assert_eq!(split_module_id("/bin/ls", "arm64"), ("/bin/ls", "arm64"));
        assert_eq!(split_module_id("/bin/ls:", ""), ("/bin/ls:", ""));
        assert_eq!(
            split_module_id("C:/tools/ls:aarch64", "x86_64"),
            ("C:/tools/ls", "aarch64")
        );
    }

    /// Check that modules are created once and cached.
    #[test]
    fn module_caching() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog");
        let data = ElfBuilder::new().add_func("main", 0x1000, 0x20).build();
        let () = fs::write(&path, data).unwrap();
        let id = path.to_str().unwrap();

        let mut registry = new_registry("x86_64");
        let first = registry.get_or_create(id).unwrap() as *const Module;
        let module = registry.get_or_create(id).unwrap();
        assert!(ptr::eq(first, module));
        assert_eq!(
            module.symbols.lookup(SymType::Function, 0x1010).unwrap().name,
            "main"
        );
        assert!(!module.has_separate_debug_object());

        // A different identifier for the same path shares the binary.
        let _module = registry.get_or_create(&format!("{id}:arm64")).unwrap();
        assert_eq!(registry.modules.len(), 2);
        assert_eq!(registry.binaries.len(), 1);
        assert_eq!(registry.arena.len(), 1);

        // Modules stay around even if the file is gone.
        let () = fs::remove_file(&path).unwrap();
        assert!(registry.get_or_create(id).is_some());

        let () = registry.flush();
        assert!(registry.get_or_create(id).is_none());
    }

    /// Check that failures are remembered.
    #[test]
    fn failure_caching() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog");
        let id = path.to_str().unwrap();

        let mut registry = new_registry("x86_64");
        assert!(registry.get_or_create(id).is_none());

        // Creating the file afterwards does not change the outcome.
        let () = fs::write(&path, ElfBuilder::new().build()).unwrap();
        assert!(registry.get_or_create(id).is_none());
        assert_eq!(registry.modules.len(), 1);
    }

    /// Check that universal binaries are resolved by architecture.
    #[test]
    fn universal_modules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog");
        let data = FatBuilder::new()
            .add(MachOBuilder::new(Arch::X86_64).add_func("_x86", 0x1000).build())
            .add(MachOBuilder::new(Arch::Aarch64).add_func("_arm", 0x1000).build())
            .build();
        let () = fs::write(&path, data).unwrap();
        let id = path.to_str().unwrap();

        let mut registry = new_registry("arm64");
        let module = registry.get_or_create(id).unwrap();
        assert_eq!(
            module.symbols.lookup(SymType::Function, 0x1000).unwrap().name,
            "arm"
        );

        let module = registry.get_or_create(&format!("{id}:x86_64")).unwrap();
        assert_eq!(
            module.symbols.lookup(SymType::Function, 0x1000).unwrap().name,
            "x86"
        );

        assert!(registry.get_or_create(&format!("{id}:ppc")).is_none());

        let mut registry = new_registry("");
        assert!(registry.get_or_create(id).is_none());
    }
}
