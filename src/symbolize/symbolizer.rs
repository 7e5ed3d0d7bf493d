use std::path::Path;
use std::path::PathBuf;

use crate::arch::Arch;
use crate::Addr;

use super::demangle::demangle;
use super::locate::DebugBinaryLocator;
use super::locate::DEFAULT_DEBUG_DIRS;
use super::module::LookupOpts;
use super::module::Module;
use super::registry::ModuleRegistry;
use super::FunctionNameKind;
use super::LineInfo;
use super::SymInfo;
use super::UNKNOWN;


fn default_debug_dirs() -> Vec<PathBuf> {
    DEFAULT_DEBUG_DIRS.iter().map(PathBuf::from).collect()
}


/// Render frames as `function\nfile:line:column\n` blocks.
fn format_frames(frames: &[LineInfo], names: FunctionNameKind) -> String {
    let mut output = String::new();
    for frame in frames {
        if names != FunctionNameKind::None {
            let name = frame.function_name.as_deref().unwrap_or(UNKNOWN);
            let () = output.push_str(name);
            let () = output.push('\n');
        }

        let file = frame.file_name.as_deref().unwrap_or(UNKNOWN);
        let () = output.push_str(&format!("{file}:{}:{}\n", frame.line, frame.column));
    }
    output
}


/// Render a data symbol as `name\nstart size\n`.
fn format_data(sym: Option<&SymInfo>) -> String {
    match sym {
        Some(sym) => format!("{}\n{} {}\n", sym.name, sym.addr, sym.size),
        None => format!("{UNKNOWN}\n0 0\n"),
    }
}


/// A builder for configurable construction of [`Symbolizer`] objects.
///
/// By default all features are enabled.
#[derive(Clone, Debug)]
pub struct Builder {
    /// See [`Builder::enable_symbol_table`].
    symbol_table: bool,
    /// See [`Builder::enable_demangling`].
    demangle: bool,
    /// See [`Builder::set_function_names`].
    function_names: FunctionNameKind,
    /// See [`Builder::enable_inlined_fns`].
    inlined_fns: bool,
    /// See [`Builder::set_default_arch`].
    default_arch: String,
    /// See [`Builder::set_debug_dirs`].
    debug_dirs: Vec<PathBuf>,
    /// See [`Builder::enable_checksum_verification`].
    verify_checksum: bool,
}

impl Builder {
    /// Enable/disable the usage of symbol tables.
    ///
    /// When enabled, symbol table names take precedence over debug
    /// information names for physical functions. Data lookups require
    /// the symbol table and report nothing when it is disabled.
    pub fn enable_symbol_table(mut self, enable: bool) -> Builder {
        self.symbol_table = enable;
        self
    }

    /// Enable/disable the demangling of function and variable names.
    ///
    /// Demangling only happens if the `demangle` feature is enabled.
    pub fn enable_demangling(mut self, enable: bool) -> Builder {
        self.demangle = enable;
        self
    }

    /// Set the kind of function names to report.
    ///
    /// With [`FunctionNameKind::None`] the function name line is
    /// omitted from code output altogether.
    pub fn set_function_names(mut self, kind: FunctionNameKind) -> Builder {
        self.function_names = kind;
        self
    }

    /// Enable/disable the reporting of inlined functions.
    ///
    /// When enabled, code lookups report the full inlining chain, with
    /// the innermost frame first.
    pub fn enable_inlined_fns(mut self, enable: bool) -> Builder {
        self.inlined_fns = enable;
        self
    }

    /// Set the architecture to use for module identifiers that don't
    /// name one.
    ///
    /// This defaults to the architecture of the host.
    pub fn set_default_arch(mut self, arch: impl Into<String>) -> Builder {
        self.default_arch = arch.into();
        self
    }

    /// Set the global directories to search for debug link targets.
    ///
    /// `None` restores the default of `/usr/lib/debug`.
    pub fn set_debug_dirs<D, P>(mut self, debug_dirs: Option<D>) -> Builder
    where
        D: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.debug_dirs = debug_dirs
            .map(|dirs| {
                dirs.into_iter()
                    .map(|dir| dir.as_ref().to_path_buf())
                    .collect()
            })
            .unwrap_or_else(default_debug_dirs);
        self
    }

    /// Enable/disable verification of debug link targets against the
    /// checksum recorded in the debug link.
    ///
    /// With verification disabled the first existing candidate file is
    /// used, even if it belongs to a different build.
    pub fn enable_checksum_verification(mut self, enable: bool) -> Builder {
        self.verify_checksum = enable;
        self
    }

    /// Create the [`Symbolizer`] object.
    pub fn build(self) -> Symbolizer {
        let Builder {
            symbol_table,
            demangle,
            function_names,
            inlined_fns,
            default_arch,
            debug_dirs,
            verify_checksum,
        } = self;

        let locator = DebugBinaryLocator::new(debug_dirs, verify_checksum);
        Symbolizer {
            symbol_table,
            demangle,
            function_names,
            inlined_fns,
            registry: ModuleRegistry::new(default_arch, locator),
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            symbol_table: true,
            demangle: true,
            function_names: FunctionNameKind::Linkage,
            inlined_fns: true,
            default_arch: Arch::host()
                .map(|arch| arch.name().to_string())
                .unwrap_or_default(),
            debug_dirs: default_debug_dirs(),
            verify_checksum: true,
        }
    }
}


/// Symbolizer provides an interface to symbolize module offsets.
///
/// Modules are identified by their path, optionally suffixed with
/// `:<arch>` to select an object out of a universal binary. A
/// `Symbolizer` caches every module it has seen, including the ones
/// that failed to load, until [`flush`][Symbolizer::flush] is called.
#[derive(Debug)]
pub struct Symbolizer {
    symbol_table: bool,
    demangle: bool,
    function_names: FunctionNameKind,
    inlined_fns: bool,
    registry: ModuleRegistry,
}

impl Symbolizer {
    /// Create a new [`Symbolizer`].
    ///
    /// This method is just a short hand for instantiating a `Symbolizer`
    /// from the default [`Builder`].
    #[inline]
    pub fn new() -> Self {
        Builder::default().build()
    }

    /// Retrieve a [`Builder`] object for configurable construction of a
    /// [`Symbolizer`].
    #[inline]
    pub fn builder() -> Builder {
        Builder::default()
    }

    fn lookup_opts(&self) -> LookupOpts {
        LookupOpts {
            function_names: self.function_names,
            use_symbol_table: self.symbol_table,
        }
    }

    /// Retrieve the module with the given identifier, loading it if
    /// necessary.
    pub fn module(&mut self, module_id: &str) -> Option<&Module> {
        self.registry.get_or_create(module_id)
    }

    /// Symbolize a code offset, reporting structured frames.
    ///
    /// The result is never empty. If inlined function reporting is
    /// enabled it contains the full inlining chain, innermost frame
    /// first. Unknown modules and offsets result in a single unknown
    /// frame.
    #[cfg_attr(feature = "tracing", crate::log::instrument(skip(self)))]
    pub fn code_frames(&mut self, module_id: &str, offset: Addr) -> Vec<LineInfo> {
        let opts = self.lookup_opts();
        let mut frames = match self.registry.get_or_create(module_id) {
            Some(module) if self.inlined_fns => module.symbolize_inlined_code(offset, &opts),
            Some(module) => vec![module.symbolize_code(offset, &opts)],
            None => vec![LineInfo::default()],
        };

        if self.demangle {
            let () = frames
                .iter_mut()
                .filter_map(|frame| frame.function_name.as_mut())
                .for_each(|name| *name = demangle(name).into_owned());
        }
        frames
    }

    /// Symbolize a data offset, reporting the covering variable.
    ///
    /// Returns `None` if no variable covers `offset` or the symbol table
    /// is disabled.
    #[cfg_attr(feature = "tracing", crate::log::instrument(skip(self)))]
    pub fn data_info(&mut self, module_id: &str, offset: Addr) -> Option<SymInfo> {
        if !self.symbol_table {
            return None
        }

        let mut sym = self.registry.get_or_create(module_id)?.symbolize_data(offset)?;
        if self.demangle {
            sym.name = demangle(&sym.name).into_owned();
        }
        Some(sym)
    }

    /// Symbolize a code offset.
    ///
    /// Every frame is rendered as `function\nfile:line:column\n`, with
    /// the function line omitted if function names are disabled.
    /// Unknown names and files are rendered as `??`.
    pub fn symbolize_code(&mut self, module_id: &str, offset: Addr) -> String {
        let frames = self.code_frames(module_id, offset);
        format_frames(&frames, self.function_names)
    }

    /// Symbolize a data offset.
    ///
    /// The result is rendered as `name\nstart size\n`, in decimal, or
    /// as `??\n0 0\n` if nothing is known.
    pub fn symbolize_data(&mut self, module_id: &str, offset: Addr) -> String {
        let sym = self.data_info(module_id, offset);
        format_data(sym.as_ref())
    }

    /// Drop all cached modules and binaries.
    pub fn flush(&mut self) {
        let () = self.registry.flush();
    }
}

impl Default for Symbolizer {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;
    use test_log::test;
    use test_tag::tag;

    use crate::test_helper::ElfBuilder;


    /// Write an ELF file with a few symbols into a temporary directory.
    fn write_elf() -> (TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog");
        let data = ElfBuilder::new()
            .add_func("foo", 0x1000, 0x10)
            .add_func("_Z3bari", 0x1010, 0x10)
            .add_var("g_counter", 0x2000, 4)
            .build();
        let () = fs::write(&path, data).unwrap();
        let id = path.to_str().unwrap().to_string();
        (dir, id)
    }


    /// Exercise the `Debug` representation of various types.
    #[tag(miri)]
    #[test]
    fn debug_repr() {
        let builder = Symbolizer::builder();
        assert_ne!(format!("{builder:?}"), "");

        let symbolizer = builder.build();
        assert_ne!(format!("{symbolizer:?}"), "");
    }

    /// Check the rendering of code frames.
    #[tag(miri)]
    #[test]
    fn frame_formatting() {
        let frames = [
            LineInfo {
                function_name: Some("inner".to_string()),
                file_name: Some("/src/a.h".to_string()),
                line: 3,
                column: 7,
            },
            LineInfo::default(),
        ];

        let output = format_frames(&frames, FunctionNameKind::Linkage);
        assert_eq!(output, "inner\n/src/a.h:3:7\n??\n??:0:0\n");

        let output = format_frames(&frames, FunctionNameKind::None);
        assert_eq!(output, "/src/a.h:3:7\n??:0:0\n");
    }

    /// Check the rendering of data symbols.
    #[tag(miri)]
    #[test]
    fn data_formatting() {
        let sym = SymInfo {
            name: "g_counter".to_string(),
            addr: 0x2000,
            size: 4,
        };
        assert_eq!(format_data(Some(&sym)), "g_counter\n8192 4\n");
        assert_eq!(format_data(None), "??\n0 0\n");
    }

    /// Make sure that `set_debug_dirs(None)` restores the defaults.
    #[tag(miri)]
    #[test]
    fn debug_dir_configuration() {
        let builder = Symbolizer::builder().set_debug_dirs(Some(["/tmp/debug"]));
        assert_eq!(builder.debug_dirs, vec![PathBuf::from("/tmp/debug")]);

        let builder = builder.set_debug_dirs(None::<[&str; 0]>);
        assert_eq!(builder.debug_dirs, default_debug_dirs());
    }

    /// Check symbolization based on symbol tables alone.
    #[test]
    fn symbol_table_symbolization() {
        let (_dir, id) = write_elf();
        let mut symbolizer = Symbolizer::new();

        assert_eq!(symbolizer.symbolize_code(&id, 0x1005), "foo\n??:0:0\n");
        assert_eq!(symbolizer.symbolize_code(&id, 0x2000), "??\n??:0:0\n");
        assert_eq!(
            symbolizer.symbolize_data(&id, 0x2002),
            "g_counter\n8192 4\n"
        );
        assert_eq!(symbolizer.symbolize_data(&id, 0x3000), "??\n0 0\n");
        assert!(symbolizer.module(&id).is_some());
    }

    /// Check that configuration knobs are honored.
    #[test]
    fn configuration() {
        let (_dir, id) = write_elf();

        let mut symbolizer = Symbolizer::builder()
            .set_function_names(FunctionNameKind::None)
            .build();
        assert_eq!(symbolizer.symbolize_code(&id, 0x1005), "??:0:0\n");

        let mut symbolizer = Symbolizer::builder().enable_symbol_table(false).build();
        assert_eq!(symbolizer.symbolize_code(&id, 0x1005), "??\n??:0:0\n");
        assert_eq!(symbolizer.symbolize_data(&id, 0x2002), "??\n0 0\n");

        let mut symbolizer = Symbolizer::builder().enable_inlined_fns(false).build();
        assert_eq!(symbolizer.code_frames(&id, 0x1005).len(), 1);

        let mut symbolizer = Symbolizer::builder().enable_demangling(false).build();
        assert_eq!(symbolizer.symbolize_code(&id, 0x1015), "_Z3bari\n??:0:0\n");
    }

    /// Check that names are demangled.
    #[cfg(feature = "demangle")]
    #[test]
    fn demangled_names() {
        let (_dir, id) = write_elf();
        let mut symbolizer = Symbolizer::new();
        assert_eq!(symbolizer.symbolize_code(&id, 0x1015), "bar(int)\n??:0:0\n");
    }

    /// Unknown modules result in unknown output.
    #[test]
    fn unknown_module() {
        let mut symbolizer = Symbolizer::new();
        let id = "/does/not/exist";
        assert_eq!(symbolizer.symbolize_code(id, 0x1000), "??\n??:0:0\n");
        assert_eq!(symbolizer.symbolize_data(id, 0x1000), "??\n0 0\n");
        assert_eq!(symbolizer.code_frames(id, 0x1000), vec![LineInfo::default()]);
        assert!(symbolizer.module(id).is_none());
    }

    /// Check that flushing makes us pick up changed files.
    #[test]
    fn flushing() {
        let (dir, id) = write_elf();
        let mut symbolizer = Symbolizer::new();
        assert_eq!(symbolizer.symbolize_code(&id, 0x1005), "foo\n??:0:0\n");

        let data = ElfBuilder::new().add_func("baz", 0x1000, 0x10).build();
        let () = fs::write(dir.path().join("prog2"), data).unwrap();
        let () = fs::rename(dir.path().join("prog2"), &id).unwrap();

        assert_eq!(symbolizer.symbolize_code(&id, 0x1005), "foo\n??:0:0\n");
        let () = symbolizer.flush();
        assert_eq!(symbolizer.symbolize_code(&id, 0x1005), "baz\n??:0:0\n");
    }
}
