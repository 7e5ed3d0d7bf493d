use crate::log::warn;
use crate::Addr;
use crate::SymType;

use super::select::BinaryId;
use super::symtab::SymbolIndex;
use super::DebugInfoProvider;
use super::FunctionNameKind;
use super::LineInfo;
use super::SymInfo;


/// Options influencing code lookups on a [`Module`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LookupOpts {
    /// The kind of function names to report.
    pub function_names: FunctionNameKind,
    /// Whether to prefer symbol table names over debug info names for
    /// the physical function.
    pub use_symbol_table: bool,
}

impl Default for LookupOpts {
    fn default() -> Self {
        Self {
            function_names: FunctionNameKind::Linkage,
            use_symbol_table: true,
        }
    }
}


/// A fully resolved module, ready for lookups.
///
/// A module combines the symbol table of its primary object with the
/// debug information of its debug object, which may be the primary
/// object itself.
#[derive(Debug)]
pub struct Module {
    /// The primary object.
    pub(crate) object: BinaryId,
    /// The object providing debug information.
    pub(crate) debug_object: BinaryId,
    /// The symbols of the primary object.
    pub(crate) symbols: SymbolIndex,
    /// The debug info provider, if debug information could be loaded.
    pub(crate) provider: Option<Box<dyn DebugInfoProvider>>,
}

impl Module {
    /// Check whether debug information comes from a file other than
    /// the module's primary object.
    pub fn has_separate_debug_object(&self) -> bool {
        self.object != self.debug_object
    }

    /// Check whether debug information is available for the module.
    pub fn has_debug_info(&self) -> bool {
        self.provider.is_some()
    }

    fn override_name(&self, info: &mut LineInfo, offset: Addr, opts: &LookupOpts) {
        if opts.function_names != FunctionNameKind::None && opts.use_symbol_table {
            if let Some(sym) = self.symbols.lookup(SymType::Function, offset) {
                info.function_name = Some(sym.name);
            }
        }
    }

    /// Look up the line information for `offset`.
    ///
    /// If function names are requested and the symbol table is enabled,
    /// a symbol covering `offset` overrides the function name reported
    /// by the debug information.
    pub fn symbolize_code(&self, offset: Addr, opts: &LookupOpts) -> LineInfo {
        let info = match &self.provider {
            Some(provider) => provider
                .find_line(offset, opts.function_names)
                .unwrap_or_else(|err| {
                    warn!("failed to look up line information for {offset:#x}: {err:#}");
                    LineInfo::default()
                }),
            None => LineInfo::default(),
        };

        let mut info = info.sanitize();
        let () = self.override_name(&mut info, offset, opts);
        info
    }

    /// Look up the inlining chain for `offset`, innermost frame first.
    ///
    /// The returned chain is never empty. Only the last (physical)
    /// frame is eligible for the symbol table override.
    pub fn symbolize_inlined_code(&self, offset: Addr, opts: &LookupOpts) -> Vec<LineInfo> {
        let frames = match &self.provider {
            Some(provider) => provider
                .find_frames(offset, opts.function_names)
                .unwrap_or_else(|err| {
                    warn!("failed to look up inlined frames for {offset:#x}: {err:#}");
                    Vec::new()
                }),
            None => Vec::new(),
        };

        let mut frames = frames.into_iter().map(LineInfo::sanitize).collect::<Vec<_>>();
        if frames.is_empty() {
            let () = frames.push(LineInfo::default());
        }

        if let Some(last) = frames.last_mut() {
            let () = self.override_name(last, offset, opts);
        }
        frames
    }

    /// Look up the variable covering `offset`.
    pub fn symbolize_data(&self, offset: Addr) -> Option<SymInfo> {
        self.symbols.lookup(SymType::Variable, offset)
    }
}
