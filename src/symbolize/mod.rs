//! Functionality for symbolizing module offsets.
//!
//! The entry point is the [`Symbolizer`]. It maps a module identifier
//! (a path, optionally followed by `:<arch>`) to a lazily created
//! [`Module`] and answers code and data queries against it:
//! ```no_run
//! use modsym::symbolize::FunctionNameKind;
//! use modsym::symbolize::Symbolizer;
//!
//! let mut symbolizer = Symbolizer::builder()
//!     .set_function_names(FunctionNameKind::Linkage)
//!     .enable_inlined_fns(true)
//!     .build();
//!
//! // Every frame is reported as `function\nfile:line:column\n`.
//! print!("{}", symbolizer.symbolize_code("/usr/lib/libfoo.so", 0x4a2f));
//! // Data symbols are reported as `name\nstart size\n`.
//! print!("{}", symbolizer.symbolize_data("/usr/lib/libfoo.so", 0x8010));
//! ```
//!
//! Debug information is looked up in the module itself or in a
//! separate debug file, found next to a Mach-O binary as a `.dSYM`
//! bundle or referenced by a `.gnu_debuglink` section.

mod demangle;
mod locate;
mod module;
mod registry;
mod select;
mod symbolizer;
mod symtab;

use std::fmt::Debug;

pub use module::LookupOpts;
pub use module::Module;
pub use symbolizer::Builder;
pub use symbolizer::Symbolizer;

pub(crate) use locate::crc32;

use crate::Addr;
use crate::Result;


/// The string the debug info layer uses for names or files it could
/// not determine.
pub(crate) const INVALID_NAME: &str = "<invalid>";

/// The string we print in place of unknown names or files.
pub(crate) const UNKNOWN: &str = "??";


/// The type of a symbol.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SymType {
    /// The symbol is a function.
    Function,
    /// The symbol is a variable, i.e., a data object.
    Variable,
}


/// The kind of function name to report.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum FunctionNameKind {
    /// Do not report function names at all.
    None,
    /// Report the short (unqualified) name of a function, as recorded
    /// in `DW_AT_name`.
    Short,
    /// Report the linkage (possibly mangled) name of a function.
    #[default]
    Linkage,
}


/// Source location information for an address.
///
/// An inlining chain is represented as a list of `LineInfo` objects,
/// innermost frame first and the outermost (physical, non-inlined)
/// function last.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineInfo {
    /// The name of the function, if known.
    pub function_name: Option<String>,
    /// The source file, if known.
    pub file_name: Option<String>,
    /// The line number, or 0 if unknown.
    pub line: u32,
    /// The column number, or 0 if unknown.
    pub column: u32,
}

impl LineInfo {
    /// Replace the debug info layer's "invalid" markers with `None`.
    pub(crate) fn sanitize(mut self) -> Self {
        if self.function_name.as_deref() == Some(INVALID_NAME) {
            self.function_name = None;
        }
        if self.file_name.as_deref() == Some(INVALID_NAME) {
            self.file_name = None;
        }
        self
    }
}


/// Information about a symbol found in a symbol table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymInfo {
    /// The symbol's name.
    pub name: String,
    /// The symbol's start address.
    pub addr: Addr,
    /// The symbol's size, or 0 if unknown.
    pub size: u64,
}


/// A source of line and inlining information.
///
/// Implementations report addresses they know nothing about as an
/// unknown record (for [`find_line`][Self::find_line]) or an empty
/// chain (for [`find_frames`][Self::find_frames]); errors are
/// reserved for corrupt input.
pub trait DebugInfoProvider: Debug {
    /// Find the line information for `addr`.
    fn find_line(&self, addr: Addr, names: FunctionNameKind) -> Result<LineInfo>;

    /// Find the full inlining chain for `addr`, innermost frame first.
    fn find_frames(&self, addr: Addr, names: FunctionNameKind) -> Result<Vec<LineInfo>>;
}
