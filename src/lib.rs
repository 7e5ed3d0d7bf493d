//! **modsym** is a library that resolves `(module, offset)` pairs into
//! function names, source locations, and inlining chains.
//!
//! ```no_run
//! use modsym::symbolize::Symbolizer;
//!
//! let mut symbolizer = Symbolizer::new();
//! let text = symbolizer.symbolize_code("/usr/bin/example:x86_64", 0x1234);
//! print!("{text}");
//! ```
//!
//! Please refer to the [`symbolize`] module for the details.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod arch;
#[cfg(feature = "dwarf")]
mod dwarf;
mod elf;
mod error;
mod macho;
mod mmap;
mod object;
pub mod symbolize;
#[cfg(any(test, feature = "test"))]
mod test_helper;
mod util;

pub use crate::arch::Arch;
pub use crate::error::Error;
pub use crate::error::ErrorExt;
pub use crate::error::ErrorKind;
pub use crate::error::IntoCowStr;
use crate::error::IntoError;
pub use crate::symbolize::SymType;

/// A type representing addresses.
pub type Addr = u64;

/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;


/// Functionality only exposed for testing and benchmarking purposes.
#[cfg(feature = "test")]
#[doc(hidden)]
pub mod __private {
    pub use crate::test_helper::crc32;
    pub use crate::test_helper::debug_link_section;
    pub use crate::test_helper::DwarfBuilder;
    pub use crate::test_helper::ElfBuilder;
    pub use crate::test_helper::FatBuilder;
    pub use crate::test_helper::MachOBuilder;
}


#[cfg(feature = "tracing")]
#[macro_use]
#[allow(unused_imports)]
mod log {
    pub(crate) use tracing::debug;
    pub(crate) use tracing::error;
    pub(crate) use tracing::info;
    pub(crate) use tracing::instrument;
    pub(crate) use tracing::trace;
    pub(crate) use tracing::warn;
}

#[cfg(not(feature = "tracing"))]
#[macro_use]
#[allow(unused_imports)]
mod log {
    macro_rules! debug {
        ($($args:tt)*) => {{
          if false {
            // Make sure to use `args` to prevent any warnings about
            // unused variables.
            let _args = format_args!($($args)*);
          }
        }};
    }
    pub(crate) use debug;
    pub(crate) use debug as error;
    pub(crate) use debug as info;
    pub(crate) use debug as trace;
    pub(crate) use debug as warn;
}
