use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context as _;
use anyhow::Result;

use modsym::symbolize::FunctionNameKind;
use modsym::Addr;

use clap::ArgAction;
use clap::Parser;
use clap::ValueEnum;


/// Parse an offset from a string.
///
/// Offsets are decimal, unless prefixed with `0x`.
pub fn parse_offset(s: &str) -> Result<Addr> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Addr::from_str_radix(hex, 16)
    } else {
        s.parse::<Addr>()
    }
    .with_context(|| format!("failed to parse offset: {s}"))
}


/// The kind of a query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryKind {
    Code,
    Data,
}


/// A single symbolization query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Query {
    pub kind: QueryKind,
    pub module: String,
    pub offset: Addr,
}

impl Query {
    /// Parse a query of the form `[CODE|DATA] <module> <offset>`.
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let mut token = tokens.next();
        let kind = match token {
            Some("DATA") => {
                token = tokens.next();
                QueryKind::Data
            }
            Some("CODE") => {
                token = tokens.next();
                QueryKind::Code
            }
            _ => QueryKind::Code,
        };

        let module = token.context("query lacks a module")?;
        let offset = tokens.next().context("query lacks an offset")?;
        let offset = parse_offset(offset)?;
        if let Some(extra) = tokens.next() {
            bail!("query contains unexpected trailing input: {extra}")
        }

        let query = Self {
            kind,
            module: module.to_string(),
            offset,
        };
        Ok(query)
    }
}


/// The function names to report.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Functions {
    /// Do not report function names.
    None,
    /// Report short function names.
    Short,
    /// Report linkage names.
    Linkage,
}

impl From<Functions> for FunctionNameKind {
    fn from(other: Functions) -> Self {
        match other {
            Functions::None => Self::None,
            Functions::Short => Self::Short,
            Functions::Linkage => Self::Linkage,
        }
    }
}


/// A command line interface for modsym.
///
/// Queries have the form `[CODE|DATA] <module> <offset>`, where
/// `<module>` is a path optionally followed by `:<arch>` and `<offset>`
/// is decimal or `0x` prefixed hexadecimal. If no queries are provided
/// as arguments, they are read from standard input, one per line.
#[derive(Debug, Parser)]
#[clap(version = env!("VERSION"))]
pub struct Args {
    /// The queries to answer.
    pub queries: Vec<String>,
    /// The function names to report.
    #[clap(long, value_enum, default_value_t = Functions::Linkage)]
    pub functions: Functions,
    /// Report the innermost function only, instead of the full chain of
    /// inlined functions.
    #[clap(long)]
    pub no_inlines: bool,
    /// Do not demangle function and variable names.
    #[clap(long)]
    pub no_demangle: bool,
    /// Do not use symbol tables.
    #[clap(long)]
    pub no_symbol_table: bool,
    /// The architecture to use for modules not naming one.
    #[clap(long)]
    pub default_arch: Option<String>,
    /// Comma-separated list of debug directories to search when
    /// resolving debug links.
    #[clap(long, value_parser, value_delimiter = ',')]
    pub debug_dirs: Option<Vec<PathBuf>>,
    /// Accept debug link targets without verifying their checksum.
    #[clap(long)]
    pub no_checksum_verification: bool,
    /// Increase verbosity (can be supplied multiple times).
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbosity: u8,
}
