#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod args;

use std::io::stderr;
use std::io::stdin;
use std::io::stdout;
use std::io::BufRead as _;
use std::io::Write;

use anyhow::Context;
use anyhow::Result;

use modsym::symbolize::FunctionNameKind;
use modsym::symbolize::Symbolizer;

use clap::Parser as _;

use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::FmtSubscriber;

use crate::args::Query;
use crate::args::QueryKind;


fn symbolizer(args: &args::Args) -> Symbolizer {
    let mut builder = Symbolizer::builder()
        .set_function_names(FunctionNameKind::from(args.functions))
        .enable_inlined_fns(!args.no_inlines)
        .enable_demangling(!args.no_demangle)
        .enable_symbol_table(!args.no_symbol_table)
        .enable_checksum_verification(!args.no_checksum_verification)
        .set_debug_dirs(args.debug_dirs.as_deref());

    if let Some(arch) = &args.default_arch {
        builder = builder.set_default_arch(arch);
    }
    builder.build()
}

/// Answer a single query line, writing the result followed by an empty
/// line. Lines that are not valid queries are echoed back unchanged.
fn answer<W>(symbolizer: &mut Symbolizer, line: &str, out: &mut W) -> Result<()>
where
    W: Write,
{
    let output = match Query::parse(line) {
        Ok(Query {
            kind: QueryKind::Code,
            module,
            offset,
        }) => symbolizer.symbolize_code(&module, offset),
        Ok(Query {
            kind: QueryKind::Data,
            module,
            offset,
        }) => symbolizer.symbolize_data(&module, offset),
        Err(err) => {
            warn!("ignoring invalid query `{line}`: {err:#}");
            format!("{line}\n")
        }
    };

    let () = writeln!(out, "{output}").context("failed to write output")?;
    let () = out.flush().context("failed to flush output")?;
    Ok(())
}


fn main() -> Result<()> {
    let args = args::Args::parse();
    let level = match args.verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_span_events(FmtSpan::FULL)
        .with_timer(SystemTime)
        .with_writer(stderr)
        .finish();

    let () =
        set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")?;

    let mut symbolizer = symbolizer(&args);
    let mut out = stdout().lock();

    if args.queries.is_empty() {
        for line in stdin().lock().lines() {
            let line = line.context("failed to read query from stdin")?;
            let () = answer(&mut symbolizer, &line, &mut out)?;
        }
    } else {
        for line in &args.queries {
            let () = answer(&mut symbolizer, line, &mut out)?;
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Check the output produced for queries.
    #[test]
    fn query_answering() {
        let mut symbolizer = Symbolizer::new();
        let mut out = Vec::new();

        let () = answer(&mut symbolizer, "CODE /does/not/exist 0x10", &mut out).unwrap();
        let () = answer(&mut symbolizer, "DATA /does/not/exist 16", &mut out).unwrap();
        let () = answer(&mut symbolizer, "garbage", &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "??\n??:0:0\n\n??\n0 0\n\ngarbage\n\n"
        );
    }
}
