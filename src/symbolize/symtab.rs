use std::collections::BTreeMap;

use crate::log::debug;
use crate::log::warn;
use crate::object::Format;
use crate::object::ObjectReader;
use crate::object::SymTable;
use crate::Addr;
use crate::SymType;

use super::SymInfo;


/// The key under which a symbol is stored.
///
/// Symbols are ordered by address first and size second.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct SymbolDesc {
    addr: Addr,
    /// The symbol's size; 0 if unknown.
    size: u64,
}


/// An address-ordered index over the function and variable symbols of
/// an object file.
#[derive(Debug, Default)]
pub(crate) struct SymbolIndex {
    functions: BTreeMap<SymbolDesc, String>,
    variables: BTreeMap<SymbolDesc, String>,
}

impl SymbolIndex {
    /// Build the index from the symbols of `obj`.
    ///
    /// The static symbol table is used if it contains any entries.
    /// Otherwise the dynamic one is consulted, if the format has one.
    /// Malformed symbols are skipped.
    pub(crate) fn build(obj: &dyn ObjectReader) -> Self {
        let mut index = Self::default();
        let count = index.add_table(obj, SymTable::Static);
        if count == 0 {
            let _count = index.add_table(obj, SymTable::Dynamic);
        }

        debug!(
            "indexed {} function and {} variable symbols",
            index.functions.len(),
            index.variables.len()
        );
        index
    }

    /// Add the symbols of the given table, returning the number of
    /// entries the table contained.
    fn add_table(&mut self, obj: &dyn ObjectReader, table: SymTable) -> usize {
        let syms = match obj.symbols(table) {
            Ok(Some(syms)) => syms,
            Ok(None) => return 0,
            Err(err) => {
                warn!("failed to read {table:?} symbol table: {err}");
                return 0
            }
        };

        let strip_underscore = obj.format() == Format::MachO;
        let mut count = 0;

        for result in syms {
            count += 1;

            let sym = match result {
                Ok(sym) => sym,
                Err(err) => {
                    warn!("skipping malformed symbol: {err}");
                    continue
                }
            };

            let (addr, sym_type) = match (sym.addr, sym.sym_type) {
                (Some(addr), Some(sym_type)) => (addr, sym_type),
                _ => continue,
            };

            let name = if strip_underscore {
                sym.name.strip_prefix('_').unwrap_or(sym.name)
            } else {
                sym.name
            };

            let desc = SymbolDesc {
                addr,
                size: sym.size.unwrap_or(0),
            };
            let map = match sym_type {
                SymType::Function => &mut self.functions,
                SymType::Variable => &mut self.variables,
            };
            // The first symbol seen for a given address and size wins.
            let _name = map.entry(desc).or_insert_with(|| name.to_string());
        }
        count
    }

    /// Create an index from `(name, addr, size)` triples.
    #[cfg(test)]
    pub(crate) fn with_symbols(
        functions: &[(&str, Addr, u64)],
        variables: &[(&str, Addr, u64)],
    ) -> Self {
        let map = |syms: &[(&str, Addr, u64)]| {
            syms.iter()
                .map(|(name, addr, size)| {
                    let desc = SymbolDesc {
                        addr: *addr,
                        size: *size,
                    };
                    (desc, name.to_string())
                })
                .collect()
        };
        Self {
            functions: map(functions),
            variables: map(variables),
        }
    }

    /// Find the symbol of the given type covering `addr`.
    ///
    /// Candidate is the symbol with the largest start address not
    /// greater than `addr` (and, among those, the largest size). It
    /// covers `addr` if its size is zero or `addr` lies before its end.
    ///
    /// The search key uses the maximum size, so that every symbol
    /// starting at `addr` is a candidate regardless of its size. A key
    /// of `(addr, addr)` would miss symbols whose size exceeds their
    /// start address, such as a sized symbol at offset zero queried at
    /// zero.
    pub(crate) fn lookup(&self, sym_type: SymType, addr: Addr) -> Option<SymInfo> {
        let map = match sym_type {
            SymType::Function => &self.functions,
            SymType::Variable => &self.variables,
        };

        let query = SymbolDesc {
            addr,
            size: u64::MAX,
        };
        let (desc, name) = map.range(..=query).next_back()?;
        if desc.size != 0 && addr - desc.addr >= desc.size {
            return None
        }

        Some(SymInfo {
            name: name.clone(),
            addr: desc.addr,
            size: desc.size,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::borrow::Cow;

    use rand::Rng as _;
    use test_log::test;
    use test_tag::tag;

    use crate::arch::Arch;
    use crate::object::ObjSym;
    use crate::object::SymIter;
    use crate::Error;
    use crate::Result;


    /// A fake object file serving symbols from memory.
    #[derive(Debug, Default)]
    struct FakeObject {
        format: Option<Format>,
        static_syms: Vec<(String, Addr, Option<u64>, SymType)>,
        dynamic_syms: Option<Vec<(String, Addr, Option<u64>, SymType)>>,
        broken_static: bool,
    }

    impl FakeObject {
        fn iter<'obj>(
            syms: &'obj [(String, Addr, Option<u64>, SymType)],
            broken: bool,
        ) -> SymIter<'obj> {
            let iter = syms.iter().map(|(name, addr, size, sym_type)| {
                Ok(ObjSym {
                    name: name.as_str(),
                    addr: Some(*addr),
                    size: *size,
                    sym_type: Some(*sym_type),
                })
            });
            let broken = broken.then(|| Err(Error::with_invalid_data("broken symbol")));
            Box::new(broken.into_iter().chain(iter))
        }
    }

    impl ObjectReader for FakeObject {
        fn format(&self) -> Format {
            self.format.unwrap_or(Format::Elf)
        }

        fn arch(&self) -> Option<Arch> {
            None
        }

        fn is_little_endian(&self) -> bool {
            true
        }

        fn section_data(&self, _name: &str) -> Result<Option<Cow<'_, [u8]>>> {
            Ok(None)
        }

        fn has_section(&self, _name: &str) -> Result<bool> {
            Ok(false)
        }

        fn symbols(&self, table: SymTable) -> Result<Option<SymIter<'_>>> {
            match table {
                SymTable::Static => Ok(Some(Self::iter(&self.static_syms, self.broken_static))),
                SymTable::Dynamic => Ok(self
                    .dynamic_syms
                    .as_deref()
                    .map(|syms| Self::iter(syms, false))),
            }
        }
    }

    fn func(name: &str, addr: Addr, size: Option<u64>) -> (String, Addr, Option<u64>, SymType) {
        (name.to_string(), addr, size, SymType::Function)
    }

    fn var(name: &str, addr: Addr, size: Option<u64>) -> (String, Addr, Option<u64>, SymType) {
        (name.to_string(), addr, size, SymType::Variable)
    }


    /// Check basic function and variable lookups.
    #[tag(miri)]
    #[test]
    fn lookup() {
        let obj = FakeObject {
            static_syms: vec![
                func("foo", 0x1000, Some(0x10)),
                func("bar", 0x1010, Some(0x20)),
                var("g_counter", 0x2000, Some(4)),
            ],
            ..Default::default()
        };
        let index = SymbolIndex::build(&obj);

        let sym = index.lookup(SymType::Function, 0x1000).unwrap();
        assert_eq!(sym.name, "foo");
        let sym = index.lookup(SymType::Function, 0x100f).unwrap();
        assert_eq!(sym.name, "foo");
        let sym = index.lookup(SymType::Function, 0x1010).unwrap();
        assert_eq!(sym.name, "bar");
        assert_eq!(sym.addr, 0x1010);
        assert_eq!(sym.size, 0x20);
        assert_eq!(index.lookup(SymType::Function, 0x1030), None);
        assert_eq!(index.lookup(SymType::Function, 0xfff), None);

        let sym = index.lookup(SymType::Variable, 0x2002).unwrap();
        assert_eq!(sym.name, "g_counter");
        assert_eq!(index.lookup(SymType::Variable, 0x1000), None);
        assert_eq!(index.lookup(SymType::Variable, 0x2004), None);
    }

    /// Symbols of unknown size cover everything up to the next symbol.
    #[tag(miri)]
    #[test]
    fn zero_size_symbols() {
        let obj = FakeObject {
            static_syms: vec![func("start", 0x1000, None), func("end", 0x5000, Some(0))],
            ..Default::default()
        };
        let index = SymbolIndex::build(&obj);

        let sym = index.lookup(SymType::Function, 0x4fff).unwrap();
        assert_eq!(sym.name, "start");
        assert_eq!(sym.size, 0);
        let sym = index.lookup(SymType::Function, u64::MAX).unwrap();
        assert_eq!(sym.name, "end");
    }

    /// Among symbols starting at the same address the largest one is
    /// reported, and duplicates keep their first name.
    #[tag(miri)]
    #[test]
    fn same_address_symbols() {
        let obj = FakeObject {
            static_syms: vec![
                func("small", 0x1000, Some(0x4)),
                func("large", 0x1000, Some(0x40)),
                func("alias", 0x1000, Some(0x40)),
            ],
            ..Default::default()
        };
        let index = SymbolIndex::build(&obj);

        let sym = index.lookup(SymType::Function, 0x1002).unwrap();
        assert_eq!(sym.name, "large");
        let sym = index.lookup(SymType::Function, 0x1020).unwrap();
        assert_eq!(sym.name, "large");
    }

    /// Check that a sized symbol at offset zero is found at its very
    /// start.
    #[tag(miri)]
    #[test]
    fn symbol_at_zero() {
        let index = SymbolIndex::with_symbols(&[("start", 0, 0x10)], &[]);
        let sym = index.lookup(SymType::Function, 0).unwrap();
        assert_eq!((sym.name.as_str(), sym.addr, sym.size), ("start", 0, 0x10));
        assert_eq!(index.lookup(SymType::Function, 0x10), None);
    }

    /// Make sure that the dynamic symbol table is only used as a
    /// fallback.
    #[tag(miri)]
    #[test]
    fn dynamic_fallback() {
        let obj = FakeObject {
            static_syms: Vec::new(),
            dynamic_syms: Some(vec![func("dyn", 0x1000, Some(0x10))]),
            ..Default::default()
        };
        let index = SymbolIndex::build(&obj);
        assert_eq!(index.lookup(SymType::Function, 0x1000).unwrap().name, "dyn");

        let obj = FakeObject {
            static_syms: vec![func("static", 0x2000, Some(0x10))],
            dynamic_syms: Some(vec![func("dyn", 0x1000, Some(0x10))]),
            ..Default::default()
        };
        let index = SymbolIndex::build(&obj);
        assert_eq!(index.lookup(SymType::Function, 0x1000), None);
        assert_eq!(index.lookup(SymType::Function, 0x2000).unwrap().name, "static");
    }

    /// Malformed symbols are skipped, but still count as table entries.
    #[tag(miri)]
    #[test]
    fn malformed_symbols() {
        let obj = FakeObject {
            static_syms: vec![func("ok", 0x1000, Some(0x10))],
            dynamic_syms: Some(vec![func("dyn", 0x3000, Some(0x10))]),
            broken_static: true,
            ..Default::default()
        };
        let index = SymbolIndex::build(&obj);
        assert_eq!(index.lookup(SymType::Function, 0x1000).unwrap().name, "ok");
        assert_eq!(index.lookup(SymType::Function, 0x3000), None);
    }

    /// Mach-O symbol names lose their leading underscore.
    #[tag(miri)]
    #[test]
    fn macho_underscore_stripping() {
        let obj = FakeObject {
            format: Some(Format::MachO),
            static_syms: vec![func("_main", 0x1000, None), var("__dyld_private", 0x2000, None)],
            ..Default::default()
        };
        let index = SymbolIndex::build(&obj);
        assert_eq!(index.lookup(SymType::Function, 0x1000).unwrap().name, "main");
        assert_eq!(
            index.lookup(SymType::Variable, 0x2000).unwrap().name,
            "_dyld_private"
        );
    }

    /// Compare lookups against a linear scan over random symbols.
    #[test]
    fn random_lookups() {
        let mut rng = rand::rng();
        let syms = (0..200)
            .map(|i| {
                let addr = rng.random_range(0..0x10000u64);
                let size = if rng.random_range(0..4) == 0 {
                    None
                } else {
                    Some(rng.random_range(1..0x100u64))
                };
                func(&format!("sym{i}"), addr, size)
            })
            .collect::<Vec<_>>();
        let obj = FakeObject {
            static_syms: syms.clone(),
            ..Default::default()
        };
        let index = SymbolIndex::build(&obj);

        for _ in 0..1000 {
            let addr = rng.random_range(0..0x10100u64);
            let candidate = syms
                .iter()
                .map(|(_, start, size, _)| (*start, size.unwrap_or(0)))
                .filter(|(start, _)| *start <= addr)
                .max();
            let expected =
                candidate.filter(|(start, size)| *size == 0 || addr - start < *size);

            let found = index
                .lookup(SymType::Function, addr)
                .map(|sym| (sym.addr, sym.size));
            assert_eq!(found, expected, "address {addr:#x}");
        }
    }
}
