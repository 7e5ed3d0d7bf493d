use std::fs;
use std::path::Path;
use std::path::PathBuf;

use modsym::symbolize::FunctionNameKind;
use modsym::symbolize::Symbolizer;
use modsym::Arch;
#[cfg(feature = "dwarf")]
use modsym::__private::crc32;
#[cfg(feature = "dwarf")]
use modsym::__private::debug_link_section;
#[cfg(feature = "dwarf")]
use modsym::__private::DwarfBuilder;
use modsym::__private::ElfBuilder;
use modsym::__private::FatBuilder;
use modsym::__private::MachOBuilder;

use tempfile::tempdir;
#[cfg(feature = "dwarf")]
use tempfile::TempDir;

use test_log::test;


/// Write `data` to a file called `name` inside of `dir`, returning the
/// module identifier to use for it.
fn write(dir: &Path, name: &str, data: &[u8]) -> String {
    let path = dir.join(name);
    let () = fs::write(&path, data).unwrap();
    path.to_str().unwrap().to_string()
}

/// A DWARF unit describing `main` (0x1000-0x1100) with `helper`
/// inlined into it at 0x1020-0x1040.
#[cfg(feature = "dwarf")]
fn dwarf() -> DwarfBuilder {
    DwarfBuilder::new("/src")
        .add_file("main.c")
        .add_file("util.h")
        .add_function("main", 0x1000, 0x1100)
        .add_inlined("helper", 0x1020, 0x1040, 1, 12)
        .add_line(0x1000, 1, 10, 1)
        .add_line(0x1020, 2, 3, 5)
        .add_line(0x1040, 1, 14, 2)
        .end_sequence(0x1100)
}

/// Create a symbolizer that does not search any global debug
/// directories.
fn symbolizer() -> Symbolizer {
    Symbolizer::builder()
        .set_debug_dirs(Some(Vec::<PathBuf>::new()))
        .set_default_arch("x86_64")
        .build()
}


/// Check symbolization based on the symbol table alone.
#[test]
fn symbolize_symbol_table_only() {
    let dir = tempdir().unwrap();
    let elf = ElfBuilder::new()
        .add_func("foo", 0x1000, 0x10)
        .add_var("g_counter", 0x2000, 4)
        .add_common_var("tentative", 0x10, 0x100)
        .build();
    let id = write(dir.path(), "prog", &elf);

    let mut symbolizer = symbolizer();
    assert_eq!(symbolizer.symbolize_code(&id, 0x1005), "foo\n??:0:0\n");
    assert_eq!(symbolizer.symbolize_code(&id, 0xfff), "??\n??:0:0\n");
    assert_eq!(symbolizer.symbolize_code(&id, 0x1010), "??\n??:0:0\n");

    assert_eq!(symbolizer.symbolize_data(&id, 0x2002), "g_counter\n8192 4\n");
    assert_eq!(symbolizer.symbolize_data(&id, 0x3000), "??\n0 0\n");
    // Functions are not reported as data and vice versa.
    assert_eq!(symbolizer.symbolize_data(&id, 0x1005), "??\n0 0\n");
    assert_eq!(symbolizer.symbolize_code(&id, 0x2002), "??\n??:0:0\n");
    // Common symbols have no address yet.
    assert_eq!(symbolizer.symbolize_data(&id, 0x20), "??\n0 0\n");

    let module = symbolizer.module(&id).unwrap();
    assert!(!module.has_debug_info());
    assert!(!module.has_separate_debug_object());
}

/// Check that queries for modules that cannot be loaded produce unknown
/// results.
#[test]
fn symbolize_unknown_module() {
    let dir = tempdir().unwrap();
    let id = dir.path().join("does-not-exist");
    let id = id.to_str().unwrap();

    let mut symbolizer = symbolizer();
    assert_eq!(symbolizer.symbolize_code(id, 0x1000), "??\n??:0:0\n");
    assert_eq!(symbolizer.symbolize_data(id, 0x1000), "??\n0 0\n");
    assert!(symbolizer.module(id).is_none());

    let id = write(dir.path(), "garbage", b"this is not a binary");
    assert_eq!(symbolizer.symbolize_code(&id, 0x1000), "??\n??:0:0\n");
}

/// Check symbolization using DWARF line information, with and without
/// inlined function reporting.
#[cfg(feature = "dwarf")]
#[test]
fn symbolize_dwarf() {
    let dir = tempdir().unwrap();
    let elf = dwarf()
        .add_to(ElfBuilder::new())
        .add_func("main", 0x1000, 0x100)
        .build();
    let id = write(dir.path(), "prog", &elf);

    let mut symbolizer = symbolizer();
    assert_eq!(
        symbolizer.symbolize_code(&id, 0x1024),
        "helper\n/src/util.h:3:5\nmain\n/src/main.c:12:0\n"
    );
    assert_eq!(symbolizer.symbolize_code(&id, 0x1044), "main\n/src/main.c:14:2\n");
    assert!(symbolizer.module(&id).unwrap().has_debug_info());

    // Without inlined functions the innermost location is reported,
    // but the name comes from the symbol table.
    let mut symbolizer = Symbolizer::builder().enable_inlined_fns(false).build();
    assert_eq!(symbolizer.symbolize_code(&id, 0x1024), "main\n/src/util.h:3:5\n");

    let mut symbolizer = Symbolizer::builder()
        .enable_inlined_fns(false)
        .enable_symbol_table(false)
        .build();
    assert_eq!(symbolizer.symbolize_code(&id, 0x1024), "helper\n/src/util.h:3:5\n");

    let mut symbolizer = Symbolizer::builder()
        .set_function_names(FunctionNameKind::None)
        .build();
    assert_eq!(
        symbolizer.symbolize_code(&id, 0x1024),
        "/src/util.h:3:5\n/src/main.c:12:0\n"
    );
}

/// Check that the symbol table only overrides the name of the
/// outermost frame, and that overriding names get demangled.
#[cfg(all(feature = "dwarf", feature = "demangle"))]
#[test]
fn symbolize_dwarf_demangled() {
    let dir = tempdir().unwrap();
    let elf = dwarf()
        .add_to(ElfBuilder::new())
        .add_func("_Z4mainv", 0x1000, 0x100)
        .build();
    let id = write(dir.path(), "prog", &elf);

    let mut symbolizer = symbolizer();
    assert_eq!(
        symbolizer.symbolize_code(&id, 0x1024),
        "helper\n/src/util.h:3:5\nmain()\n/src/main.c:12:0\n"
    );

    let mut symbolizer = Symbolizer::builder().enable_demangling(false).build();
    assert_eq!(
        symbolizer.symbolize_code(&id, 0x1024),
        "helper\n/src/util.h:3:5\n_Z4mainv\n/src/main.c:12:0\n"
    );
}

/// Check that we can symbolize using compressed debug information.
#[cfg(all(feature = "dwarf", feature = "zlib"))]
#[test]
fn symbolize_compressed_dwarf() {
    let dir = tempdir().unwrap();
    let elf = dwarf().compressed().add_to(ElfBuilder::new()).build();
    let id = write(dir.path(), "prog", &elf);

    let mut symbolizer = symbolizer();
    assert_eq!(symbolizer.symbolize_code(&id, 0x1044), "main\n/src/main.c:14:2\n");
}

/// Check that we can symbolize ELF files of the non-native byte order.
#[cfg(feature = "dwarf")]
#[test]
fn symbolize_foreign_byte_order() {
    let dir = tempdir().unwrap();
    let elf = ElfBuilder::new().set_big_endian(cfg!(target_endian = "little"));
    let elf = dwarf().add_to(elf).add_var("g_counter", 0x2000, 4).build();
    let id = write(dir.path(), "prog", &elf);

    let mut symbolizer = symbolizer();
    assert_eq!(symbolizer.symbolize_code(&id, 0x1044), "main\n/src/main.c:14:2\n");
    assert_eq!(symbolizer.symbolize_data(&id, 0x2003), "g_counter\n8192 4\n");
}


/// Create a directory with a stripped `prog` binary linking to
/// `prog.debug`, which holds the debug information. `crc` overrides
/// the checksum recorded in the link.
#[cfg(feature = "dwarf")]
fn debug_link_setup(crc: Option<u32>) -> (TempDir, String) {
    let dir = tempdir().unwrap();
    let debug = dwarf().add_to(ElfBuilder::new()).build();
    let _id = write(dir.path(), "prog.debug", &debug);

    let crc = crc.unwrap_or_else(|| crc32(&debug));
    let prog = ElfBuilder::new()
        .add_section(".gnu_debuglink", &debug_link_section("prog.debug", crc, true))
        .add_func("main", 0x1000, 0x100)
        .build();
    let id = write(dir.path(), "prog", &prog);
    (dir, id)
}

/// Check that debug information is picked up from a file referenced by
/// a debug link.
#[cfg(feature = "dwarf")]
#[test]
fn symbolize_debug_link() {
    let (_dir, id) = debug_link_setup(None);

    let mut symbolizer = symbolizer();
    assert_eq!(symbolizer.symbolize_code(&id, 0x1044), "main\n/src/main.c:14:2\n");

    let module = symbolizer.module(&id).unwrap();
    assert!(module.has_separate_debug_object());
    assert!(module.has_debug_info());
}

/// Check that a debug link target with the wrong checksum is ignored,
/// unless verification is disabled.
#[cfg(feature = "dwarf")]
#[test]
fn symbolize_debug_link_checksum_mismatch() {
    let (_dir, id) = debug_link_setup(Some(0xdeadbeef));

    let mut symbolizer = symbolizer();
    assert_eq!(symbolizer.symbolize_code(&id, 0x1044), "main\n??:0:0\n");
    assert!(!symbolizer.module(&id).unwrap().has_separate_debug_object());

    let mut symbolizer = Symbolizer::builder()
        .enable_checksum_verification(false)
        .build();
    assert_eq!(symbolizer.symbolize_code(&id, 0x1044), "main\n/src/main.c:14:2\n");
}

/// Check that objects get selected out of universal binaries based on
/// the architecture in the module identifier.
#[test]
fn symbolize_universal_binary() {
    let dir = tempdir().unwrap();
    let fat = FatBuilder::new()
        .add(MachOBuilder::new(Arch::X86_64).add_func("_x86_main", 0x1000).build())
        .add(
            MachOBuilder::new(Arch::Aarch64)
                .add_func("_arm_main", 0x1000)
                .add_var("_arm_data", 0x2000)
                .build(),
        )
        .build();
    let id = write(dir.path(), "prog", &fat);

    let mut symbolizer = symbolizer();
    assert_eq!(
        symbolizer.symbolize_code(&format!("{id}:x86_64"), 0x1004),
        "x86_main\n??:0:0\n"
    );
    assert_eq!(
        symbolizer.symbolize_code(&format!("{id}:arm64"), 0x1004),
        "arm_main\n??:0:0\n"
    );
    assert_eq!(
        symbolizer.symbolize_data(&format!("{id}:aarch64"), 0x2000),
        "arm_data\n8192 0\n"
    );
    // The default architecture is `x86_64`.
    assert_eq!(symbolizer.symbolize_code(&id, 0x1004), "x86_main\n??:0:0\n");
    assert_eq!(
        symbolizer.symbolize_code(&format!("{id}:ppc64"), 0x1004),
        "??\n??:0:0\n"
    );
}

/// Check that debug information is picked up from a `.dSYM` bundle.
#[cfg(feature = "dwarf")]
#[test]
fn symbolize_dsym() {
    let dir = tempdir().unwrap();
    let prog = MachOBuilder::new(Arch::Aarch64).add_func("_main", 0x1000).build();
    let id = write(dir.path(), "prog", &prog);
    let id = format!("{id}:arm64");

    let dwarf_dir = dir.path().join("prog.dSYM/Contents/Resources/DWARF");
    let () = fs::create_dir_all(&dwarf_dir).unwrap();
    let dsym = dwarf().add_to_macho(MachOBuilder::new(Arch::Aarch64)).build();
    let _id = write(&dwarf_dir, "prog", &dsym);

    let mut symbolizer = symbolizer();
    assert_eq!(
        symbolizer.symbolize_code(&id, 0x1024),
        "helper\n/src/util.h:3:5\nmain\n/src/main.c:12:0\n"
    );
    assert!(symbolizer.module(&id).unwrap().has_separate_debug_object());
}

/// Check that modules are cached until flushed.
#[test]
fn symbolize_after_flush() {
    let dir = tempdir().unwrap();
    let elf = ElfBuilder::new().add_func("before", 0x1000, 0x10).build();
    let id = write(dir.path(), "prog", &elf);

    let mut symbolizer = symbolizer();
    assert_eq!(symbolizer.symbolize_code(&id, 0x1000), "before\n??:0:0\n");

    // Replace the file instead of rewriting it in place, as the old one
    // is still mapped.
    let () = fs::remove_file(dir.path().join("prog")).unwrap();
    let elf = ElfBuilder::new().add_func("after", 0x1000, 0x10).build();
    let _id = write(dir.path(), "prog", &elf);
    assert_eq!(symbolizer.symbolize_code(&id, 0x1000), "before\n??:0:0\n");

    let () = symbolizer.flush();
    assert_eq!(symbolizer.symbolize_code(&id, 0x1000), "after\n??:0:0\n");
}
