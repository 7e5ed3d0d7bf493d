use std::borrow::Cow;


/// Check whether `name` looks like a legacy Rust symbol, i.e., an
/// Itanium style nested name ending in a `17h<hash>E` hash component.
#[cfg(feature = "demangle")]
fn is_legacy_rust(name: &str) -> bool {
    let bytes = name.as_bytes();
    // `17h` + 16 hex digits + `E`
    let suffix_len = 3 + 16 + 1;
    if !name.starts_with("_ZN") || bytes.len() < 3 + suffix_len {
        return false
    }

    let suffix = &bytes[bytes.len() - suffix_len..];
    suffix.starts_with(b"17h")
        && suffix.ends_with(b"E")
        && suffix[3..19].iter().all(u8::is_ascii_hexdigit)
}


/// Demangle `name`, if it uses a known mangling scheme.
///
/// Rust (v0 and legacy) and Itanium C++ manglings are supported. Names
/// that are not mangled or fail to demangle are returned unchanged.
#[cfg(feature = "demangle")]
pub(crate) fn demangle(name: &str) -> Cow<'_, str> {
    if name.starts_with("_R") || is_legacy_rust(name) {
        if let Ok(demangled) = rustc_demangle::try_demangle(name) {
            // The alternate format omits the hash.
            return Cow::Owned(format!("{demangled:#}"))
        }
    }

    if name.starts_with("_Z") {
        let demangled = cpp_demangle::Symbol::new(name)
            .ok()
            .and_then(|symbol| symbol.demangle(&Default::default()).ok());
        if let Some(demangled) = demangled {
            return Cow::Owned(demangled)
        }
    }

    Cow::Borrowed(name)
}

/// Demangle `name`, if it uses a known mangling scheme.
///
/// Demangling support is disabled, so `name` is returned unchanged.
#[cfg(not(feature = "demangle"))]
pub(crate) fn demangle(name: &str) -> Cow<'_, str> {
    Cow::Borrowed(name)
}


#[cfg(all(test, feature = "demangle"))]
mod tests {
    use super::*;

    use test_tag::tag;


    /// Check the detection of legacy Rust symbol names.
    #[tag(miri)]
    #[test]
    fn legacy_rust_detection() {
        assert!(is_legacy_rust("_ZN4test4main17h2d5b8a1c3f6e9d70E"));
        assert!(!is_legacy_rust("_ZN4test4mainE"));
        assert!(!is_legacy_rust("_ZN4test4main17h2d5b8a1c3f6e9dzzE"));
        assert!(!is_legacy_rust("_Z3foov"));
        assert!(!is_legacy_rust("main"));
    }

    /// Check that we demangle names as expected.
    #[test]
    fn demangling() {
        assert_eq!(demangle("_Z3fooi"), "foo(int)");
        assert_eq!(demangle("_ZN3foo3barEv"), "foo::bar()");
        assert_eq!(
            demangle("_ZN4test4main17h2d5b8a1c3f6e9d70E"),
            "test::main"
        );
        assert_eq!(demangle("_RNvC6_123foo3bar"), "123foo::bar");
        assert_eq!(demangle("main"), "main");
        assert_eq!(demangle("_Z"), "_Z");
        assert_eq!(demangle(""), "");
    }
}
