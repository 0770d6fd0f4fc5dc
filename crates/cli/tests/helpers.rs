use commap::{canonicalize_or_current, filter_directive};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current(".").expect("canonicalize").canonicalize().expect("canon");
    let expected = tmp.path().canonicalize().expect("canon tmp");
    assert_eq!(result, expected);

    std::env::set_current_dir(original).expect("restore cwd");
}

#[test]
fn canonicalize_or_current_keeps_missing_paths_absolute() {
    let result = canonicalize_or_current("does/not/exist/yet").expect("canonicalize");
    assert!(result.is_absolute());
    assert!(result.ends_with("does/not/exist/yet"));
}

#[test]
fn verbosity_flags_pick_filter() {
    assert_eq!(filter_directive(0, false), "info");
    assert_eq!(filter_directive(1, false), "debug");
    assert_eq!(filter_directive(3, false), "trace");
    assert_eq!(filter_directive(2, true), "warn");
}
