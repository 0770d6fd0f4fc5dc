//! Supervisor behavior against scripted workers. The worker is `sh -c`,
//! which sees `--clsid <ID> --interfaces <FILE>` as `$1..$4`.

#![cfg(unix)]

use std::time::Duration;

use commap_core::model::{ClassRecord, InterfaceRecord};
use commap_core::probe::{CapabilityProber, ProbeError, SubprocessProber};
use tempfile::tempdir;

const IUNKNOWN: &str = "{00000000-0000-0000-C000-000000000046}";
const CLSID: &str = "{AAAAAAAA-0000-0000-0000-000000000001}";

fn worker(script: &str, interfaces: &std::path::Path, timeout: Duration) -> SubprocessProber {
    SubprocessProber::new(
        "sh",
        vec!["-c".to_string(), script.to_string(), "worker".to_string()],
        interfaces,
        timeout,
    )
}

fn interfaces() -> Vec<InterfaceRecord> {
    vec![InterfaceRecord::new(IUNKNOWN).with_name(Some("IUnknown".into()))]
}

#[test]
fn reply_from_worker_becomes_support_set() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("interfaces.json");
    let script = format!(
        r#"echo "noise from a chatty server"; printf '{{"status":"supported","clsid":"%s","supported":["{IUNKNOWN}"],"tested":1,"failed_tests":0,"malformed":0}}\n' "$2""#
    );
    let mut prober = worker(&script, &path, Duration::from_secs(10));
    prober.begin_run(&interfaces()).expect("begin");
    assert!(path.is_file());

    let set = prober.probe(&ClassRecord::new(CLSID), &interfaces()).expect("supported");
    assert_eq!(set.len(), 1);
    assert_eq!(set.iter().next().and_then(|i| i.name.as_deref()), Some("IUnknown"));
}

#[test]
fn worker_dying_without_reply_is_a_crash() {
    let dir = tempdir().expect("tempdir");
    let mut prober = worker("exit 3", &dir.path().join("i.json"), Duration::from_secs(10));
    prober.begin_run(&interfaces()).expect("begin");

    match prober.probe(&ClassRecord::new(CLSID), &interfaces()) {
        Err(ProbeError::Crashed { clsid, .. }) => assert_eq!(clsid.as_str(), CLSID),
        other => panic!("expected crash, got {other:?}"),
    }
}

#[test]
fn hung_worker_is_killed_after_timeout() {
    let dir = tempdir().expect("tempdir");
    let mut prober = worker("exec sleep 30", &dir.path().join("i.json"), Duration::from_millis(200));
    prober.begin_run(&interfaces()).expect("begin");

    let started = std::time::Instant::now();
    let err = prober.probe(&ClassRecord::new(CLSID), &interfaces()).unwrap_err();
    assert!(matches!(err, ProbeError::TimedOut { .. }));
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn timeout_does_not_wait_for_grandchildren_holding_stdout() {
    let dir = tempdir().expect("tempdir");
    let mut prober =
        worker("sleep 30 & exec sleep 30", &dir.path().join("i.json"), Duration::from_millis(200));
    prober.begin_run(&interfaces()).expect("begin");

    let started = std::time::Instant::now();
    let err = prober.probe(&ClassRecord::new(CLSID), &interfaces()).unwrap_err();
    assert!(matches!(err, ProbeError::TimedOut { .. }));
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn missing_worker_program_is_a_worker_error() {
    let dir = tempdir().expect("tempdir");
    let prober = SubprocessProber::new(
        dir.path().join("no-such-binary"),
        Vec::new(),
        dir.path().join("i.json"),
        Duration::from_secs(1),
    );
    let err = prober.probe(&ClassRecord::new(CLSID), &interfaces()).unwrap_err();
    assert!(matches!(err, ProbeError::Worker { .. }));
}
