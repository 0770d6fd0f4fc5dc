use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::model::{ClassRecord, ComId, InterfaceRecord, SupportSet};
use crate::probe::{ActivationError, Activator, CapabilityProber, InProcessProber, ProbeError};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Single-class probe outcome exchanged between the worker and the supervisor
/// as one JSON line on the worker's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeReply {
    Supported {
        clsid: ComId,
        supported: Vec<ComId>,
        tested: usize,
        failed_tests: usize,
        malformed: usize,
    },
    MalformedIdentifier {
        clsid: ComId,
    },
    NotActivatable {
        clsid: ComId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
        message: String,
    },
    InstantiationFailed {
        clsid: ComId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
        message: String,
    },
    WorkerError {
        clsid: ComId,
        message: String,
    },
}

impl ProbeReply {
    pub fn from_result(clsid: &ComId, result: &Result<SupportSet, ProbeError>) -> Self {
        let clsid = clsid.clone();
        match result {
            Ok(set) => ProbeReply::Supported {
                clsid,
                supported: set.ids(),
                tested: set.tested,
                failed_tests: set.failed_tests,
                malformed: set.malformed,
            },
            Err(ProbeError::MalformedIdentifier(_)) => ProbeReply::MalformedIdentifier { clsid },
            Err(ProbeError::NotActivatable { source, .. }) => ProbeReply::NotActivatable {
                clsid,
                code: source.code,
                message: source.message.clone(),
            },
            Err(ProbeError::Instantiation { source, .. }) => ProbeReply::InstantiationFailed {
                clsid,
                code: source.code,
                message: source.message.clone(),
            },
            Err(other) => ProbeReply::WorkerError { clsid, message: other.to_string() },
        }
    }

    /// Map the reply back onto the probe taxonomy, resolving interface ids
    /// against the run's interface list so display names survive.
    pub fn into_result(self, interfaces: &[InterfaceRecord]) -> Result<SupportSet, ProbeError> {
        match self {
            ProbeReply::Supported { supported, tested, failed_tests, malformed, .. } => {
                let mut by_id: BTreeMap<&ComId, &InterfaceRecord> = BTreeMap::new();
                for iface in interfaces {
                    by_id.entry(&iface.id).or_insert(iface);
                }
                let mut set: SupportSet = supported
                    .into_iter()
                    .map(|id| by_id.get(&id).map(|i| (*i).clone()).unwrap_or(InterfaceRecord::new(id)))
                    .collect();
                set.tested = tested;
                set.failed_tests = failed_tests;
                set.malformed = malformed;
                Ok(set)
            }
            ProbeReply::MalformedIdentifier { clsid } => {
                Err(ProbeError::MalformedIdentifier(crate::model::MalformedIdError(clsid.into())))
            }
            ProbeReply::NotActivatable { clsid, code, message } => {
                Err(ProbeError::NotActivatable { clsid, source: ActivationError { code, message } })
            }
            ProbeReply::InstantiationFailed { clsid, code, message } => {
                Err(ProbeError::Instantiation { clsid, source: ActivationError { code, message } })
            }
            ProbeReply::WorkerError { clsid, message } => Err(ProbeError::Worker { clsid, message }),
        }
    }
}

/// Worker side: probe one class in this process and describe the outcome.
///
/// `interfaces_path` is the JSON interface list written by
/// `SubprocessProber::begin_run`.
pub fn probe_worker<A: Activator>(
    activator: A,
    clsid: &str,
    interfaces_path: &Path,
) -> ProbeReply {
    let class = ClassRecord::new(clsid);
    let interfaces = match load_interfaces(interfaces_path) {
        Ok(list) => list,
        Err(message) => return ProbeReply::WorkerError { clsid: class.id, message },
    };
    let prober = InProcessProber::new(activator);
    let result = prober.probe(&class, &interfaces);
    ProbeReply::from_result(&class.id, &result)
}

fn load_interfaces(path: &Path) -> Result<Vec<InterfaceRecord>, String> {
    let body = fs::read(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_slice(&body).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

/// Supervisor side: runs each probe in a child process with a watchdog.
///
/// The child is `program base_args... --clsid <ID> --interfaces <FILE>` and must
/// print a `ProbeReply` JSON line on stdout. A child that dies without a reply
/// is reported as `Crashed`; one that outlives the timeout is killed and
/// reported as `TimedOut`. Either way the run moves on to the next class.
///
/// Only the direct child is killed. If it started processes of its own that
/// inherited stdout, the thread draining the pipe stays blocked until they
/// exit, so each such timeout costs one detached thread for that long.
#[derive(Debug, Clone)]
pub struct SubprocessProber {
    program: PathBuf,
    base_args: Vec<String>,
    interfaces_path: PathBuf,
    timeout: Duration,
}

impl SubprocessProber {
    pub fn new(
        program: impl Into<PathBuf>,
        base_args: Vec<String>,
        interfaces_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            base_args,
            interfaces_path: interfaces_path.into(),
            timeout,
        }
    }

    pub fn interfaces_path(&self) -> &Path {
        &self.interfaces_path
    }

    fn spawn_and_wait(&self, clsid: &ComId) -> Result<(Option<ExitStatus>, String), ProbeError> {
        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .arg("--clsid")
            .arg(clsid.as_str())
            .arg("--interfaces")
            .arg(&self.interfaces_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ProbeError::Worker {
                clsid: clsid.clone(),
                message: format!("failed to spawn {}: {e}", self.program.display()),
            })?;

        // Drain stdout on a separate thread so a chatty COM server cannot
        // block the child on a full pipe while we poll for exit.
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stdout.read_to_string(&mut buf);
                buf
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if Instant::now() >= deadline => {
                    tracing::warn!(clsid = %clsid, "probe worker exceeded timeout; killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(ProbeError::Worker {
                        clsid: clsid.clone(),
                        message: format!("failed to wait for worker: {e}"),
                    });
                }
            }
        };

        // After a kill, grandchildren may still hold the pipe open, so the
        // reader is detached rather than joined (see the type docs).
        let stdout = match status {
            Some(_) => reader.and_then(|handle| handle.join().ok()).unwrap_or_default(),
            None => String::new(),
        };
        Ok((status, stdout))
    }
}

impl CapabilityProber for SubprocessProber {
    fn begin_run(&mut self, interfaces: &[InterfaceRecord]) -> Result<(), ProbeError> {
        let body = serde_json::to_vec(interfaces).map_err(|e| ProbeError::Worker {
            clsid: ComId::new("*"),
            message: format!("failed to serialize interface list: {e}"),
        })?;
        fs::write(&self.interfaces_path, body).map_err(|e| ProbeError::Worker {
            clsid: ComId::new("*"),
            message: format!("failed to write {}: {e}", self.interfaces_path.display()),
        })?;
        tracing::info!(
            path = %self.interfaces_path.display(),
            count = interfaces.len(),
            "wrote interface list for probe workers"
        );
        Ok(())
    }

    fn probe(
        &self,
        class: &ClassRecord,
        interfaces: &[InterfaceRecord],
    ) -> Result<SupportSet, ProbeError> {
        tracing::info!(clsid = %class.id, "probing in worker process");
        let (status, stdout) = self.spawn_and_wait(&class.id)?;
        let Some(status) = status else {
            return Err(ProbeError::TimedOut { clsid: class.id.clone(), secs: self.timeout.as_secs() });
        };

        match parse_reply(&stdout) {
            Some(reply) => reply.into_result(interfaces),
            None => Err(ProbeError::Crashed { clsid: class.id.clone(), status: status.to_string() }),
        }
    }

    fn name(&self) -> &'static str {
        "subprocess"
    }
}

/// Find the last stdout line that parses as a reply; COM servers sometimes
/// write their own noise to stdout.
pub fn parse_reply(stdout: &str) -> Option<ProbeReply> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| serde_json::from_str::<ProbeReply>(line).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_round_trip_keeps_interface_names() {
        let interfaces = vec![
            InterfaceRecord::new("{00000000-0000-0000-C000-000000000046}")
                .with_name(Some("IUnknown".into())),
            InterfaceRecord::new("{00020400-0000-0000-C000-000000000046}")
                .with_name(Some("IDispatch".into())),
        ];
        let clsid = ComId::new("{AAAAAAAA-0000-0000-0000-000000000001}");
        let set: SupportSet = interfaces[..1].iter().cloned().collect();
        let line = serde_json::to_string(&ProbeReply::from_result(&clsid, &Ok(set))).unwrap();

        let reply = parse_reply(&format!("server banner\n{line}\n")).expect("reply");
        let set = reply.into_result(&interfaces).expect("supported");
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().name.as_deref(), Some("IUnknown"));
    }

    #[test]
    fn missing_reply_is_none() {
        assert!(parse_reply("").is_none());
        assert!(parse_reply("garbage\n{not json}").is_none());
    }

    #[test]
    fn not_activatable_reply_maps_back() {
        let reply: ProbeReply = serde_json::from_str(
            r#"{"status":"not_activatable","clsid":"{AAAAAAAA-0000-0000-0000-000000000001}","code":-2147221164,"message":"Class not registered"}"#,
        )
        .unwrap();
        match reply.into_result(&[]) {
            Err(ProbeError::NotActivatable { source, .. }) => {
                assert_eq!(source.code, Some(-2147221164));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn worker_reports_unreadable_interface_list() {
        struct NeverCalled;
        impl Activator for NeverCalled {
            fn resolve(
                &self,
                _clsid: uuid::Uuid,
            ) -> Result<Box<dyn crate::probe::ActivatableClass>, ActivationError> {
                panic!("activator must not be reached");
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let reply = probe_worker(
            NeverCalled,
            "{AAAAAAAA-0000-0000-0000-000000000001}",
            &dir.path().join("missing.json"),
        );
        assert!(matches!(reply, ProbeReply::WorkerError { .. }));
    }
}
