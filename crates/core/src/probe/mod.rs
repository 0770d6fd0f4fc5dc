//! Capability probing: activate a class and ask it which interfaces it implements.
//!
//! Activation runs arbitrary third-party code, so it sits behind two seams:
//! - `Activator` / `ActivatableClass` / `ComInstance`: the raw COM operations
//!   (a Windows implementation lives in `com`, tests provide fakes).
//! - `CapabilityProber`: one call per class. `InProcessProber` runs the
//!   activator in this process; `SubprocessProber` runs it in a supervised
//!   child so a crash or hang only costs that one class.

use thiserror::Error;
use uuid::Uuid;

use crate::model::{ClassRecord, ComId, InterfaceRecord, MalformedIdError, SupportSet};

#[cfg(windows)]
pub mod com;
pub mod subprocess;

#[cfg(windows)]
pub use com::{ComActivator, ComApartment};
pub use subprocess::{probe_worker, ProbeReply, SubprocessProber};

/// Failure reported by an activator, usually carrying an HRESULT.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ActivationError {
    pub code: Option<i32>,
    pub message: String,
}

impl ActivationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { code: None, message: message.into() }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self { code: Some(code), message: message.into() }
    }
}

/// Why a class produced no support set.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    MalformedIdentifier(#[from] MalformedIdError),

    #[error("Class {clsid} is not activatable: {source}")]
    NotActivatable {
        clsid: ComId,
        #[source]
        source: ActivationError,
    },

    #[error("Failed to instantiate {clsid}: {source}")]
    Instantiation {
        clsid: ComId,
        #[source]
        source: ActivationError,
    },

    #[error("Probe worker for {clsid} crashed ({status})")]
    Crashed { clsid: ComId, status: String },

    #[error("Probe worker for {clsid} timed out after {secs}s")]
    TimedOut { clsid: ComId, secs: u64 },

    #[error("Probe worker error for {clsid}: {message}")]
    Worker { clsid: ComId, message: String },
}

/// Resolves a CLSID to something that can be instantiated.
pub trait Activator {
    fn resolve(&self, clsid: Uuid) -> Result<Box<dyn ActivatableClass>, ActivationError>;
}

/// An activatable type descriptor (a class factory on Windows).
pub trait ActivatableClass {
    fn instantiate(&self) -> Result<Box<dyn ComInstance>, ActivationError>;
}

/// A live object instance holding its capability-negotiation handle.
pub trait ComInstance {
    /// `Ok(true)` if the object affirmatively implements `iid`, `Ok(false)`
    /// if it declines, `Err` for any other failure.
    fn negotiate(&self, iid: Uuid) -> Result<bool, ActivationError>;
}

/// Determines which interfaces a class supports.
pub trait CapabilityProber {
    /// Called once per run with the full interface list, before any probe.
    fn begin_run(&mut self, _interfaces: &[InterfaceRecord]) -> Result<(), ProbeError> {
        Ok(())
    }

    fn probe(
        &self,
        class: &ClassRecord,
        interfaces: &[InterfaceRecord],
    ) -> Result<SupportSet, ProbeError>;

    fn name(&self) -> &'static str;
}

/// Runs activation and negotiation in the current process.
///
/// A crash inside the target class takes the whole process down; use
/// `SubprocessProber` when that matters.
pub struct InProcessProber<A> {
    activator: A,
}

impl<A: Activator> InProcessProber<A> {
    pub fn new(activator: A) -> Self {
        Self { activator }
    }
}

impl<A: Activator> CapabilityProber for InProcessProber<A> {
    fn probe(
        &self,
        class: &ClassRecord,
        interfaces: &[InterfaceRecord],
    ) -> Result<SupportSet, ProbeError> {
        tracing::info!(clsid = %class.id, "getting all supported interfaces");
        let clsid = class.id.guid()?;

        let factory = self
            .activator
            .resolve(clsid)
            .map_err(|source| ProbeError::NotActivatable { clsid: class.id.clone(), source })?;
        let instance = factory
            .instantiate()
            .map_err(|source| ProbeError::Instantiation { clsid: class.id.clone(), source })?;

        let mut set = SupportSet::new();
        for iface in interfaces {
            if set.contains(&iface.id) {
                continue;
            }
            let iid = match iface.id.guid() {
                Ok(iid) => iid,
                Err(err) => {
                    set.malformed += 1;
                    tracing::debug!(clsid = %class.id, "{err}");
                    continue;
                }
            };
            set.tested += 1;
            match instance.negotiate(iid) {
                Ok(true) => {
                    tracing::debug!(clsid = %class.id, iid = %iface.id, "interface supported");
                    set.insert(iface.clone());
                }
                Ok(false) => {}
                Err(err) => {
                    set.failed_tests += 1;
                    tracing::debug!(clsid = %class.id, iid = %iface.id, "negotiation failed: {err}");
                }
            }
        }

        tracing::info!(
            clsid = %class.id,
            supported = set.len(),
            tested = set.tested,
            "probe complete"
        );
        Ok(set)
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}
