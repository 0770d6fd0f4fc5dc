//! Driver loop: enumerate, probe, project.
//!
//! Classes are visited in canonical (byte-wise) identifier order, which is
//! also what makes an identifier usable as a resume point. Each class is
//! probed and projected in isolation: whatever goes wrong with one class is
//! logged, counted in the `RunSummary`, and the loop moves on.
//!
//! Only failures that stop the run as a whole surface as `PipelineError`:
//! the source cannot be read, the prober cannot be prepared, or the
//! checkpoint cannot be written.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::checkpoint::{fingerprint, CheckpointError, CheckpointFile};
use crate::graph::{GraphProjector, GraphStore, ProjectionReport};
use crate::model::{ClassRecord, ComId, InterfaceRecord, SupportSet};
use crate::probe::{CapabilityProber, ProbeError};
use crate::source::{IdentifierSource, SourceError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to load identifiers: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to prepare prober: {0}")]
    Prober(#[source] ProbeError),

    #[error("Failed to update checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// Where the driver currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    NotStarted,
    Enumerating,
    /// Class is at or before the resume point.
    Skipping(ComId),
    Probing(ComId),
    Finished,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Resume point; every class `<=` this id is skipped.
    pub start_after: Option<ComId>,
}

impl RunOptions {
    pub fn resume_after(start: impl Into<ComId>) -> Self {
        Self { start_after: Some(start.into()) }
    }
}

/// Counters for one run. Serialized for `--json` output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub prober: String,
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed_after: Option<ComId>,
    pub total_classes: usize,
    pub total_interfaces: usize,
    pub skipped_before_resume: usize,
    pub visited: usize,
    pub projected: usize,
    pub empty: usize,
    pub malformed: usize,
    pub not_activatable: usize,
    pub instantiation_failed: usize,
    pub crashed: usize,
    pub timed_out: usize,
    pub worker_errors: usize,
    pub projection_failed: usize,
    pub interface_tests: usize,
    pub failed_interface_tests: usize,
    pub classes_created: usize,
    pub interfaces_created: usize,
    pub edges_created: usize,
    pub edges_existing: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_visited: Option<ComId>,
    pub started_at: String,
    pub finished_at: String,
}

impl RunSummary {
    fn record_probe_failure(&mut self, err: &ProbeError) {
        match err {
            ProbeError::MalformedIdentifier(_) => self.malformed += 1,
            ProbeError::NotActivatable { .. } => self.not_activatable += 1,
            ProbeError::Instantiation { .. } => self.instantiation_failed += 1,
            ProbeError::Crashed { .. } => self.crashed += 1,
            ProbeError::TimedOut { .. } => self.timed_out += 1,
            ProbeError::Worker { .. } => self.worker_errors += 1,
        }
    }

    fn record_projection(&mut self, report: &ProjectionReport) {
        self.projected += 1;
        if report.class_created {
            self.classes_created += 1;
        }
        self.interfaces_created += report.interfaces_created;
        self.edges_created += report.edges_created;
        self.edges_existing += report.edges_existing;
    }

    /// Classes that produced no graph writes because something failed.
    pub fn failures(&self) -> usize {
        self.malformed
            + self.not_activatable
            + self.instantiation_failed
            + self.crashed
            + self.timed_out
            + self.worker_errors
            + self.projection_failed
    }
}

/// Sequences prober and projector over every class in scope.
pub struct Driver<'a> {
    prober: &'a mut dyn CapabilityProber,
    store: &'a mut dyn GraphStore,
    checkpoint: Option<&'a mut CheckpointFile>,
    state: DriverState,
}

impl<'a> Driver<'a> {
    pub fn new(prober: &'a mut dyn CapabilityProber, store: &'a mut dyn GraphStore) -> Self {
        Self { prober, store, checkpoint: None, state: DriverState::NotStarted }
    }

    /// Record progress in `checkpoint` as the run advances.
    pub fn with_checkpoint(mut self, checkpoint: &'a mut CheckpointFile) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn run(
        &mut self,
        source: &dyn IdentifierSource,
        options: &RunOptions,
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary {
            source: source.describe(),
            prober: self.prober.name().to_string(),
            store: self.store.describe(),
            resumed_after: options.start_after.clone(),
            started_at: Utc::now().to_rfc3339(),
            ..RunSummary::default()
        };

        self.state = DriverState::Enumerating;
        let mut classes = source.classes()?;
        let interfaces = source.interfaces()?;
        // Stable sort keeps first-wins order among any duplicate ids a
        // source failed to collapse.
        classes.sort_by(|a, b| a.id.cmp(&b.id));
        summary.total_classes = classes.len();
        summary.total_interfaces = interfaces.len();
        tracing::info!(
            source = %summary.source,
            classes = classes.len(),
            interfaces = interfaces.len(),
            "loaded identifiers"
        );

        self.prober.begin_run(&interfaces).map_err(PipelineError::Prober)?;
        if let Some(checkpoint) = self.checkpoint.as_deref_mut() {
            checkpoint.begin(fingerprint(&classes))?;
        }

        for class in &classes {
            if let Some(start) = &options.start_after {
                if class.id <= *start {
                    self.state = DriverState::Skipping(class.id.clone());
                    tracing::trace!(clsid = %class.id, "before resume point");
                    summary.skipped_before_resume += 1;
                    continue;
                }
            }

            self.state = DriverState::Probing(class.id.clone());
            if let Some(checkpoint) = self.checkpoint.as_deref_mut() {
                checkpoint.mark_in_flight(&class.id)?;
            }

            self.visit(class, &interfaces, &mut summary);

            if let Some(checkpoint) = self.checkpoint.as_deref_mut() {
                checkpoint.mark_completed(&class.id)?;
            }
            summary.visited += 1;
            summary.last_visited = Some(class.id.clone());
        }

        self.state = DriverState::Finished;
        summary.finished_at = Utc::now().to_rfc3339();
        tracing::info!(
            visited = summary.visited,
            projected = summary.projected,
            empty = summary.empty,
            failures = summary.failures(),
            "run finished"
        );
        Ok(summary)
    }

    /// Probe one class and project it when anything was confirmed.
    fn visit(
        &mut self,
        class: &ClassRecord,
        interfaces: &[InterfaceRecord],
        summary: &mut RunSummary,
    ) {
        tracing::info!(clsid = %class.id, name = class.name.as_deref().unwrap_or(""), "checking class");

        let set: SupportSet = match self.prober.probe(class, interfaces) {
            Ok(set) => set,
            Err(err) => {
                summary.record_probe_failure(&err);
                tracing::warn!(clsid = %class.id, "skipping class: {err}");
                return;
            }
        };
        summary.interface_tests += set.tested;
        summary.failed_interface_tests += set.failed_tests;

        if set.is_empty() {
            summary.empty += 1;
            tracing::info!(clsid = %class.id, "no supported interfaces; nothing to write");
            return;
        }

        match GraphProjector::new(&mut *self.store).project(class, &set) {
            Ok(report) => summary.record_projection(&report),
            Err(err) => {
                summary.projection_failed += 1;
                tracing::warn!(clsid = %class.id, "projection abandoned: {err}");
            }
        }
    }
}
