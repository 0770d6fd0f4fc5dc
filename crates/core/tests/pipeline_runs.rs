mod common;

use commap_core::checkpoint::CheckpointFile;
use commap_core::graph::{
    ClassNode, GraphCounts, GraphError, GraphResult, GraphStore, InterfaceNode, MemoryGraphStore,
    SqliteGraphStore, WriteOutcome,
};
use commap_core::model::{ClassRecord, ComId};
use commap_core::pipeline::{Driver, DriverState, RunOptions};
use commap_core::probe::InProcessProber;
use tempfile::tempdir;

use common::{inventory, ScriptedActivator, IDISPATCH, IPERSIST, IUNKNOWN};

const SAMPLE: &str = "{AAAAAAAA-0000-0000-0000-000000000001}";
const SECOND: &str = "{AAAAAAAA-0000-0000-0000-000000000002}";
const THIRD: &str = "{AAAAAAAA-0000-0000-0000-000000000003}";

fn activator() -> ScriptedActivator {
    ScriptedActivator::new()
        .supports(SAMPLE, &[IUNKNOWN, IDISPATCH])
        .supports(SECOND, &[IUNKNOWN])
        .supports(THIRD, &[IUNKNOWN, IPERSIST])
}

fn classes() -> Vec<ClassRecord> {
    vec![
        ClassRecord::new(THIRD),
        ClassRecord::new(SAMPLE).with_name(Some("Sample".into())),
        ClassRecord::new(SECOND),
    ]
}

#[test]
fn sample_class_projects_two_of_three_interfaces() {
    let source = inventory(vec![ClassRecord::new(SAMPLE).with_name(Some("Sample".into()))]);
    let mut prober = InProcessProber::new(activator());
    let mut store = SqliteGraphStore::open_in_memory().expect("store");

    let summary = Driver::new(&mut prober, &mut store)
        .run(&source, &RunOptions::default())
        .expect("run");
    assert_eq!(summary.projected, 1);
    assert_eq!(summary.interface_tests, 3);

    assert_eq!(store.counts().unwrap(), GraphCounts { classes: 1, interfaces: 2, edges: 2 });
    let node = store.class_node(&ComId::new(SAMPLE)).unwrap().expect("class node");
    assert_eq!(node.property("name"), Some("Sample"));
    assert_eq!(
        store.implemented_by(&ComId::new(SAMPLE)).unwrap(),
        vec![ComId::new(IUNKNOWN), ComId::new(IDISPATCH)]
    );
}

#[test]
fn rerun_converges_on_the_same_graph() {
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("graph.db");
    let source = inventory(classes());

    let first = {
        let mut prober = InProcessProber::new(activator());
        let mut store = SqliteGraphStore::open(&db_path).expect("open");
        Driver::new(&mut prober, &mut store).run(&source, &RunOptions::default()).expect("run 1");
        store.counts().unwrap()
    };

    let mut prober = InProcessProber::new(activator());
    let mut store = SqliteGraphStore::open(&db_path).expect("reopen");
    let summary =
        Driver::new(&mut prober, &mut store).run(&source, &RunOptions::default()).expect("run 2");

    assert_eq!(store.counts().unwrap(), first);
    assert_eq!(first, GraphCounts { classes: 3, interfaces: 3, edges: 5 });
    assert_eq!(summary.classes_created, 0);
    assert_eq!(summary.edges_created, 0);
    assert_eq!(summary.edges_existing, 5);
}

#[test]
fn resume_processes_only_later_identifiers() {
    let source = inventory(classes());
    let mut prober = InProcessProber::new(activator());
    let mut store = SqliteGraphStore::open_in_memory().expect("store");

    // Lowercase, unbraced resume id canonicalizes to SAMPLE.
    let options = RunOptions::resume_after("aaaaaaaa-0000-0000-0000-000000000001");
    let summary = Driver::new(&mut prober, &mut store).run(&source, &options).expect("run");

    assert_eq!(summary.skipped_before_resume, 1);
    assert_eq!(summary.visited, 2);
    assert!(store.class_node(&ComId::new(SAMPLE)).unwrap().is_none());
    assert!(store.class_node(&ComId::new(SECOND)).unwrap().is_some());
    assert!(store.class_node(&ComId::new(THIRD)).unwrap().is_some());
}

#[test]
fn resume_from_id_not_in_inventory_uses_ordering() {
    let source = inventory(classes());
    let mut prober = InProcessProber::new(activator());
    let mut store = SqliteGraphStore::open_in_memory().expect("store");

    let options = RunOptions::resume_after("{AAAAAAAA-0000-0000-0000-000000000002}X");
    let summary = Driver::new(&mut prober, &mut store).run(&source, &options).expect("run");
    assert_eq!(summary.visited, 1);
    assert_eq!(summary.last_visited, Some(ComId::new(THIRD)));
}

#[test]
fn failing_classes_do_not_block_later_ones() {
    let broken = "{00000000-0000-0000-0000-0000000000B0}";
    let activator = activator().failing(broken);
    let source = inventory(vec![
        ClassRecord::new(broken),
        ClassRecord::new("not-a-guid"),
        ClassRecord::new("{00000000-0000-0000-0000-0000000000C0}"),
        ClassRecord::new(SAMPLE),
    ]);
    let mut prober = InProcessProber::new(activator);
    let mut store = SqliteGraphStore::open_in_memory().expect("store");

    let mut driver = Driver::new(&mut prober, &mut store);
    let summary = driver.run(&source, &RunOptions::default()).expect("run");
    assert_eq!(driver.state(), &DriverState::Finished);

    assert_eq!(summary.visited, 4);
    assert_eq!(summary.instantiation_failed, 1);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.not_activatable, 1);
    assert_eq!(summary.projected, 1);
    assert_eq!(store.counts().unwrap().classes, 1);
}

#[test]
fn class_without_supported_interfaces_writes_nothing() {
    let mute = "{AAAAAAAA-0000-0000-0000-0000000000FF}";
    let source = inventory(vec![ClassRecord::new(mute)]);
    let mut prober = InProcessProber::new(ScriptedActivator::new().supports(mute, &[]));
    let mut store = SqliteGraphStore::open_in_memory().expect("store");

    let summary =
        Driver::new(&mut prober, &mut store).run(&source, &RunOptions::default()).expect("run");
    assert_eq!(summary.empty, 1);
    assert_eq!(store.counts().unwrap(), GraphCounts::default());
}

#[test]
fn declined_interfaces_never_become_edges() {
    let source = inventory(vec![ClassRecord::new(SECOND)]);
    let mut prober = InProcessProber::new(activator());
    let mut store = SqliteGraphStore::open_in_memory().expect("store");

    Driver::new(&mut prober, &mut store).run(&source, &RunOptions::default()).expect("run");
    assert_eq!(store.implemented_by(&ComId::new(SECOND)).unwrap(), vec![ComId::new(IUNKNOWN)]);
}

#[test]
fn checkpoint_records_progress_and_resumes_after_last_completed() {
    let dir = tempdir().expect("tempdir");
    let checkpoint_path = dir.path().join("checkpoint.json");
    let source = inventory(classes());

    {
        let mut prober = InProcessProber::new(activator());
        let mut store = SqliteGraphStore::open_in_memory().expect("store");
        let mut checkpoint = CheckpointFile::open(&checkpoint_path).expect("checkpoint");
        Driver::new(&mut prober, &mut store)
            .with_checkpoint(&mut checkpoint)
            .run(&source, &RunOptions::default())
            .expect("run");
    }

    let state = CheckpointFile::load(&checkpoint_path).unwrap().expect("written");
    assert!(!state.crashed());
    assert_eq!(state.resume_point(), Some(&ComId::new(THIRD)));
    assert!(state.inventory_fingerprint.is_some());

    let mut prober = InProcessProber::new(activator());
    let mut store = SqliteGraphStore::open_in_memory().expect("store");
    let options = RunOptions { start_after: state.resume_point().cloned() };
    let summary = Driver::new(&mut prober, &mut store).run(&source, &options).expect("resume");
    assert_eq!(summary.visited, 0);
    assert_eq!(summary.skipped_before_resume, 3);
}

/// Memory store that refuses to create one particular class node.
struct RefusingStore {
    refused: ComId,
    inner: MemoryGraphStore,
}

impl GraphStore for RefusingStore {
    fn create_class(&mut self, node: &ClassNode) -> GraphResult<WriteOutcome> {
        if node.clsid == self.refused {
            return Err(GraphError::Transport("connection reset".into()));
        }
        self.inner.create_class(node)
    }

    fn create_interface(&mut self, node: &InterfaceNode) -> GraphResult<WriteOutcome> {
        self.inner.create_interface(node)
    }

    fn merge_implements(&mut self, clsid: &ComId, iid: &ComId) -> GraphResult<WriteOutcome> {
        self.inner.merge_implements(clsid, iid)
    }

    fn describe(&self) -> String {
        "refusing".into()
    }
}

#[test]
fn projection_failure_does_not_block_later_classes() {
    let source = inventory(classes());
    let mut prober = InProcessProber::new(activator());
    let mut store = RefusingStore { refused: ComId::new(SAMPLE), inner: MemoryGraphStore::new() };

    let mut driver = Driver::new(&mut prober, &mut store);
    let summary = driver.run(&source, &RunOptions::default()).expect("run");
    assert_eq!(driver.state(), &DriverState::Finished);

    assert_eq!(summary.visited, 3);
    assert_eq!(summary.projection_failed, 1);
    assert_eq!(summary.projected, 2);

    let graph = &store.inner;
    assert!(graph.class(&ComId::new(SAMPLE)).is_none());
    assert!(graph.class(&ComId::new(SECOND)).is_some());
    assert!(graph.has_edge(&ComId::new(SECOND), &ComId::new(IUNKNOWN)));
    assert!(graph.has_edge(&ComId::new(THIRD), &ComId::new(IPERSIST)));
    // SAMPLE alone would have brought in IDispatch.
    assert!(graph.interface(&ComId::new(IDISPATCH)).is_none());
    assert_eq!(graph.edges().count(), 3);
}
