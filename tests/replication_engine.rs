use std::sync::Arc;
use std::time::Duration;

use alarm_replica::replication::{ReplicaContext, ReplicationEngine};
use alarm_replica::{AlarmClientListener, AlarmTreeItem, AlarmTreePath, MemoryBroker, SeverityLevel};
use parking_lot::Mutex;

#[derive(Default)]
struct Recorder {
  events: Mutex<Vec<String>>,
}

impl Recorder {
  fn take(&self) -> Vec<String> {
    std::mem::take(&mut *self.events.lock())
  }
}

impl AlarmClientListener for Recorder {
  fn server_mode_changed(&self, maintenance_mode: bool) {
    self.events.lock().push(format!("mode {maintenance_mode}"));
  }

  fn server_disable_notify_changed(&self, disable_notify: bool) {
    self
      .events
      .lock()
      .push(format!("disable_notify {disable_notify}"));
  }

  fn item_added(&self, item: &AlarmTreeItem) {
    let kind = if item.is_leaf() { "leaf" } else { "node" };
    self
      .events
      .lock()
      .push(format!("added {kind} {}", item.path));
  }

  fn item_removed(&self, item: &AlarmTreeItem) {
    self.events.lock().push(format!("removed {}", item.path));
  }

  fn item_updated(&self, item: &AlarmTreeItem) {
    self.events.lock().push(format!("updated {}", item.path));
  }
}

fn engine(root: &str) -> (ReplicationEngine, Arc<Recorder>) {
  let context = Arc::new(ReplicaContext::new(root));
  let recorder = Arc::new(Recorder::default());
  context.listeners().add(recorder.clone());
  (
    ReplicationEngine::new(context, Duration::from_secs(10)),
    recorder,
  )
}

fn leaf_state(severity: &str) -> String {
  format!(
    r#"{{"severity":"{severity}","message":"HIHI","value":"7.5","time":{{"seconds":1700000000,"nano":500}},
        "current_severity":"{severity}","current_message":"HIHI"}}"#
  )
}

fn names(items: Option<Vec<AlarmTreeItem>>) -> Vec<String> {
  items
    .expect("known path")
    .iter()
    .map(|item| item.name().to_string())
    .collect()
}

#[test]
fn tree_reconstruction_scenario() {
  let (mut engine, recorder) = engine("Acc");

  engine.handle_record("config:Acc/Group1", Some("{}"));
  assert_eq!(
    recorder.take(),
    ["added node /Acc/Group1", "updated /Acc/Group1"]
  );

  engine.handle_record("config:Acc/Group1/PV1", Some(r#"{"description":"x"}"#));
  assert_eq!(
    recorder.take(),
    ["added leaf /Acc/Group1/PV1", "updated /Acc/Group1/PV1"]
  );

  let context = Arc::clone(engine.context());
  assert!(context
    .find_node(&AlarmTreePath::parse("Acc/Group1/PV1"))
    .expect("find")
    .is_some());
  assert_eq!(
    names(context.children(&AlarmTreePath::parse("Acc/Group1")).expect("children")),
    ["PV1"]
  );

  engine.handle_record("config:Acc/Group1/PV1", None);
  assert_eq!(recorder.take(), ["removed /Acc/Group1/PV1"]);
  assert!(context
    .find_node(&AlarmTreePath::parse("Acc/Group1/PV1"))
    .expect("find")
    .is_none());
  assert!(names(context.children(&AlarmTreePath::parse("/Acc/Group1")).expect("children")).is_empty());
}

#[test]
fn replaying_the_same_log_twice_is_idempotent() {
  let log: Vec<(&str, Option<String>)> = vec![
    ("config:/Acc/Vac", Some("{}".to_string())),
    (
      "config:/Acc/Vac/PV1",
      Some(r#"{"description":"Pressure","delay":3}"#.to_string()),
    ),
    ("config:/Acc/Vac/PV2", Some(r#"{"description":"Valve"}"#.to_string())),
    ("state:/Acc/Vac/PV1", Some(leaf_state("MAJOR"))),
    ("state:/Acc/Vac", Some(r#"{"severity":"MAJOR"}"#.to_string())),
    ("config:/Acc/Vac/PV2", None),
  ];

  let (mut engine, recorder) = engine("Acc");
  for (key, value) in &log {
    engine.handle_record(key, value.as_deref());
  }
  let first = recorder.take();
  assert!(first.contains(&"removed /Acc/Vac/PV2".to_string()));
  let before: Vec<AlarmTreeItem> = engine
    .context()
    .children(&AlarmTreePath::parse("/Acc/Vac"))
    .expect("children")
    .expect("vac");

  for (key, value) in &log {
    engine.handle_record(key, value.as_deref());
  }
  let after: Vec<AlarmTreeItem> = engine
    .context()
    .children(&AlarmTreePath::parse("/Acc/Vac"))
    .expect("children")
    .expect("vac");

  assert_eq!(before, after);
  assert_eq!(engine.context().item_count(), 3);
  // PV2 comes back from its config record and goes again with the tombstone.
  assert_eq!(
    recorder.take(),
    [
      "added leaf /Acc/Vac/PV2",
      "updated /Acc/Vac/PV2",
      "removed /Acc/Vac/PV2"
    ]
  );
}

#[test]
fn tombstone_precedes_stale_state() {
  let (mut engine, recorder) = engine("Acc");
  engine.handle_record("config:/Acc/PV", Some(r#"{"description":"x"}"#));
  engine.handle_record("config:/Acc/PV", None);
  recorder.take();

  engine.handle_record("state:/Acc/PV", Some(&leaf_state("MAJOR")));
  assert!(recorder.take().is_empty());
  assert!(engine
    .context()
    .find_node(&AlarmTreePath::parse("/Acc/PV"))
    .expect("find")
    .is_none());

  engine.handle_record("config:/Acc/PV", Some(r#"{"description":"x"}"#));
  engine.handle_record("state:/Acc/PV", Some(&leaf_state("MINOR")));
  assert_eq!(
    recorder.take(),
    ["added leaf /Acc/PV", "updated /Acc/PV", "updated /Acc/PV"]
  );
  let pv = engine
    .context()
    .find_node(&AlarmTreePath::parse("/Acc/PV"))
    .expect("find")
    .expect("pv");
  assert_eq!(pv.severity(), SeverityLevel::Minor);
  assert!(!engine
    .deletion_tracker()
    .contains(&AlarmTreePath::parse("/Acc/PV")));
}

#[test]
fn delete_of_unknown_path_is_silent_and_blocks_state() {
  let (mut engine, recorder) = engine("Acc");
  engine.handle_record("config:/Acc/Never/Seen", None);
  assert!(recorder.take().is_empty());
  assert_eq!(engine.deletion_tracker().len(), 1);

  engine.handle_record("state:/Acc/Never/Seen", Some(&leaf_state("MAJOR")));
  assert!(recorder.take().is_empty());
  assert_eq!(engine.context().item_count(), 1);
}

#[test]
fn state_may_be_the_first_sighting() {
  let (mut engine, recorder) = engine("Acc");
  engine.handle_record("state:/Acc/Area/PV9", Some(&leaf_state("MINOR_ACK")));
  assert_eq!(
    recorder.take(),
    [
      "added node /Acc/Area",
      "added leaf /Acc/Area/PV9",
      "updated /Acc/Area/PV9"
    ]
  );
  let pv = engine
    .context()
    .find_node(&AlarmTreePath::parse("/Acc/Area/PV9"))
    .expect("find")
    .expect("pv");
  let state = pv.client_state().expect("leaf state");
  assert_eq!(state.severity, SeverityLevel::MinorAck);
  assert_eq!(state.value, "7.5");
}

#[test]
fn server_flags_fire_once_per_edge() {
  let (mut engine, recorder) = engine("Acc");
  let maintenance = r#"{"severity":"OK","mode":"maintenance","notify":"disabled"}"#;
  engine.handle_record("state:/Acc", Some(maintenance));
  engine.handle_record("state:/Acc", Some(maintenance));
  assert_eq!(recorder.take(), ["mode true", "disable_notify true"]);
  assert!(engine.context().is_maintenance_mode());
  assert!(engine.context().is_disable_notify());

  engine.handle_record("state:/Acc", Some(r#"{"severity":"OK","mode":"normal","notify":"enabled"}"#));
  assert_eq!(recorder.take(), ["mode false", "disable_notify false"]);
}

#[test]
fn node_state_is_stored_as_delivered() {
  let (mut engine, recorder) = engine("Acc");
  engine.handle_record("config:/Acc/G/PV", Some(r#"{"description":"x"}"#));
  recorder.take();

  engine.handle_record("state:/Acc/G/PV", Some(&leaf_state("MAJOR")));
  engine.handle_record("state:/Acc/G", Some(r#"{"severity":"MINOR"}"#));
  assert_eq!(recorder.take(), ["updated /Acc/G/PV", "updated /Acc/G"]);

  let group = engine
    .context()
    .find_node(&AlarmTreePath::parse("/Acc/G"))
    .expect("find")
    .expect("group");
  assert_eq!(group.severity(), SeverityLevel::Minor);
}

#[test]
fn malformed_records_do_not_stop_the_batch() {
  let broker = MemoryBroker::new();
  broker.append("Acc", "garbage", Some("{}"));
  broker.append("Acc", "config:/Acc/A", Some("{"));
  broker.append("Acc", "config:/Acc/B", Some(r#"{"description":"b","delay":-1}"#));
  broker.append("Acc", "config:/Acc/C", Some("{}"));

  let mut consumer = broker.consumer(["Acc"]);
  let records = alarm_replica::LogConsumer::poll(&mut consumer, Duration::from_millis(10))
    .expect("poll");
  assert_eq!(records.len(), 4);

  let (mut engine, recorder) = engine("Acc");
  engine.apply_batch(&records);
  assert_eq!(recorder.take(), ["added node /Acc/C", "updated /Acc/C"]);
}
