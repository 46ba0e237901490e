//! Alarm client: background replication thread plus the synchronous API
//! used by tools and displays.
//!
//! Writes (new items, deletes, commands) are only published. They become
//! visible in the local tree once they come back through the log.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::command::{AlarmCommand, CommandPublisher};
use super::engine::{ReplicaContext, ReplicationEngine};
use super::listener::{AlarmClientListener, ListenerId};
use super::quiescence::BootstrapQuiescenceDetector;
use crate::config::AlarmClientOptions;
use crate::error::{AlarmError, Result};
use crate::model::{make_path, AlarmTreeItem, AlarmTreePath, ItemConfig, LeafConfig};
use crate::transport::{LogConsumer, MemoryBroker, RecordProducer, Wakeup};

enum WorkerState {
  Idle {
    consumer: Box<dyn LogConsumer>,
    engine: ReplicationEngine,
  },
  Running {
    wakeup: Arc<dyn Wakeup>,
    join: JoinHandle<()>,
    done_rx: Receiver<()>,
  },
  Stopped,
}

pub struct AlarmClient {
  options: AlarmClientOptions,
  context: Arc<ReplicaContext>,
  publisher: CommandPublisher,
  running: Arc<AtomicBool>,
  worker: Mutex<WorkerState>,
}

impl std::fmt::Debug for AlarmClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AlarmClient")
      .field("config_name", &self.options.config_name)
      .field("running", &self.is_running())
      .finish()
  }
}

impl AlarmClient {
  /// Create a client reading the config/state stream through `consumer` and
  /// publishing through `producer`. Nothing is consumed before [`start`].
  ///
  /// [`start`]: AlarmClient::start
  pub fn new(
    options: AlarmClientOptions,
    consumer: Box<dyn LogConsumer>,
    producer: Arc<dyn RecordProducer>,
  ) -> Result<Self> {
    options.validate()?;
    let context = Arc::new(ReplicaContext::new(&options.config_name));
    let engine = ReplicationEngine::new(Arc::clone(&context), options.idle_timeout);
    let publisher = CommandPublisher::new(
      producer,
      options.config_topic(),
      options.command_topic(),
      options.identity.clone(),
    );
    Ok(Self {
      options,
      context,
      publisher,
      running: Arc::new(AtomicBool::new(false)),
      worker: Mutex::new(WorkerState::Idle { consumer, engine }),
    })
  }

  /// Client wired to an in-process broker.
  pub fn with_memory_broker(options: AlarmClientOptions, broker: &MemoryBroker) -> Result<Self> {
    let consumer = broker.consumer([options.config_topic()]);
    Self::new(options, Box::new(consumer), Arc::new(broker.producer()))
  }

  pub fn options(&self) -> &AlarmClientOptions {
    &self.options
  }

  pub fn root_name(&self) -> &str {
    &self.options.config_name
  }

  pub fn add_listener(&self, listener: Arc<dyn AlarmClientListener>) -> ListenerId {
    self.context.listeners().add(listener)
  }

  pub fn remove_listener(&self, id: ListenerId) -> Result<()> {
    self.context.listeners().remove(id)
  }

  pub fn root(&self) -> Option<AlarmTreeItem> {
    self.context.root()
  }

  pub fn find_node(&self, path: impl Into<AlarmTreePath>) -> Result<Option<AlarmTreeItem>> {
    self.context.find_node(&path.into())
  }

  pub fn children(&self, path: impl Into<AlarmTreePath>) -> Result<Option<Vec<AlarmTreeItem>>> {
    self.context.children(&path.into())
  }

  pub fn is_maintenance_mode(&self) -> bool {
    self.context.is_maintenance_mode()
  }

  pub fn is_disable_notify(&self) -> bool {
    self.context.is_disable_notify()
  }

  /// Detector of the end of the initial load, fed by this client's events.
  pub fn quiescence_detector(
    &self,
    initial_timeout: Duration,
    idle_timeout: Duration,
  ) -> BootstrapQuiescenceDetector {
    BootstrapQuiescenceDetector::new(
      Arc::clone(self.context.listeners()),
      initial_timeout,
      idle_timeout,
    )
  }

  fn item_path(&self, parent_path: &str, name: &str) -> Result<AlarmTreePath> {
    let path = make_path(parent_path, name);
    if name.is_empty() || path.root_name() != Some(self.root_name()) {
      return Err(AlarmError::InvalidPath {
        root: self.root_name().to_string(),
        path: path.to_string(),
      });
    }
    Ok(path)
  }

  /// Request a new node below `parent_path`.
  pub fn add_component(&self, parent_path: &str, name: &str) -> Result<()> {
    let path = self.item_path(parent_path, name)?;
    self.send_item_configuration_update(&path, &ItemConfig::default(), None)
  }

  /// Request a new leaf below `parent_path`.
  pub fn add_pv(&self, parent_path: &str, name: &str) -> Result<()> {
    let path = self.item_path(parent_path, name)?;
    self.send_item_configuration_update(
      &path,
      &ItemConfig::default(),
      Some(&LeafConfig::default()),
    )
  }

  pub fn send_item_configuration_update(
    &self,
    path: &AlarmTreePath,
    config: &ItemConfig,
    leaf: Option<&LeafConfig>,
  ) -> Result<()> {
    self.publisher.send_config(path, config, leaf)
  }

  /// Delete `item` and everything below it, children first.
  pub fn remove_component(&self, item: &AlarmTreeItem) -> Result<()> {
    let mut paths = self.context.post_order_paths(&item.path)?;
    if paths.is_empty() {
      paths.push(item.path.clone());
    }
    for path in &paths {
      self.publisher.send_delete(path)?;
    }
    tracing::debug!(path = %item.path, items = paths.len(), "requested removal");
    Ok(())
  }

  pub fn acknowledge(&self, item: &AlarmTreeItem, acknowledge: bool) {
    self
      .publisher
      .send_command(&item.path, AlarmCommand::acknowledge(acknowledge));
  }

  pub fn set_mode(&self, maintenance: bool) {
    let root = AlarmTreePath::from_segments([self.root_name()]);
    self.publisher.send_command(&root, AlarmCommand::mode(maintenance));
  }

  pub fn set_notify(&self, disable_notify: bool) {
    let root = AlarmTreePath::from_segments([self.root_name()]);
    self
      .publisher
      .send_command(&root, AlarmCommand::notify(disable_notify));
  }

  /// Spawn the replication thread. A client starts at most once.
  pub fn start(&self) -> Result<()> {
    let mut worker = self.worker.lock();
    let (consumer, engine) = match std::mem::replace(&mut *worker, WorkerState::Stopped) {
      WorkerState::Idle { consumer, engine } => (consumer, engine),
      other => {
        *worker = other;
        return Err(AlarmError::AlreadyStarted);
      }
    };

    let wakeup = consumer.wakeup_handle();
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    self.running.store(true, Ordering::Release);
    let args = ReplicationThreadArgs {
      consumer,
      engine,
      running: Arc::clone(&self.running),
      poll_period: self.options.poll_period,
      done_tx,
    };
    let join = std::thread::Builder::new()
      .name(format!("alarm-client-{}", self.options.config_name))
      .spawn(move || replication_thread_main(args))
      .map_err(|error| {
        self.running.store(false, Ordering::Release);
        AlarmError::Io(error)
      })?;

    *worker = WorkerState::Running {
      wakeup,
      join,
      done_rx,
    };
    Ok(())
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }

  /// Stop the replication thread and release the transport. Safe to call
  /// more than once.
  pub fn shutdown(&self) {
    let state = std::mem::replace(&mut *self.worker.lock(), WorkerState::Stopped);
    match state {
      WorkerState::Running {
        wakeup,
        join,
        done_rx,
      } => {
        self.running.store(false, Ordering::Release);
        wakeup.wakeup();
        match done_rx.recv_timeout(self.options.shutdown_timeout) {
          Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            if join.join().is_err() {
              tracing::warn!(config = %self.options.config_name, "alarm client thread panicked");
            }
          }
          Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(
              config = %self.options.config_name,
              timeout = ?self.options.shutdown_timeout,
              "alarm client thread does not shut down"
            );
            detach_join(join);
          }
        }
        self.publisher.close();
      }
      WorkerState::Idle { mut consumer, .. } => {
        consumer.close();
        self.publisher.close();
      }
      WorkerState::Stopped => {}
    }
  }
}

impl Drop for AlarmClient {
  fn drop(&mut self) {
    self.shutdown();
  }
}

fn detach_join(join: JoinHandle<()>) {
  let _ = std::thread::Builder::new()
    .name("alarm-client-join".to_string())
    .spawn(move || {
      let _ = join.join();
    });
}

/// Clears the running flag and signals completion when the thread exits,
/// including on panic.
struct RunningFlagGuard {
  running: Arc<AtomicBool>,
  done_tx: Sender<()>,
}

impl Drop for RunningFlagGuard {
  fn drop(&mut self) {
    self.running.store(false, Ordering::Release);
    let _ = self.done_tx.try_send(());
  }
}

struct ReplicationThreadArgs {
  consumer: Box<dyn LogConsumer>,
  engine: ReplicationEngine,
  running: Arc<AtomicBool>,
  poll_period: Duration,
  done_tx: Sender<()>,
}

fn replication_thread_main(args: ReplicationThreadArgs) {
  let ReplicationThreadArgs {
    mut consumer,
    mut engine,
    running,
    poll_period,
    done_tx,
  } = args;
  let _running_guard = RunningFlagGuard {
    running: Arc::clone(&running),
    done_tx,
  };
  let root = engine
    .context()
    .with_tree(|tree| tree.root_name().to_string());
  tracing::info!(config = %root, "alarm client started");

  engine.check_liveness(Instant::now());
  while running.load(Ordering::Acquire) {
    match consumer.poll(poll_period) {
      Ok(records) => engine.apply_batch(&records),
      Err(error) => {
        if running.load(Ordering::Acquire) {
          tracing::error!(config = %root, error = %error, "alarm client transport failure");
        }
        break;
      }
    }
    engine.check_liveness(Instant::now());
  }

  consumer.close();
  tracing::info!(config = %root, "alarm client stopped");
}
