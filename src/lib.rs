//! Replicated alarm tree.
//!
//! Every process rebuilds its own view of the alarm configuration and live
//! alarm state by replaying and tailing a shared commit log, and publishes
//! operator requests back onto it.

pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod replication;
pub mod transport;

pub use config::{AlarmClientOptions, Identity};
pub use error::{AlarmError, Result};
pub use model::{
  AlarmTree, AlarmTreeItem, AlarmTreePath, BasicState, ClientState, EnabledState, ItemConfig,
  ItemId, ItemKind, LeafConfig, SeverityLevel, TitleDetail, TitleDetailDelay,
};
pub use replication::{
  AlarmClient, AlarmClientListener, AlarmCommand, AlarmEvent, BootstrapQuiescenceDetector,
  ListenerId,
};
pub use transport::{LogConsumer, LogRecord, MemoryBroker, RecordProducer, Wakeup};
