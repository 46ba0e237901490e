//! Replication of the alarm tree from the config/state stream.
//!
//! Records are keyed `type + path`. `config:` records carry item
//! configuration (a tombstone deletes the item), `state:` records carry
//! alarm state plus the server mode flags.

pub mod client;
pub mod command;
pub mod deletion;
pub mod engine;
pub mod listener;
pub mod liveness;
pub mod quiescence;

pub const CONFIG_PREFIX: &str = "config:";
pub const STATE_PREFIX: &str = "state:";
pub const COMMAND_PREFIX: &str = "command:";

pub use client::AlarmClient;
pub use command::{AlarmCommand, CommandPublisher};
pub use deletion::DeletionTracker;
pub use engine::{split_key, ReplicaContext, ReplicationEngine};
pub use listener::{AlarmClientListener, AlarmEvent, ListenerId, ListenerRegistry};
pub use liveness::LivenessMonitor;
pub use quiescence::BootstrapQuiescenceDetector;
