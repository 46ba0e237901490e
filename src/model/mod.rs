//! Alarm tree entities: paths, severities, state, configuration and the tree.

pub mod config;
pub mod path;
pub mod severity;
pub mod state;
pub mod tree;

pub use config::{EnabledState, ItemConfig, LeafConfig, TitleDetail, TitleDetailDelay};
pub use path::{make_path, AlarmTreePath};
pub use severity::SeverityLevel;
pub use state::{BasicState, ClientState};
pub use tree::{AlarmTree, AlarmTreeItem, ItemId, ItemKind};
