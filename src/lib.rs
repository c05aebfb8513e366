//! kubesnap - live mirror of the snapshot manager's cluster state
//!
//! Keeps volumes, snapshots, per-cluster PV listings and debug sections in
//! sync with the server over one persistent channel, with a persisted,
//! case-insensitive volume filter on top.

pub mod channel;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event_log;
pub mod message;
pub mod model;
pub mod names;
pub mod persist;
pub mod store;

pub use channel::{Channel, ChannelState, MockTransport, ReconnectConfig, Transport, WsTransport};
pub use client::{ClientCommand, ClientHandle, ClientStats, SyncClient};
pub use config::ClientConfig;
pub use dispatch::{dispatch, dispatch_text, DispatchOutcome};
pub use error::{FixSuggestion, Result, SyncError};
pub use event_log::{Event, RecentEvents, MAX_RECENT_EVENTS};
pub use message::{InboundEvent, OutboundCommand};
pub use model::{DebugInfo, DebugSection, PersistentVolume, Volume, VolumeMap, VolumeTagBag};
pub use names::{better_name, resolve};
pub use persist::{FileFilterStorage, FilterStorage, MemoryFilterStorage};
pub use store::{filter_volumes, Store};
