//! Client-resident real-time synchronization core for the stayloop
//! rental marketplace: conversation directory, per-conversation message
//! timelines with optimistic send reconciliation, notification feed,
//! typing presence and live push-channel plumbing.

pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod live;
pub mod models;
pub mod presence;
pub mod runtime;
pub mod store;
pub mod tracing_setup;
pub mod worker;

pub use backend::{ApiError, BackendClient, Subscription};
pub use config::CoreConfig;
pub use error::SyncError;
pub use live::LiveEvent;
pub use models::{Conversation, Message, MessageStatus, Notification, NotificationKind};
pub use runtime::{SyncHandle, SyncRuntime};
pub use worker::{SyncCommand, SyncUpdate};
