//! Core of lanescope: SIMD lane state, thread filters, per-lane watches and
//! the view protocol, on top of an abstract [`rpc::DebugSession`].

pub mod config;
pub mod error;
pub mod filter;
pub mod mask;
pub mod mi;
pub mod rpc;
pub mod snapshot;
pub mod stop;
pub mod store;
pub mod sync;
pub mod views;
pub mod watch;

pub use config::Settings;
pub use error::CoreError;
pub use rpc::{DebugSession, RpcError};
pub use snapshot::{SnapshotBuilder, StopContext};
pub use stop::StopEvent;
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use sync::ViewSync;
