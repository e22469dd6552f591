pub mod filter;
pub mod messages;
pub mod snapshot;
pub mod symbols;
pub mod watch;

pub use filter::{LaneSentinel, ThreadFilter};
pub use messages::{CoreMessage, ViewEvent, ViewKind};
pub use snapshot::{Lane, LaneRef, LaneState, SimdSnapshot, ThreadRow, WorkGroup};
pub use symbols::LaneSymbols;
pub use watch::{VariableNode, WatchRequest};
