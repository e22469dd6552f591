//! SIMD watch expressions: the persisted request list, the backend
//! variable-object engine, and the expandable row tree shown in the view.

pub mod engine;
pub mod requests;
pub mod tree;

pub use engine::{WatchEngine, WatchResult};
pub use requests::WatchList;
pub use tree::{RowState, Toggle, TreeError, WatchRow, WatchTree};
