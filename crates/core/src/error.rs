use thiserror::Error;

use crate::config::ConfigError;
use crate::mask::MaskError;
use crate::mi::MiParseError;
use crate::rpc::RpcError;
use crate::store::StoreError;
use crate::watch::TreeError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no active debug session")]
    NoSession,
    #[error("rpc: {0}")]
    Rpc(#[from] RpcError),
    #[error("mask: {0}")]
    Mask(#[from] MaskError),
    #[error("backend reply: {0}")]
    Parse(#[from] MiParseError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("watch tree: {0}")]
    Tree(#[from] TreeError),
    #[error("unknown breakpoint type: {0}")]
    UnknownBreakpointType(String),
    #[error("malformed view event: {0}")]
    Event(#[from] serde_json::Error),
}

impl CoreError {
    /// Transient backend races are hidden rather than reported.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(err) if err.is_transient())
    }
}
