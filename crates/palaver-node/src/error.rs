use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    /// A core operation was invoked before the node had an identity.
    #[error("node not initialized")]
    NotInitialized,

    /// I/O failure on persist or read. The operation failed and state
    /// is unchanged; admission is all-or-nothing.
    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<anyhow::Error> for NodeError {
    fn from(e: anyhow::Error) -> Self {
        Self::Storage(e)
    }
}

impl From<tokio::task::JoinError> for NodeError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Storage(anyhow::anyhow!("blocking task failed: {e}"))
    }
}
