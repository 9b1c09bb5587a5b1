use crate::genre::FullStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Users, genres, predictions, reviews and trend snapshots.
    pub store: Arc<dyn FullStore>,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, store: Arc<dyn FullStore>) -> Self {
        Self {
            cancellation_token,
            store,
        }
    }

    /// Same store, different token. Each job run gets its own child token.
    pub fn with_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            store: Arc::clone(&self.store),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
