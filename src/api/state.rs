//! API shared state

use std::sync::Arc;

use crate::aggregator::MetricsAggregator;
use crate::storage::MetricsStore;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub aggregator: MetricsAggregator,

    /// Store handle for health reporting
    pub store: Arc<dyn MetricsStore>,
}

impl ApiState {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self {
            aggregator: MetricsAggregator::new(store.clone()),
            store,
        }
    }
}
