//! Shared state handed to the routers.

use billing_queue_core::order_store::OrderStore;
use billing_queue_runtime::producer::BillingProducer;
use std::sync::Arc;
use std::time::Duration;

/// How long `GET /api/orders` waits on the store before answering 504.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// State for the API gateway: the producer that publishes billing requests.
#[derive(Clone)]
pub struct GatewayState {
    /// Validates and publishes submitted bodies.
    pub producer: BillingProducer,
}

impl GatewayState {
    /// Wrap a producer.
    #[must_use]
    pub const fn new(producer: BillingProducer) -> Self {
        Self { producer }
    }
}

/// State for the billing service's read side.
#[derive(Clone)]
pub struct BillingState {
    /// Where consumed orders end up.
    pub store: Arc<dyn OrderStore>,
    /// Upper bound for one listing query.
    pub list_timeout: Duration,
}

impl BillingState {
    /// Use `store` with the default listing timeout.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            list_timeout: DEFAULT_LIST_TIMEOUT,
        }
    }

    /// Override the listing timeout.
    #[must_use]
    pub const fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }
}
