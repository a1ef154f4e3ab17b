//! Scriptable in-memory order store.

use billing_queue_core::order::Order;
use billing_queue_core::order_store::{OrderStore, OrderStoreError};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct State {
    orders: Vec<Order>,
    failures: VecDeque<OrderStoreError>,
    create_calls: usize,
    create_delay: Option<Duration>,
    list_delay: Option<Duration>,
}

/// In-memory [`OrderStore`] with queued failures.
///
/// Each call to [`fail_next`](Self::fail_next) makes exactly one future
/// `create_order` call fail; after that, calls succeed again.
#[derive(Clone, Default)]
pub struct MockOrderStore {
    state: Arc<Mutex<State>>,
}

impl MockOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queue one failure for the next `create_order` call.
    pub fn fail_next(&self, error: OrderStoreError) {
        self.state().failures.push_back(error);
    }

    /// Make every `create_order` call sleep for `delay` first.
    pub fn delay_creates(&self, delay: Duration) {
        self.state().create_delay = Some(delay);
    }

    /// Make every `list_orders` call sleep for `delay` first.
    pub fn delay_lists(&self, delay: Duration) {
        self.state().list_delay = Some(delay);
    }

    /// Orders successfully stored, in insertion order.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.state().orders.clone()
    }

    /// Number of `create_order` calls, successful or not.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }
}

impl std::fmt::Debug for MockOrderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MockOrderStore")
            .field("orders", &state.orders.len())
            .field("create_calls", &state.create_calls)
            .finish()
    }
}

impl OrderStore for MockOrderStore {
    fn create_order(
        &self,
        order: &Order,
    ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
        let order = order.clone();

        Box::pin(async move {
            let delay = {
                let mut state = self.state();
                state.create_calls += 1;
                state.create_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state();
            if let Some(err) = state.failures.pop_front() {
                return Err(err);
            }
            state.orders.push(order);
            Ok(())
        })
    }

    fn list_orders(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Order>, OrderStoreError>> + Send + '_>> {
        Box::pin(async move {
            let delay = self.state().list_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.orders())
        })
    }
}
