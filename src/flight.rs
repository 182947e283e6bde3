//! Call Coalescing
//!
//! Deduplicates concurrent identical computations: while a computation for a
//! key is in flight, later callers for that key wait for its result instead of
//! starting their own.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use tracing::trace;

// == In-Flight Call ==
#[derive(Debug)]
struct InFlightCall<T> {
    result: OnceCell<T>,
}

// == Call Coalescer ==
/// Single-flight group keyed by string.
///
/// At most one in-flight record exists per key. The lock only guards the map
/// bookkeeping; `compute` always runs without it, so unrelated keys never
/// contend. There is no wait timeout here: bounding latency is left to the
/// computation itself.
#[derive(Debug)]
pub struct CallCoalescer<T> {
    calls: Mutex<HashMap<String, Arc<InFlightCall<T>>>>,
}

impl<T> Default for CallCoalescer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CallCoalescer<T> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with a computation in flight.
    pub fn in_flight(&self) -> usize {
        self.calls().len()
    }

    fn calls(&self) -> MutexGuard<'_, HashMap<String, Arc<InFlightCall<T>>>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> CallCoalescer<T> {
    // == Run ==
    /// Runs `compute` for `key` unless a call for `key` is already in flight,
    /// in which case the caller waits and receives that call's result.
    ///
    /// Every caller attached to one in-flight call observes the same value.
    /// If the caller that is computing gets cancelled, one of the waiters
    /// takes the computation over.
    pub async fn run<F, Fut>(&self, key: &str, compute: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let call = {
            let mut calls = self.calls();
            match calls.get(key) {
                Some(call) => {
                    trace!(key = %key, "joining in-flight call");
                    Arc::clone(call)
                }
                None => {
                    let call = Arc::new(InFlightCall {
                        result: OnceCell::new(),
                    });
                    calls.insert(key.to_string(), Arc::clone(&call));
                    call
                }
            }
        };

        let result = call.result.get_or_init(compute).await.clone();

        // The first caller to see the finished result retires the record
        let mut calls = self.calls();
        if calls
            .get(key)
            .map(|current| Arc::ptr_eq(current, &call))
            .unwrap_or(false)
        {
            calls.remove(key);
        }
        result
    }
}
