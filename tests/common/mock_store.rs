//! Mock BatchWriteStore for testing.
//!
//! Records every bulk write call for assertions and answers from a script
//! of responses, or randomly when built with [`MockStore::chaotic`].
//! Whatever a response does not report as unprocessed is applied to an
//! inner `MemoryStore`, so final table state can be checked too.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Mutex;
use stream_replicator::request::WriteRequest;
use stream_replicator::store::{BatchWriteStore, BoxFuture, MemoryStore, StoreError};

/// How the mock answers one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Apply everything.
    Apply,
    /// Leave the last `n` requests unprocessed, apply the rest.
    Unprocessed(usize),
    /// Fail the call without applying anything.
    Fail(String),
}

struct Chaos {
    rng: StdRng,
    fail_rate: f64,
    unprocessed_rate: f64,
}

/// Mock implementation of BatchWriteStore that records all calls.
///
/// # Example
/// ```rust,ignore
/// let mock = MockStore::scripted([Response::Fail("throttled".into()), Response::Apply]);
///
/// // Use in tests...
///
/// assert_eq!(mock.call_count(), 2);
/// ```
pub struct MockStore {
    inner: MemoryStore,
    script: Mutex<VecDeque<Response>>,
    chaos: Option<Mutex<Chaos>>,
    calls: Mutex<Vec<Vec<WriteRequest>>>,
}

impl MockStore {
    /// A store that applies every call.
    pub fn new() -> Self {
        Self::scripted([])
    }

    /// Answer calls from `responses` in order, then apply everything.
    pub fn scripted(responses: impl IntoIterator<Item = Response>) -> Self {
        Self {
            inner: MemoryStore::new(["id"]),
            script: Mutex::new(responses.into_iter().collect()),
            chaos: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail calls and drop individual requests at random, reproducibly.
    pub fn chaotic(seed: u64, fail_rate: f64, unprocessed_rate: f64) -> Self {
        Self {
            chaos: Some(Mutex::new(Chaos {
                rng: StdRng::seed_from_u64(seed),
                fail_rate,
                unprocessed_rate,
            })),
            ..Self::new()
        }
    }

    /// Table state after all applied writes.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Vec<WriteRequest>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn respond(&self, requests: &[WriteRequest]) -> Response {
        if let Some(chaos) = &self.chaos {
            let mut chaos = chaos.lock().unwrap();
            let fail_rate = chaos.fail_rate;
            if chaos.rng.gen_bool(fail_rate) {
                return Response::Fail("injected failure".to_string());
            }
            let unprocessed_rate = chaos.unprocessed_rate;
            let dropped = requests
                .iter()
                .filter(|_| chaos.rng.gen_bool(unprocessed_rate))
                .count();
            return Response::Unprocessed(dropped);
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Response::Apply)
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchWriteStore for MockStore {
    fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> BoxFuture<'_, Vec<WriteRequest>> {
        self.calls.lock().unwrap().push(requests.clone());

        let result = match self.respond(&requests) {
            Response::Apply => self.inner.apply(table, &requests).map(|()| Vec::new()),
            Response::Unprocessed(n) => {
                let split = requests.len().saturating_sub(n);
                let (applied, unprocessed) = requests.split_at(split);
                self.inner
                    .apply(table, applied)
                    .map(|()| unprocessed.to_vec())
            }
            Response::Fail(message) => Err(StoreError::new(message)),
        };
        Box::pin(async move { result })
    }
}
