//! Lazy, shared, replayed discovery results.
//!
//! A [`SingleFlight`] hands out [`Discovery`] observers. All observers of one
//! attempt share a single future: the first one to be polled starts the
//! transport call, everyone else attaches to it, and the outcome (success or
//! failure) is replayed to observers arriving later. The cache only holds a
//! weak reference to the attempt, so once the last observer is dropped the
//! next call starts over. Starting over after a successful attempt begins a
//! new generation, so values from the released attempt report stale.
//!
//! A gate serializes attempts, so even after [`SingleFlight::invalidate`]
//! there is never more than one transport call in flight per cache.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future::{BoxFuture, Shared};
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};

use crate::error::Result;

type SharedResult<T> = Shared<BoxFuture<'static, Result<Arc<[T]>>>>;

/// Identifies the cache generation a value was produced by.
#[derive(Debug, Clone)]
pub(crate) struct Epoch {
    counter: Arc<AtomicU64>,
    generation: u64,
}

impl Epoch {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the cache was invalidated after this value was produced.
    pub(crate) fn is_stale(&self) -> bool {
        self.counter.load(Ordering::Acquire) != self.generation
    }
}

struct Flight<T> {
    epoch: Epoch,
    shared: SharedResult<T>,
}

/// One observer of a discovery attempt.
///
/// Holding a `Discovery` keeps the attempt (and its cached result) alive.
/// Cloning adds another observer of the same attempt.
pub struct Discovery<T> {
    flight: Arc<Flight<T>>,
}

impl<T> Clone for Discovery<T> {
    fn clone(&self) -> Self {
        Self {
            flight: Arc::clone(&self.flight),
        }
    }
}

impl<T> fmt::Debug for Discovery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Discovery")
            .field("generation", &self.flight.epoch.generation)
            .field("complete", &self.flight.shared.peek().is_some())
            .finish()
    }
}

impl<T> Discovery<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wait for the attempt to finish and return the full list.
    ///
    /// Starts the attempt if no observer has polled it yet.
    pub async fn result(&self) -> Result<Arc<[T]>> {
        self.flight.shared.clone().await
    }

    /// Consume the observer as a stream yielding each discovered item in
    /// order, or a single error if the attempt failed.
    pub fn into_stream(self) -> BoxStream<'static, Result<T>> {
        stream::once(async move { self.result().await })
            .flat_map(|outcome| match outcome {
                Ok(items) => stream::iter(items.iter().cloned().map(Ok).collect::<Vec<_>>()).boxed(),
                Err(e) => stream::iter([Err(e)]).boxed(),
            })
            .boxed()
    }

    /// The cache generation this attempt belongs to.
    pub fn generation(&self) -> u64 {
        self.flight.epoch.generation
    }

    /// Whether the cache was invalidated after this attempt began.
    pub fn is_stale(&self) -> bool {
        self.flight.epoch.is_stale()
    }

    /// Whether the attempt has finished, successfully or not.
    pub fn is_complete(&self) -> bool {
        self.flight.shared.peek().is_some()
    }
}

struct Slot<T> {
    current: Weak<Flight<T>>,
    // Set once the attempt in `current` produced values.
    delivered: Option<Arc<AtomicBool>>,
}

/// Cache producing shared [`Discovery`] observers.
pub(crate) struct SingleFlight<T> {
    slot: Mutex<Slot<T>>,
    counter: Arc<AtomicU64>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot {
                current: Weak::new(),
                delivered: None,
            }),
            counter: Arc::new(AtomicU64::new(0)),
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

impl<T> fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("generation", &self.generation())
            .field("observed", &self.is_observed())
            .finish()
    }
}

impl<T> SingleFlight<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Detach the current attempt and bump the generation. Returns the new
    /// generation.
    pub(crate) fn invalidate(&self) -> u64 {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.current = Weak::new();
        slot.delivered = None;
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn generation(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    pub(crate) fn current_epoch(&self) -> Epoch {
        Epoch {
            counter: Arc::clone(&self.counter),
            generation: self.generation(),
        }
    }

    /// Whether some observer is keeping an attempt alive.
    pub(crate) fn is_observed(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.current.strong_count() > 0
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Attach to the live attempt, or create a new one with `start`.
    ///
    /// `start` only builds the future; nothing runs until an observer polls.
    pub(crate) fn observe<F, Fut>(&self, start: F) -> Discovery<T>
    where
        F: FnOnce(Epoch) -> Fut,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(flight) = slot.current.upgrade() {
            if !flight.epoch.is_stale() {
                return Discovery { flight };
            }
        }

        // The released attempt handed out values; they belong to an older
        // generation than whatever this attempt produces.
        if slot
            .delivered
            .take()
            .is_some_and(|delivered| delivered.load(Ordering::Acquire))
        {
            self.counter.fetch_add(1, Ordering::AcqRel);
        }

        let epoch = self.current_epoch();
        let call = start(epoch.clone());
        let gate = Arc::clone(&self.gate);
        let delivered = Arc::new(AtomicBool::new(false));
        let marker = Arc::clone(&delivered);
        let shared = async move {
            let _in_flight = gate.lock_owned().await;
            let outcome = call.await.map(Arc::<[T]>::from);
            if outcome.is_ok() {
                marker.store(true, Ordering::Release);
            }
            outcome
        }
        .boxed()
        .shared();

        let flight = Arc::new(Flight { epoch, shared });
        slot.current = Arc::downgrade(&flight);
        slot.delivered = Some(delivered);
        Discovery { flight }
    }
}
