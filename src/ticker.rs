use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use log::debug;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::ClientError;

type Refresh<T> = Box<dyn Fn() -> BoxFuture<'static, Option<T>> + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, bool>>;

/// A snapshot of the cached value of a [`Ticker`].
#[derive(Debug)]
pub struct TickerValue<T> {
    /// The value produced by the last successful refresh.
    pub value: Option<Arc<T>>,
    /// Time elapsed since the last successful refresh; [`Duration::MAX`] if there was none.
    pub age: Duration,
}

impl<T> TickerValue<T> {
    /// Whether any refresh has succeeded so far.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

struct TickerState<T> {
    last: Option<(Arc<T>, Instant)>,
    idle: CancellationToken,
    // At most one refresh runs at a time, periodic or forced.
    in_flight: Option<(u64, InFlight)>,
    generation: u64,
    disposed: bool,
}

struct TickerInner<T> {
    name: &'static str,
    interval: Duration,
    refresh: Refresh<T>,
    state: Mutex<TickerState<T>>,
}

impl<T: Send + Sync + 'static> TickerInner<T> {
    fn state(&self) -> MutexGuard<'_, TickerState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh_once(&self) -> bool {
        match (self.refresh)().await {
            Some(value) => {
                self.state().last = Some((Arc::new(value), Instant::now()));
                debug!("{} ticker refreshed", self.name);
                true
            }
            None => {
                debug!("{} ticker refresh produced no value", self.name);
                false
            }
        }
    }
}

/// Returns the refresh in flight, or starts one. The second value tells
/// whether a new refresh was started.
fn join_or_start<T: Send + Sync + 'static>(
    inner: &Arc<TickerInner<T>>,
    state: &mut TickerState<T>,
) -> (InFlight, bool) {
    if let Some((_, in_flight)) = state.in_flight.as_ref() {
        if in_flight.peek().is_none() {
            return (in_flight.clone(), false);
        }
    }

    state.generation += 1;
    let generation = state.generation;
    let task = {
        let inner = Arc::clone(inner);
        tokio::spawn(async move { inner.refresh_once().await })
    };
    let weak = Arc::downgrade(inner);
    let in_flight = async move {
        let refreshed = task.await.unwrap_or(false);
        if let Some(inner) = weak.upgrade() {
            let mut state = inner.state();
            if state
                .in_flight
                .as_ref()
                .is_some_and(|(current, _)| *current == generation)
            {
                state.in_flight = None;
            }
        }
        refreshed
    }
    .boxed()
    .shared();
    state.in_flight = Some((generation, in_flight.clone()));
    (in_flight, true)
}

/// A value refreshed in the background every `interval`, with support for
/// coalesced out-of-band refreshes.
///
/// The refresh callback signals failure by returning [`None`]; a failed refresh
/// leaves the previously cached value and its age untouched. A refresh that
/// panics counts as failed.
pub struct Ticker<T> {
    inner: Arc<TickerInner<T>>,
    close: Once,
}

impl<T: Send + Sync + 'static> Ticker<T> {
    /// Creates the ticker and starts its periodic loop. Must be called within a tokio runtime.
    pub fn new<F, Fut>(name: &'static str, interval: Duration, refresh: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let idle = CancellationToken::new();
        let inner = Arc::new(TickerInner {
            name,
            interval,
            refresh: Box::new(move || refresh().boxed()),
            state: Mutex::new(TickerState {
                last: None,
                idle: idle.clone(),
                in_flight: None,
                generation: 0,
                disposed: false,
            }),
        });
        start_loop(Arc::downgrade(&inner), interval, idle, None);
        Self {
            inner,
            close: Once::new(),
        }
    }

    /// Returns the cached value without waiting.
    pub fn value(&self) -> Result<TickerValue<T>, ClientError> {
        let state = self.inner.state();
        if state.disposed {
            return Err(ClientError::disposed(self.inner.name));
        }
        Ok(match state.last.as_ref() {
            Some((value, at)) => TickerValue {
                value: Some(Arc::clone(value)),
                age: Instant::now().saturating_duration_since(*at),
            },
            None => TickerValue {
                value: None,
                age: Duration::MAX,
            },
        })
    }

    /// Returns the cached value, forcing a tick first if no refresh has ever succeeded.
    ///
    /// A stale value is returned as it is.
    pub async fn value_async(&self) -> Result<TickerValue<T>, ClientError> {
        let current = self.value()?;
        if current.has_value() {
            return Ok(current);
        }
        self.tick().await?;
        self.value()
    }

    /// Forces a refresh now and returns whether it succeeded.
    ///
    /// The pending periodic wait is cancelled and the loop restarts once the
    /// refresh is done. Callers arriving while a refresh is in flight, forced
    /// or periodic, share its outcome instead of starting another one.
    pub async fn tick(&self) -> Result<bool, ClientError> {
        let in_flight = {
            let mut state = self.inner.state();
            if state.disposed {
                return Err(ClientError::disposed(self.inner.name));
            }
            let (in_flight, started) = join_or_start(&self.inner, &mut state);
            if started {
                state.idle.cancel();
                state.idle = CancellationToken::new();
                start_loop(
                    Arc::downgrade(&self.inner),
                    self.inner.interval,
                    state.idle.clone(),
                    Some(in_flight.clone()),
                );
            }
            in_flight
        };
        Ok(in_flight.await)
    }

    /// Stops the periodic loop. A refresh already in flight runs to completion.
    pub fn dispose(&self) {
        self.close.call_once(|| {
            let mut state = self.inner.state();
            state.disposed = true;
            state.idle.cancel();
            debug!("{} ticker disposed", self.inner.name);
        });
    }
}

impl<T> Drop for Ticker<T> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.disposed = true;
            state.idle.cancel();
        }
    }
}

/// Runs the periodic loop until `idle` is cancelled. With `first`, the loop
/// waits for that refresh before its first sleep.
fn start_loop<T: Send + Sync + 'static>(
    weak: Weak<TickerInner<T>>,
    interval: Duration,
    idle: CancellationToken,
    first: Option<InFlight>,
) {
    tokio::spawn(async move {
        if let Some(first) = first {
            first.await;
        }
        loop {
            tokio::select! {
                biased;
                _ = idle.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            let in_flight = {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let mut state = inner.state();
                if state.disposed || idle.is_cancelled() {
                    break;
                }
                let (in_flight, _) = join_or_start(&inner, &mut state);
                in_flight
            };
            in_flight.await;
        }
    });
}
