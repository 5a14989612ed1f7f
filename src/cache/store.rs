//! Keyed query cache with staleness, in-flight de-duplication and
//! generation tagging.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use super::data::QueryData;
use super::key::QueryKey;
use super::state::{QuerySnapshot, QueryStatus};
use crate::api::gateway::{FetchGateway, Routes};
use crate::api::session::Session;
use crate::error::PmError;

/// Outcome of one fetch, shared by everyone waiting on it.
pub type FetchResult = Result<Arc<QueryData>, PmError>;

/// Handle on an in-flight fetch. Awaiting it joins the fetch; dropping it
/// does not cancel anything.
pub type PendingFetch = Shared<BoxFuture<'static, FetchResult>>;

struct InFlight {
  generation: u64,
  future: PendingFetch,
}

struct CacheEntry {
  data: Option<Arc<QueryData>>,
  status: QueryStatus,
  error: Option<PmError>,
  fetched_at: Option<Instant>,
  /// When the last fetch settled, successfully or not
  settled_at: Option<Instant>,
  invalidated: bool,
  /// The only fetch whose response may still be stored
  in_flight: Option<InFlight>,
}

impl CacheEntry {
  fn new() -> Self {
    Self {
      data: None,
      status: QueryStatus::Idle,
      error: None,
      fetched_at: None,
      settled_at: None,
      invalidated: false,
      in_flight: None,
    }
  }

  fn is_stale(&self, stale_time: Duration) -> bool {
    self.invalidated
      || self
        .settled_at
        .map_or(true, |settled| settled.elapsed() >= stale_time)
  }

  fn snapshot(&self, stale_time: Duration) -> QuerySnapshot {
    QuerySnapshot {
      data: self.data.clone(),
      status: self.status,
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      is_stale: self.is_stale(stale_time),
    }
  }
}

/// What [`QueryCache::update_where`] does with one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryUpdate {
  Unchanged,
  Replace(QueryData),
  /// Keep the data but mark it stale
  Invalidate,
  Remove,
}

#[derive(Default)]
struct CacheState {
  entries: HashMap<QueryKey, CacheEntry>,
  next_generation: u64,
}

/// Read-through cache over a [`FetchGateway`].
///
/// This is the single source of truth for what the UI shows. Reads never
/// block; they return a snapshot and start a background fetch when needed.
/// All changes to cached data go through [`QueryCache::write`],
/// [`QueryCache::write_where`], [`QueryCache::update_where`],
/// [`QueryCache::invalidate`] and [`QueryCache::remove`].
///
/// Every fetch is tagged with a per-cache generation number. A response is
/// only stored if its fetch is still the one registered for its key. A newer
/// fetch, a write or a removal unregisters it, so a superseded response can
/// never overwrite newer state.
pub struct QueryCache<G: FetchGateway> {
  gateway: Arc<G>,
  session: Session,
  routes: Routes,
  /// How long fetched data is considered fresh
  stale_time: Duration,
  state: Arc<Mutex<CacheState>>,
}

impl<G: FetchGateway> QueryCache<G> {
  pub fn new(gateway: Arc<G>, session: Session, routes: Routes) -> Self {
    Self {
      gateway,
      session,
      routes,
      stale_time: Duration::from_secs(60),
      state: Arc::new(Mutex::new(CacheState::default())),
    }
  }

  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn gateway(&self) -> &Arc<G> {
    &self.gateway
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn routes(&self) -> &Routes {
    &self.routes
  }

  fn lock(&self) -> MutexGuard<'_, CacheState> {
    // Cache state stays consistent even if a panicking updater poisoned it:
    // every mutation is a whole-value replacement.
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Current entry for `key`, starting a fetch if it is absent or stale and
  /// none is in flight.
  pub fn read(&self, key: &QueryKey) -> QuerySnapshot {
    let mut state = self.lock();

    if !key.is_enabled() {
      return state
        .entries
        .get(key)
        .map(|e| e.snapshot(self.stale_time))
        .unwrap_or_else(QuerySnapshot::idle);
    }

    let needs_fetch = match state.entries.get(key) {
      Some(entry) => entry.in_flight.is_none() && entry.is_stale(self.stale_time),
      None => true,
    };
    if needs_fetch {
      let future = self.start_fetch(&mut state, key);
      spawn_driver(future);
    }

    state
      .entries
      .get(key)
      .map(|e| e.snapshot(self.stale_time))
      .unwrap_or_else(QuerySnapshot::idle)
  }

  /// Snapshot of `key` without triggering any fetch.
  pub fn peek(&self, key: &QueryKey) -> Option<QuerySnapshot> {
    self
      .lock()
      .entries
      .get(key)
      .map(|e| e.snapshot(self.stale_time))
  }

  /// Cached data for `key`, if any, without triggering any fetch.
  pub fn get(&self, key: &QueryKey) -> Option<Arc<QueryData>> {
    self.lock().entries.get(key).and_then(|e| e.data.clone())
  }

  /// Fresh data for `key`: cached data when fresh, otherwise joins the
  /// in-flight fetch or starts one.
  pub async fn fetch(&self, key: &QueryKey) -> FetchResult {
    if !key.is_enabled() {
      return Ok(Arc::new(QueryData::empty(key)));
    }

    let future = {
      let mut state = self.lock();
      let joined = match state.entries.get(key) {
        Some(entry) => {
          if let Some(in_flight) = &entry.in_flight {
            Some(in_flight.future.clone())
          } else if let (false, Some(data)) = (entry.is_stale(self.stale_time), &entry.data) {
            return Ok(Arc::clone(data));
          } else {
            None
          }
        }
        None => None,
      };
      match joined {
        Some(future) => future,
        None => self.start_fetch(&mut state, key),
      }
    };

    let result = future.await?;
    // A write or newer generation may have landed since the response
    Ok(self.get(key).unwrap_or(result))
  }

  /// Start a new fetch for `key` even if one is in flight. The older fetch
  /// still completes but its response is discarded.
  pub fn refetch(&self, key: &QueryKey) -> PendingFetch {
    if !key.is_enabled() {
      return futures::future::ready::<FetchResult>(Ok(Arc::new(QueryData::empty(key))))
        .boxed()
        .shared();
    }
    let future = {
      let mut state = self.lock();
      self.start_fetch(&mut state, key)
    };
    spawn_driver(future.clone());
    future
  }

  /// Apply `updater` to the data cached under `key`.
  ///
  /// Returns `false` without doing anything when there is no data for the
  /// key: nothing is cached, so there is nothing to keep consistent.
  pub fn write<F>(&self, key: &QueryKey, updater: F) -> bool
  where
    F: FnOnce(&QueryData) -> QueryData,
  {
    let mut state = self.lock();
    let Some(entry) = state.entries.get_mut(key) else {
      return false;
    };
    let Some(data) = entry.data.as_deref() else {
      return false;
    };
    let updated = updater(data);
    store_write(entry, updated);
    true
  }

  /// Apply `updater` to every cached entry matching `predicate`, in one pass
  /// under a single lock so readers see either none or all of the changes.
  ///
  /// The updater returns `None` to leave an entry untouched. Returns the keys
  /// that were changed.
  pub fn write_where<P, F>(&self, predicate: P, mut updater: F) -> Vec<QueryKey>
  where
    P: Fn(&QueryKey) -> bool,
    F: FnMut(&QueryKey, &QueryData) -> Option<QueryData>,
  {
    self.update_where(predicate, |key, data| {
      match data.and_then(|data| updater(key, data)) {
        Some(updated) => EntryUpdate::Replace(updated),
        None => EntryUpdate::Unchanged,
      }
    })
  }

  /// Replace, invalidate or remove every entry matching `predicate` in one
  /// locked pass. The updater sees `None` for entries without data yet.
  ///
  /// Returns the keys that were replaced, invalidated or removed.
  pub fn update_where<P, F>(&self, predicate: P, mut updater: F) -> Vec<QueryKey>
  where
    P: Fn(&QueryKey) -> bool,
    F: FnMut(&QueryKey, Option<&QueryData>) -> EntryUpdate,
  {
    let mut state = self.lock();
    let mut touched = Vec::new();
    let mut removed = Vec::new();

    for (key, entry) in state.entries.iter_mut() {
      if !predicate(key) {
        continue;
      }
      match updater(key, entry.data.as_deref()) {
        EntryUpdate::Unchanged => continue,
        EntryUpdate::Replace(updated) => {
          if entry.data.is_none() {
            continue;
          }
          store_write(entry, updated);
        }
        EntryUpdate::Invalidate => {
          entry.invalidated = true;
          tracing::debug!(key = %key.description(), "invalidated");
        }
        EntryUpdate::Remove => removed.push(key.clone()),
      }
      touched.push(key.clone());
    }

    for key in &removed {
      state.entries.remove(key);
      tracing::debug!(key = %key.description(), "removed");
    }

    touched
  }

  /// Mark `key` stale so the next read refetches it.
  pub fn invalidate(&self, key: &QueryKey) -> bool {
    self.invalidate_where(|k| k == key) > 0
  }

  /// Mark every entry matching `predicate` stale. Returns how many matched.
  pub fn invalidate_where<P>(&self, predicate: P) -> usize
  where
    P: Fn(&QueryKey) -> bool,
  {
    let mut state = self.lock();
    let mut count = 0;
    for (key, entry) in state.entries.iter_mut() {
      if predicate(key) {
        entry.invalidated = true;
        count += 1;
        tracing::debug!(key = %key.description(), "invalidated");
      }
    }
    count
  }

  /// Drop every entry matching `predicate`. In-flight responses for removed
  /// entries are discarded.
  pub fn remove_where<P>(&self, predicate: P) -> usize
  where
    P: Fn(&QueryKey) -> bool,
  {
    let mut state = self.lock();
    let before = state.entries.len();
    state.entries.retain(|key, _| !predicate(key));
    before - state.entries.len()
  }

  pub fn remove(&self, key: &QueryKey) -> bool {
    self.remove_where(|k| k == key) > 0
  }

  pub fn keys(&self) -> Vec<QueryKey> {
    self.lock().entries.keys().cloned().collect()
  }

  /// Register a new generation for `key` and build its fetch future.
  fn start_fetch(&self, state: &mut CacheState, key: &QueryKey) -> PendingFetch {
    state.next_generation += 1;
    let generation = state.next_generation;

    let request = self.routes.read_request(key);
    let gateway = Arc::clone(&self.gateway);
    let session = self.session.clone();
    let cache_state = Arc::downgrade(&self.state);
    let fetch_key = key.clone();

    tracing::debug!(key = %key.description(), generation, "fetching");

    let future = async move {
      let result = match gateway.send(&session, request).await {
        Ok(response) => QueryData::decode(&fetch_key, response).map(Arc::new),
        Err(e) => Err(e),
      };
      complete_fetch(&cache_state, &fetch_key, generation, &result);
      result
    }
    .boxed()
    .shared();

    let entry = state
      .entries
      .entry(key.clone())
      .or_insert_with(CacheEntry::new);
    entry.status = QueryStatus::Pending;
    entry.in_flight = Some(InFlight {
      generation,
      future: future.clone(),
    });

    future
  }
}

impl<G: FetchGateway> Clone for QueryCache<G> {
  fn clone(&self) -> Self {
    Self {
      gateway: Arc::clone(&self.gateway),
      session: self.session.clone(),
      routes: self.routes.clone(),
      stale_time: self.stale_time,
      state: Arc::clone(&self.state),
    }
  }
}

/// Store written data. A fetch in flight was sent before the write, so its
/// response is dropped and the entry is left stale for the next read.
fn store_write(entry: &mut CacheEntry, data: QueryData) {
  entry.data = Some(Arc::new(data));
  if entry.in_flight.take().is_some() {
    entry.status = QueryStatus::Success;
    entry.error = None;
    entry.invalidated = true;
  }
}

/// Drive a fetch to completion in the background when a runtime is
/// available. Without one, the fetch runs when someone awaits it.
fn spawn_driver(future: PendingFetch) {
  if let Ok(handle) = tokio::runtime::Handle::try_current() {
    handle.spawn(async move {
      let _ = future.await;
    });
  }
}

/// Store a fetch outcome unless the fetch was superseded.
fn complete_fetch(
  state: &Weak<Mutex<CacheState>>,
  key: &QueryKey,
  generation: u64,
  result: &FetchResult,
) {
  let Some(state) = state.upgrade() else {
    return;
  };
  let mut state = state.lock().unwrap_or_else(|e| e.into_inner());

  let Some(entry) = state.entries.get_mut(key) else {
    tracing::debug!(key = %key.description(), generation, "entry removed, dropping response");
    return;
  };
  let current = entry
    .in_flight
    .as_ref()
    .is_some_and(|f| f.generation == generation);
  if !current {
    tracing::debug!(
      key = %key.description(),
      generation,
      latest = entry.in_flight.as_ref().map(|f| f.generation),
      "discarding superseded response"
    );
    return;
  }
  entry.in_flight = None;

  let now = Instant::now();
  entry.settled_at = Some(now);
  match result {
    Ok(data) => {
      entry.data = Some(Arc::clone(data));
      entry.status = QueryStatus::Success;
      entry.error = None;
      entry.fetched_at = Some(now);
      entry.invalidated = false;
    }
    Err(e) => {
      tracing::warn!(key = %key.description(), error = %e, "fetch failed, keeping last data");
      entry.status = QueryStatus::Error;
      entry.error = Some(e.clone());
      entry.invalidated = false;
    }
  }
}
