//! Typed front door bundling the query cache and the write API.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::api::client::HttpGateway;
use crate::api::gateway::FetchGateway;
use crate::api::session::Session;
use crate::api::types::{Day, Event, Project, Stat, Task};
use crate::cache::{QueryCache, QueryData, QueryKey, TaskFilter};
use crate::config::Config;
use crate::error::PmError;
use crate::mutation::MutationCoordinator;

/// Tracking client with transparent caching.
///
/// Reads go through the shared [`QueryCache`]; writes go through the
/// [`MutationCoordinator`], which patches that same cache.
pub struct Tallybook<G: FetchGateway = HttpGateway> {
  cache: QueryCache<G>,
  mutations: MutationCoordinator<G>,
}

impl<G: FetchGateway> Clone for Tallybook<G> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      mutations: self.mutations.clone(),
    }
  }
}

impl Tallybook<HttpGateway> {
  /// Connect to the backend named in `config`.
  pub fn connect(config: &Config, session: Session) -> Result<Self, PmError> {
    let gateway = HttpGateway::new(&config.api)?;
    let cache = QueryCache::new(Arc::new(gateway), session, config.api.routes.clone())
      .with_stale_time(config.cache.stale_time());
    Ok(Self::new(cache))
  }
}

impl<G: FetchGateway> Tallybook<G> {
  pub fn new(cache: QueryCache<G>) -> Self {
    let mutations = MutationCoordinator::new(cache.clone());
    Self { cache, mutations }
  }

  pub fn cache(&self) -> &QueryCache<G> {
    &self.cache
  }

  pub fn mutations(&self) -> &MutationCoordinator<G> {
    &self.mutations
  }

  /// Days with their events, optionally bounded on either side.
  pub async fn days(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Vec<Day>, PmError> {
    let data = self.cache.fetch(&QueryKey::day_range(start, end)).await?;
    Ok(cloned(data.days()))
  }

  /// A single working day, if the backend has one for `date`.
  pub async fn day(&self, date: NaiveDate) -> Result<Option<Day>, PmError> {
    let data = self.cache.fetch(&QueryKey::day(date)).await?;
    Ok(data.days().and_then(|days| days.first().cloned()))
  }

  /// Booked time per date, optionally bounded on either side.
  pub async fn stats(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Vec<Stat>, PmError> {
    let data = self.cache.fetch(&QueryKey::stats(start, end)).await?;
    Ok(cloned(data.stats()))
  }

  /// Flat event listing.
  pub async fn events(&self, day: Option<NaiveDate>, task_id: Option<&str>) -> Result<Vec<Event>, PmError> {
    let data = self.cache.fetch(&QueryKey::events(day, task_id)).await?;
    Ok(cloned(data.events()))
  }

  pub async fn tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, PmError> {
    let data = self.cache.fetch(&QueryKey::tasks(filter)).await?;
    Ok(cloned(data.tasks()))
  }

  pub async fn task(&self, id: &str) -> Result<Option<Task>, PmError> {
    let data = self.cache.fetch(&QueryKey::task(id)).await?;
    Ok(first(&data, QueryData::tasks))
  }

  /// Server-side search. Short queries resolve to nothing without a request.
  pub async fn search_tasks(&self, q: &str) -> Result<Vec<Task>, PmError> {
    let data = self.cache.fetch(&QueryKey::task_search(q)).await?;
    Ok(cloned(data.tasks()))
  }

  pub async fn projects(&self) -> Result<Vec<Project>, PmError> {
    let data = self.cache.fetch(&QueryKey::Projects).await?;
    Ok(cloned(data.projects()))
  }

  pub async fn project(&self, id: &str) -> Result<Option<Project>, PmError> {
    let data = self.cache.fetch(&QueryKey::project(id)).await?;
    Ok(first(&data, QueryData::projects))
  }
}

fn cloned<T: Clone>(items: Option<&[T]>) -> Vec<T> {
  items.map(<[T]>::to_vec).unwrap_or_default()
}

fn first<T: Clone>(data: &QueryData, items: impl Fn(&QueryData) -> Option<&[T]>) -> Option<T> {
  items(data).and_then(|items| items.first().cloned())
}
