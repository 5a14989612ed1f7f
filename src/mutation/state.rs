//! Pending/success/error tracking for a single mutation call.
//!
//! A `PendingMutation<T>` runs one coordinator call on the runtime and lets
//! an event loop observe it without awaiting.
//!
//! # Example
//!
//! ```ignore
//! let coordinator = coordinator.clone();
//! let mut save = PendingMutation::spawn(async move {
//!     coordinator.edit_log(edit).await
//! });
//!
//! // In event loop tick
//! if save.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! match save.state() {
//!     MutationState::Pending => render_spinner(),
//!     MutationState::Error(e) => render_toast(&e.to_string()),
//!     _ => {}
//! }
//! ```

use std::future::Future;
use tokio::sync::oneshot;

use crate::error::PmError;

/// The state of a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<T> {
  /// Not started
  Idle,
  /// Request sent, waiting for the response
  Pending,
  /// Server accepted the mutation and the cache was reconciled
  Success(T),
  /// Rejected before sending, or the request failed
  Error(PmError),
}

impl<T> MutationState<T> {
  pub fn is_pending(&self) -> bool {
    matches!(self, MutationState::Pending)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, MutationState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, MutationState::Error(_))
  }

  /// Idle is the only state a mutation can start from; success and error
  /// are terminal.
  pub fn is_terminal(&self) -> bool {
    self.is_success() || self.is_error()
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      MutationState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&PmError> {
    match self {
      MutationState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// One observed mutation call.
///
/// Several may run at once, even for the same entity; nothing here
/// serializes them.
pub struct PendingMutation<T> {
  state: MutationState<T>,
  receiver: Option<oneshot::Receiver<Result<T, PmError>>>,
}

impl<T: Send + 'static> PendingMutation<T> {
  pub fn idle() -> Self {
    Self {
      state: MutationState::Idle,
      receiver: None,
    }
  }

  /// Spawn `future` on the current runtime and track it.
  pub fn spawn<Fut>(future: Fut) -> Self
  where
    Fut: Future<Output = Result<T, PmError>> + Send + 'static,
  {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      // Ignore send errors - the handle may have been dropped
      let _ = tx.send(future.await);
    });
    Self {
      state: MutationState::Pending,
      receiver: Some(rx),
    }
  }

  /// A mutation that was rejected before it could start.
  pub fn rejected(error: PmError) -> Self {
    Self {
      state: MutationState::Error(error),
      receiver: None,
    }
  }

  pub fn state(&self) -> &MutationState<T> {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    self.state.is_pending()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  /// Poll for the outcome without blocking.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick
  /// handler.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(result) => {
        self.settle(result);
        true
      }
      Err(oneshot::error::TryRecvError::Empty) => false,
      Err(oneshot::error::TryRecvError::Closed) => {
        // Task dropped without sending - it panicked or was aborted
        self.settle(Err(PmError::network("Mutation was cancelled")));
        true
      }
    }
  }

  /// Wait for the outcome.
  pub async fn wait(&mut self) -> &MutationState<T> {
    if let Some(rx) = self.receiver.take() {
      let result = rx
        .await
        .unwrap_or_else(|_| Err(PmError::network("Mutation was cancelled")));
      self.settle(result);
    }
    &self.state
  }

  fn settle(&mut self, result: Result<T, PmError>) {
    self.receiver = None;
    self.state = match result {
      Ok(data) => MutationState::Success(data),
      Err(e) => MutationState::Error(e),
    };
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PendingMutation<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PendingMutation")
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}
