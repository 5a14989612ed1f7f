//! Explicit credential context passed to every gateway call.

use std::fmt;

use crate::error::PmError;

/// Bearer credential for the current session.
///
/// Passed explicitly into the gateway instead of being looked up from
/// ambient storage, so a test can build one without any global state.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
  token: Option<String>,
}

impl Session {
  pub fn new(token: impl Into<String>) -> Self {
    Self {
      token: Some(token.into()),
    }
  }

  /// A session without a credential. Every request made with it fails
  /// before reaching the network.
  pub fn anonymous() -> Self {
    Self { token: None }
  }

  /// The bearer token, or a precondition error when it is missing or blank.
  pub fn bearer(&self) -> Result<&str, PmError> {
    match self.token.as_deref().map(str::trim) {
      Some(t) if !t.is_empty() && !t.contains(char::is_whitespace) => Ok(t),
      Some(t) if !t.is_empty() => Err(PmError::precondition("Access data malformed")),
      _ => Err(PmError::precondition("Access data missing")),
    }
  }
}

impl fmt::Debug for Session {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Session")
      .field("token", &self.token.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}
