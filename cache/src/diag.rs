use std::future::Future;

use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

/// Where a cache instance sends its log events.
///
/// Warnings and errors are always emitted. Per-operation debug events are
/// only emitted with `debug` set. With an injected [`Dispatch`], every event
/// of the instance goes there instead of the ambient subscriber.
#[derive(Clone, Default)]
pub(crate) struct Diagnostics {
  dispatch: Option<Dispatch>,
  debug: bool,
}

impl std::fmt::Debug for Diagnostics {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Diagnostics")
      .field("dispatch", &self.dispatch.is_some())
      .field("debug", &self.debug)
      .finish()
  }
}

impl Diagnostics {
  pub(crate) fn new(dispatch: Option<Dispatch>, debug: bool) -> Self {
    Self { dispatch, debug }
  }

  #[inline]
  pub(crate) fn debug_enabled(&self) -> bool {
    self.debug
  }

  /// Runs `f` with the injected dispatch as the default, if any.
  pub(crate) fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
    match &self.dispatch {
      Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
      None => f(),
    }
  }

  /// Async counterpart of [`Diagnostics::scope`]. Tasks spawned inside
  /// inherit the dispatch when they use `with_current_subscriber`.
  pub(crate) async fn scope_async<F: Future>(&self, fut: F) -> F::Output {
    match &self.dispatch {
      Some(dispatch) => fut.with_subscriber(dispatch.clone()).await,
      None => fut.await,
    }
  }
}

/// Emits a `tracing::debug!` event only when the instance runs in debug mode.
macro_rules! diag_debug {
  ($diag:expr, $($arg:tt)+) => {
    if $diag.debug_enabled() {
      ::tracing::debug!($($arg)+);
    }
  };
}

pub(crate) use diag_debug;
