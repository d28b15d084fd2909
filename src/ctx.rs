//! A cancellation context threaded through operator pipelines, in the style
//! of this codebase's query-execution `Context`, trimmed to the one
//! responsibility the operator pipeline needs: "has this run been
//! cancelled or timed out?".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a context stopped accepting further work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
	Cancelled,
	Timedout,
}

/// A cheaply-cloneable cancellation context. Operators check
/// [`Context::done`] opportunistically between documents.
#[derive(Clone)]
pub struct Context {
	inner: Arc<Inner>,
}

struct Inner {
	parent: Option<Context>,
	cancelled: AtomicBool,
	deadline: Option<Instant>,
}

impl Context {
	/// A context with no parent, no deadline, not cancelled.
	pub fn background() -> Self {
		Context {
			inner: Arc::new(Inner {
				parent: None,
				cancelled: AtomicBool::new(false),
				deadline: None,
			}),
		}
	}

	/// A child context that inherits the parent's deadline and cancellation,
	/// but can additionally be cancelled independently.
	pub fn child(parent: &Context) -> Self {
		Context {
			inner: Arc::new(Inner {
				parent: Some(parent.clone()),
				cancelled: AtomicBool::new(false),
				deadline: parent.inner.deadline,
			}),
		}
	}

	/// A context that additionally expires after `timeout`.
	pub fn with_timeout(parent: &Context, timeout: Duration) -> Self {
		let deadline = Instant::now() + timeout;
		let deadline = match parent.inner.deadline {
			Some(d) if d < deadline => d,
			_ => deadline,
		};
		Context {
			inner: Arc::new(Inner {
				parent: Some(parent.clone()),
				cancelled: AtomicBool::new(false),
				deadline: Some(deadline),
			}),
		}
	}

	/// Cancels this context. Does not affect the parent.
	pub fn cancel(&self) {
		self.inner.cancelled.store(true, Ordering::SeqCst);
	}

	/// Returns why this context (or an ancestor) is no longer live, if any.
	pub fn done(&self) -> Option<Reason> {
		if self.inner.cancelled.load(Ordering::SeqCst) {
			return Some(Reason::Cancelled);
		}
		if let Some(deadline) = self.inner.deadline {
			if Instant::now() >= deadline {
				return Some(Reason::Timedout);
			}
		}
		match &self.inner.parent {
			Some(parent) => parent.done(),
			None => None,
		}
	}

	pub fn is_done(&self) -> bool {
		self.done().is_some()
	}
}

impl Default for Context {
	fn default() -> Self {
		Context::background()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cancelling_a_child_does_not_cancel_the_parent() {
		let parent = Context::background();
		let child = Context::child(&parent);
		child.cancel();
		assert!(child.is_done());
		assert!(!parent.is_done());
	}

	#[test]
	fn cancelling_a_parent_is_observed_by_the_child() {
		let parent = Context::background();
		let child = Context::child(&parent);
		parent.cancel();
		assert_eq!(child.done(), Some(Reason::Cancelled));
	}

	#[test]
	fn timeout_expires() {
		let parent = Context::background();
		let child = Context::with_timeout(&parent, Duration::from_millis(0));
		std::thread::sleep(Duration::from_millis(1));
		assert_eq!(child.done(), Some(Reason::Timedout));
	}
}
