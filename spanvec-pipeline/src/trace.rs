//! Trace context: identity and nesting of the current call tree.
//!
//! The active context lives in a tokio task-local, so it is scoped to one
//! logical flow. A wrapped call with no active context becomes a root and
//! mints a fresh trace id; nested wrapped calls push a span. Leaving a scope
//! (by return, error or cancellation) restores the enclosing context, and
//! leaving the root scope leaves no context behind.
//!
//! A spawned task does not inherit the caller's context unless the future
//! is wrapped with [`propagate`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

tokio::task_local! {
    static CURRENT: TraceContext;
}

#[derive(Debug)]
struct TraceShared {
    trace_id: Uuid,
    alert_claimed: AtomicBool,
}

/// Identity of the active span within a call tree.
#[derive(Debug, Clone)]
pub struct TraceContext {
    shared: Arc<TraceShared>,
    span_id: Uuid,
    /// Ancestor span ids, root first
    ancestors: Vec<Uuid>,
}

impl TraceContext {
    /// Start a new call tree.
    pub fn root() -> Self {
        Self {
            shared: Arc::new(TraceShared {
                trace_id: Uuid::now_v7(),
                alert_claimed: AtomicBool::new(false),
            }),
            span_id: Uuid::now_v7(),
            ancestors: Vec::new(),
        }
    }

    /// The context active in the current task, if any.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Context for a new span: a child of the active span, or a new root.
    pub fn enter() -> Self {
        match Self::current() {
            Some(parent) => parent.child(),
            None => Self::root(),
        }
    }

    /// A child span in the same trace.
    pub fn child(&self) -> Self {
        let mut ancestors = Vec::with_capacity(self.ancestors.len() + 1);
        ancestors.extend_from_slice(&self.ancestors);
        ancestors.push(self.span_id);
        Self {
            shared: Arc::clone(&self.shared),
            span_id: Uuid::now_v7(),
            ancestors,
        }
    }

    /// Run `fut` with this context active.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    pub fn trace_id(&self) -> Uuid {
        self.shared.trace_id
    }

    pub fn span_id(&self) -> Uuid {
        self.span_id
    }

    /// Immediate parent span, absent for the root.
    pub fn parent_span_id(&self) -> Option<Uuid> {
        self.ancestors.last().copied()
    }

    pub fn ancestors(&self) -> &[Uuid] {
        &self.ancestors
    }

    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    pub fn is_root(&self) -> bool {
        self.ancestors.is_empty()
    }

    /// Claim the single alert allowed for this trace.
    ///
    /// Returns `true` exactly once per trace.
    pub fn claim_alert(&self) -> bool {
        !self.shared.alert_claimed.swap(true, Ordering::AcqRel)
    }
}

/// Carry the caller's active context into a future that will run on
/// another task. Wrapped calls inside it become children of the caller's
/// current span.
pub fn propagate<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    let context = TraceContext::current();
    async move {
        match context {
            Some(context) => context.scope(fut).await,
            None => fut.await,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_context_outside_scope() {
        assert!(TraceContext::current().is_none());
        let entered = TraceContext::enter();
        assert!(entered.is_root());
        assert!(entered.parent_span_id().is_none());
    }

    #[tokio::test]
    async fn test_nested_scopes_share_trace() {
        let root = TraceContext::root();
        let root_trace = root.trace_id();
        let root_span = root.span_id();

        root.scope(async move {
            let child = TraceContext::enter();
            assert_eq!(child.trace_id(), root_trace);
            assert_eq!(child.parent_span_id(), Some(root_span));

            let child_span = child.span_id();
            child
                .scope(async move {
                    let grandchild = TraceContext::enter();
                    assert_eq!(grandchild.depth(), 2);
                    assert_eq!(grandchild.ancestors(), &[root_span, child_span]);
                })
                .await;

            // Child scope popped: the active span is the root again.
            let current = TraceContext::current().unwrap();
            assert_eq!(current.span_id(), root_span);
        })
        .await;

        assert!(TraceContext::current().is_none());
    }

    #[tokio::test]
    async fn test_context_cleared_after_error() {
        let result: Result<(), &str> = TraceContext::root().scope(async { Err("boom") }).await;
        assert!(result.is_err());
        assert!(TraceContext::current().is_none());
    }

    #[tokio::test]
    async fn test_spawned_task_starts_new_root() {
        let root = TraceContext::root();
        let root_trace = root.trace_id();
        let (plain, carried) = root
            .scope(async {
                let plain = tokio::spawn(async { TraceContext::enter() });
                let carried = tokio::spawn(propagate(async { TraceContext::enter() }));
                (plain.await.unwrap(), carried.await.unwrap())
            })
            .await;

        assert_ne!(plain.trace_id(), root_trace);
        assert!(plain.is_root());
        assert_eq!(carried.trace_id(), root_trace);
        assert_eq!(carried.depth(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_trees_are_isolated() {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                tokio::spawn(async {
                    let root = TraceContext::root();
                    let expected = root.trace_id();
                    root.scope(async move {
                        tokio::task::yield_now().await;
                        let seen = TraceContext::enter().trace_id();
                        seen == expected
                    })
                    .await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }
    }

    #[test]
    fn test_claim_alert_once_per_trace() {
        let root = TraceContext::root();
        let child = root.child();
        assert!(child.claim_alert());
        assert!(!root.claim_alert());
        assert!(TraceContext::root().claim_alert());
    }
}
