//! Cooperative cancellation.
//!
//! A [`StopSignal`] is passed down the call graph and checked between search iterations, repair
//! iterations and optimization phases. A nested search derives a child signal with its own time
//! and iteration limits: the child stops when its parent stops, but triggering the child never
//! affects the parent or its other children.
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct StopScope {
    triggered: AtomicBool,
    reason: Mutex<Option<String>>,
    parent: Option<StopSignal>,
    deadline: Option<Instant>,
    iteration_limit: Option<u64>,
    iterations: AtomicU64,
}

/// Shared, cloneable cancellation context. Clones observe and trigger the same scope.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    scope: Arc<StopScope>,
}

impl StopSignal {
    /// A root signal that only stops when triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A root signal with optional automatic limits.
    pub fn with_limits(time_limit: Option<Duration>, iteration_limit: Option<u64>) -> Self {
        StopSignal {
            scope: Arc::new(StopScope {
                deadline: time_limit.map(|t| Instant::now() + t),
                iteration_limit,
                ..Default::default()
            }),
        }
    }

    /// A child scope that stops with this signal or when its own limits are reached.
    pub fn child(&self, time_limit: Option<Duration>, iteration_limit: Option<u64>) -> Self {
        StopSignal {
            scope: Arc::new(StopScope {
                parent: Some(self.clone()),
                deadline: time_limit.map(|t| Instant::now() + t),
                iteration_limit,
                ..Default::default()
            }),
        }
    }

    /// Stop this scope and all of its children. The first reason is kept.
    pub fn trigger(&self, reason: impl Into<String>) {
        let mut current = self.scope.reason.lock();
        if current.is_none() {
            *current = Some(reason.into());
        }
        self.scope.triggered.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        let scope = &self.scope;
        if scope.triggered.load(Ordering::Acquire) {
            return true;
        }
        if let Some(deadline) = scope.deadline {
            if Instant::now() >= deadline {
                self.trigger("time limit reached");
                return true;
            }
        }
        if let Some(limit) = scope.iteration_limit {
            if scope.iterations.load(Ordering::Relaxed) >= limit {
                self.trigger("iteration limit reached");
                return true;
            }
        }
        if let Some(parent) = &scope.parent {
            if parent.is_triggered() {
                self.trigger(parent.reason().unwrap_or_default());
                return true;
            }
        }
        false
    }

    /// Count one iteration in this scope and its ancestors.
    /// Returns true if the caller may continue.
    pub fn tick(&self) -> bool {
        self.scope.iterations.fetch_add(1, Ordering::Relaxed);
        if let Some(parent) = &self.scope.parent {
            parent.tick();
        }
        !self.is_triggered()
    }

    pub fn iterations(&self) -> u64 {
        self.scope.iterations.load(Ordering::Relaxed)
    }

    /// Why this scope stopped, if it did.
    pub fn reason(&self) -> Option<String> {
        self.scope.reason.lock().clone()
    }
}
