//! Query tracing boundary.
//!
//! Tracing is optional, injected by the caller, and must not affect
//! evaluation semantics.

use crate::{
    error::{ErrorClass, ErrorOrigin},
    plan::{Path, PlanFingerprint},
};

///
/// QueryTraceSink
///

pub trait QueryTraceSink: Send + Sync {
    fn on_event(&self, event: QueryTraceEvent<'_>);
}

///
/// QueryTraceEvent
///
/// Leaf events may arrive from worker threads in any order; `path`
/// identifies the leaf.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryTraceEvent<'a> {
    PlanStart {
        fingerprint: PlanFingerprint,
        leaves: u64,
        depth: u32,
    },
    LeafResolved {
        fingerprint: PlanFingerprint,
        path: &'a Path,
        filter: &'a str,
        rows: u64,
        attempts: u32,
    },
    LeafSkipped {
        fingerprint: PlanFingerprint,
        path: &'a Path,
        filter: &'a str,
    },
    MergeFinish {
        fingerprint: PlanFingerprint,
        rows: u64,
    },
    Error {
        fingerprint: PlanFingerprint,
        class: ErrorClass,
        origin: ErrorOrigin,
    },
}

///
/// TraceScope
///
/// Binds an optional sink to one plan fingerprint.
///

#[derive(Clone, Copy)]
pub(crate) struct TraceScope<'a> {
    sink: Option<&'a dyn QueryTraceSink>,
    fingerprint: PlanFingerprint,
}

impl<'a> TraceScope<'a> {
    pub(crate) const fn new(
        sink: Option<&'a dyn QueryTraceSink>,
        fingerprint: PlanFingerprint,
    ) -> Self {
        Self { sink, fingerprint }
    }

    fn emit(&self, event: QueryTraceEvent<'_>) {
        if let Some(sink) = self.sink {
            sink.on_event(event);
        }
    }

    pub(crate) fn plan_start(&self, leaves: u64, depth: u32) {
        self.emit(QueryTraceEvent::PlanStart {
            fingerprint: self.fingerprint,
            leaves,
            depth,
        });
    }

    pub(crate) fn leaf_resolved(&self, path: &Path, filter: &str, rows: u64, attempts: u32) {
        self.emit(QueryTraceEvent::LeafResolved {
            fingerprint: self.fingerprint,
            path,
            filter,
            rows,
            attempts,
        });
    }

    pub(crate) fn leaf_skipped(&self, path: &Path, filter: &str) {
        self.emit(QueryTraceEvent::LeafSkipped {
            fingerprint: self.fingerprint,
            path,
            filter,
        });
    }

    pub(crate) fn merge_finish(&self, rows: u64) {
        self.emit(QueryTraceEvent::MergeFinish {
            fingerprint: self.fingerprint,
            rows,
        });
    }

    pub(crate) fn error(&self, class: ErrorClass, origin: ErrorOrigin) {
        self.emit(QueryTraceEvent::Error {
            fingerprint: self.fingerprint,
            class,
            origin,
        });
    }
}
