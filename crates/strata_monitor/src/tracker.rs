// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tick::Clock;
use uuid::Uuid;

use crate::record::{PhaseMark, RequestMetadata, RequestRecord, ResponseInfo};

#[derive(Debug)]
struct OpenRequest {
    started_at: SystemTime,
    started: Instant,
    metadata: RequestMetadata,
    marks: Vec<PhaseMark>,
}

/// Table of in-flight requests.
///
/// Safe to call from any task; `start`, `mark` and `end` for the same id may
/// race. Unknown ids are silently ignored because marks and ends can legitimately
/// arrive after an orphan sweep.
///
/// # Examples
///
/// ```
/// use strata_monitor::{RequestMetadata, RequestTracker, ResponseInfo};
/// use tick::Clock;
///
/// # fn example(clock: &Clock) {
/// let tracker = RequestTracker::new(clock);
/// let id = tracker.start(None, RequestMetadata::new().path("/donors"));
/// tracker.mark(&id, "db", None);
///
/// let record = tracker.end(&id, ResponseInfo::status(200)).expect("request was open");
/// assert!(record.mark("db").is_some());
/// assert!(tracker.end(&id, ResponseInfo::status(200)).is_none());
/// # }
/// ```
#[derive(Debug)]
pub struct RequestTracker {
    clock: Clock,
    open: Mutex<HashMap<String, OpenRequest>>,
}

impl RequestTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a request and returns its id.
    ///
    /// A fresh UUID is generated when `id` is `None`. Starting an id that is
    /// already open replaces the earlier request.
    pub fn start(&self, id: Option<String>, metadata: RequestMetadata) -> String {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let request = OpenRequest {
            started_at: self.clock.system_time(),
            started: self.clock.instant(),
            metadata,
            marks: Vec::new(),
        };

        if self.open.lock().insert(id.clone(), request).is_some() {
            tracing::debug!(request.id = %id, "request.restarted");
        }

        id
    }

    /// Records that request `id` reached `phase`.
    ///
    /// Marking a phase twice keeps its original position and refreshes its time.
    pub fn mark(&self, id: &str, phase: &str, metadata: Option<BTreeMap<String, String>>) {
        let at = self.clock.system_time();
        let now = self.clock.instant();

        let mut open = self.open.lock();
        let Some(request) = open.get_mut(id) else {
            tracing::trace!(request.id = id, request.phase = phase, "request.mark_unknown");
            return;
        };

        let mark = PhaseMark {
            name: phase.to_owned(),
            at,
            elapsed: now.saturating_duration_since(request.started),
            metadata: metadata.unwrap_or_default(),
        };

        match request.marks.iter_mut().find(|existing| existing.name == phase) {
            Some(existing) => *existing = mark,
            None => request.marks.push(mark),
        }
    }

    /// Closes request `id` and returns the finalized record.
    ///
    /// Returns `None` if the id is unknown or already closed.
    pub fn end(&self, id: &str, response: ResponseInfo) -> Option<RequestRecord> {
        let ended_at = self.clock.system_time();
        let now = self.clock.instant();

        let Some(request) = self.open.lock().remove(id) else {
            tracing::trace!(request.id = id, "request.end_unknown");
            return None;
        };

        Some(RequestRecord {
            id: id.to_owned(),
            started_at: request.started_at,
            ended_at,
            duration: now.saturating_duration_since(request.started),
            metadata: request.metadata,
            marks: request.marks,
            response,
        })
    }

    /// Drops requests open for longer than `max_age` and returns how many were dropped.
    pub fn sweep_orphans(&self, max_age: Duration) -> usize {
        let now = self.clock.instant();
        let mut open = self.open.lock();
        let before = open.len();
        open.retain(|id, request| {
            let keep = now.saturating_duration_since(request.started) <= max_age;
            if !keep {
                tracing::info!(request.id = %id, "request.orphaned");
            }
            keep
        });
        before - open.len()
    }

    /// Number of open requests.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }

    /// Returns `true` if `id` is open.
    #[must_use]
    pub fn is_open(&self, id: &str) -> bool {
        self.open.lock().contains_key(id)
    }
}
