// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use tick::{Clock, PeriodicTimer};
use tokio::task::JoinHandle;

/// Owns periodic background tasks. Dropping the handle aborts them.
///
/// Tasks run on the ambient Tokio runtime.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` every `period`, starting one period from now.
    ///
    /// A run that outlasts the period delays the next one; runs never overlap.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, clock: &Clock, period: Duration, mut work: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut timer = PeriodicTimer::new(clock, period);
        let handle = tokio::spawn(async move {
            while timer.next().await.is_some() {
                tracing::trace!(task.name = name, "background.tick");
                work().await;
            }
        });

        tracing::debug!(task.name = name, task.period_ms = period.as_millis(), "background.started");
        self.tasks.push((name, handle));
    }

    /// Takes ownership of the tasks in `other`.
    pub fn extend(&mut self, mut other: Self) {
        self.tasks.append(&mut other.tasks);
    }

    /// Names of the owned tasks, in spawn order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Number of owned tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no tasks are owned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Aborts every task and waits for them to stop.
    pub async fn shutdown(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for (_, handle) in &tasks {
            handle.abort();
        }
        for (name, handle) in tasks {
            if let Err(error) = handle.await
                && !error.is_cancelled()
            {
                tracing::warn!(task.name = name, error = %error, "background.failed");
            }
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}
