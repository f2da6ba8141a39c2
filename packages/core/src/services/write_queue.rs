//! Per-course write queue with retry logic for optimistic concurrency control
//!
//! Every structural write runs a load → compute → commit cycle. Within one
//! process the queue serializes those cycles per course with an async mutex.
//! Writers in other processes are caught by the store's revision check; a
//! rejected commit is retried against fresh state with exponential backoff.
//!
//! # Example
//!
//! ```rust
//! use multitopic_core::services::{RetryPolicy, SectionError, WriteQueue};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Retry up to 3 times with exponential backoff (10ms, 20ms, 40ms)
//! let queue = WriteQueue::new(RetryPolicy::new(3, Duration::from_millis(10)));
//!
//! let value = queue.run(7, |_attempt| async { Ok::<_, SectionError>(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use crate::models::CourseId;
use crate::services::SectionError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// How often and how patiently conflicted writes are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry attempts after the first (0 = single attempt, no retries)
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff before retry number `attempt + 1`: base, 2·base, 4·base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(10))
    }
}

/// Serializes writes per course and retries revision conflicts
#[derive(Debug, Default)]
pub struct WriteQueue {
    locks: Mutex<HashMap<CourseId, Arc<Mutex<()>>>>,
    policy: RetryPolicy,
}

impl WriteQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Exclusive write access to one course
    pub async fn lock(&self, course_id: CourseId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(course_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of courses that currently have a lock entry
    pub async fn tracked_courses(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Drop the course's lock entry once nobody holds or waits for it
    async fn release(&self, course_id: CourseId) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(&course_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&course_id);
        }
    }

    /// Run `attempt` under the course lock, retrying revision conflicts
    ///
    /// The closure receives the zero-based attempt number and must reload
    /// whatever state it depends on. Only `SectionError::Store` conflicts are
    /// retried; every other error fails immediately.
    pub async fn run<T, F, Fut>(&self, course_id: CourseId, attempt: F) -> Result<T, SectionError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SectionError>>,
    {
        let guard = self.lock(course_id).await;
        let result = self.retry(course_id, attempt).await;
        drop(guard);
        self.release(course_id).await;
        result
    }

    async fn retry<T, F, Fut>(&self, course_id: CourseId, mut attempt: F) -> Result<T, SectionError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SectionError>>,
    {
        let mut tries = 0u32;

        loop {
            match attempt(tries).await {
                Ok(value) => {
                    if tries > 0 {
                        tracing::debug!(
                            "Write to course {} succeeded after {} retry(ies)",
                            course_id,
                            tries
                        );
                    }
                    return Ok(value);
                }

                Err(SectionError::Store(ref e)) if e.is_conflict() && tries < self.policy.max_retries => {
                    tracing::debug!(
                        "Revision conflict on attempt {}/{} for course {}: {}. Retrying...",
                        tries + 1,
                        self.policy.max_retries + 1,
                        course_id,
                        e
                    );
                    tokio::time::sleep(self.policy.backoff(tries)).await;
                    tries += 1;
                }

                Err(e) => {
                    if matches!(&e, SectionError::Store(se) if se.is_conflict()) {
                        tracing::warn!(
                            "Max retries ({}) exceeded for course {} write",
                            self.policy.max_retries,
                            course_id
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
