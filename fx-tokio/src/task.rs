use std::{
    borrow::Cow,
    fmt::{self, Display},
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn, Instrument};

/// Adds `#[must_use]` to ensure [`Option<LxTask<()>>`]s are used (or detached).
#[must_use]
pub struct MaybeLxTask<T>(pub Option<LxTask<T>>);

impl<T> MaybeLxTask<T> {
    pub fn detach(self) {
        if let Some(task) = self.0 {
            task.detach();
        }
    }
}

/// A thin wrapper around [`tokio::task::JoinHandle`] that:
///
/// 1. propagates panics instead of catching them,
/// 2. adds the `#[must_use]` lint to ensure that all spawned tasks are
///    joined, or explicitly detached when no joining is required.
///
/// The goal is to encourage structured concurrency by joining all spawned
/// tasks, which (1) keeps control flow legible, (2) avoids leaking orphaned
/// tasks, and (3) propagates panics instead of letting them vanish silently.
///
/// Use [`LxTask::logged`] to get a future whose output is the task's name,
/// logged at the appropriate level when the task finishes.
#[must_use]
pub struct LxTask<T> {
    task: JoinHandle<T>,
    name: Cow<'static, str>,
}

/// A [`Future`] that wraps [`LxTask`] so its result is logged when it
/// finishes. The inner `T` is discarded; the output is the task's name.
pub struct LoggedLxTask<T>(LxTask<T>);

struct TaskOutputDisplay<'a> {
    name: &'a str,
    result: Result<(), &'a JoinError>,
}

impl<T> LxTask<T> {
    /// Spawns a named task which inherits the current tracing span.
    #[inline]
    #[allow(clippy::disallowed_methods)]
    pub fn spawn<F>(name: impl Into<Cow<'static, str>>, future: F) -> LxTask<F::Output>
    where
        F: Future<Output = T> + Send + 'static,
        F::Output: Send + 'static,
    {
        let name = name.into();
        let span = tracing::Span::current();
        debug!(%name, "spawning task");
        LxTask {
            task: tokio::spawn(future.instrument(span)),
            name,
        }
    }

    /// Drops the task handle, detaching it so it continues running in the
    /// background. Without a handle, the task can no longer be `.await`ed to
    /// get its output.
    #[inline]
    pub fn detach(self) {
        std::mem::drop(self)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    #[inline]
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Instruments this [`LxTask`] so its result is logged when it finishes.
    #[inline]
    pub fn logged(self) -> LoggedLxTask<T> {
        LoggedLxTask(self)
    }
}

impl<T> Future for LxTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };

        let result = match result {
            Ok(val) => Ok(val),
            Err(join_err) => match join_err.try_into_panic() {
                Ok(panic_reason) => {
                    error!(name = %self.name(), "task panicked");
                    std::panic::resume_unwind(panic_reason)
                }
                Err(join_err) => Err(join_err),
            },
        };

        Poll::Ready(result)
    }
}

impl<T> LoggedLxTask<T> {
    #[inline]
    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl<T> Future for LoggedLxTask<T> {
    type Output = Cow<'static, str>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|result| {
            let log_level = match &result {
                Ok(_) => None,
                Err(e) if e.is_panic() => Some("error"),
                _ => Some("warn"),
            };

            let msg = TaskOutputDisplay {
                name: self.name(),
                result: result.as_ref().map(|_| ()),
            };

            match log_level {
                Some("error") => error!("{msg}"),
                Some(_) => warn!("{msg}"),
                None => info!("{msg}"),
            }

            self.0.name.clone()
        })
    }
}

impl Display for TaskOutputDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join_label = match &self.result {
            Ok(_) => "finished",
            Err(e) if e.is_cancelled() => "cancelled",
            Err(e) if e.is_panic() => "panicked",
            _ => "(unknown join error)",
        };

        let name = self.name;
        write!(f, "Task '{name}' {join_label}")?;

        if let Err(e) = self.result {
            write!(f, ": {e:#}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn spawn_and_join() {
        let task = LxTask::spawn("test", async { 1 + 1 });
        assert_eq!(task.await.unwrap(), 2);
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn panic_propagates() {
        let task = LxTask::spawn("panicker", async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            panic!("boom")
        });
        task.await.unwrap();
    }
}
