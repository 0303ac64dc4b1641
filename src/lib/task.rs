//! Running a command alongside a signal watcher.

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

enum Finished<T, E> {
    Operation(Result<T, E>),
    Signal(io::Result<&'static str>),
}

async fn wait_for_signal() -> io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "SIGINT")
    }
}

/// Run `operation` until it finishes or the process is asked to stop.
///
/// The operation receives a [`CancellationToken`] that is cancelled when a signal arrives. In that
/// case the operation is still awaited, so it can unwind, and the result is
/// [`Error::Interrupted`]. Otherwise the operation's own result is returned and the watcher is
/// dropped.
pub async fn run_until_signal<F, Fut, T, E>(operation: F) -> Result<T, E>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<Error> + std::fmt::Display,
{
    let token = CancellationToken::new();
    let operation = operation(token.clone());
    tokio::pin!(operation);

    let finished = tokio::select! {
        biased;
        result = &mut operation => Finished::Operation(result),
        signal = wait_for_signal() => Finished::Signal(signal),
    };

    match finished {
        Finished::Operation(result) => {
            token.cancel();
            result
        }
        Finished::Signal(Ok(signal)) => {
            warn!(signal, "stopping");
            token.cancel();
            if let Err(err) = operation.await {
                debug!("operation unwound with: {err}");
            }
            Err(Error::Interrupted(signal).into())
        }
        Finished::Signal(Err(err)) => {
            warn!("cannot watch for signals: {err}");
            operation.await
        }
    }
}

/// Run blocking work off the async threads. Panics in `work` are resumed on the caller.
pub async fn run_blocking<F, T>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => match err.try_into_panic() {
            Ok(payload) => std::panic::resume_unwind(payload),
            Err(err) => Err(io::Error::other(err).into()),
        },
    }
}

#[cfg(test)]
mod test_run_until_signal {
    use super::*;

    #[tokio::test]
    async fn result_of_operation_is_returned() {
        let value = run_until_signal(|_| async { Ok::<_, Error>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn error_of_operation_is_returned() {
        let result: Result<()> = run_until_signal(|_| async { Err(Error::NoActionableInputs) }).await;
        assert!(matches!(result, Err(Error::NoActionableInputs)));
    }

    #[tokio::test]
    async fn token_is_live_while_operation_runs() {
        let mut observed = None;
        run_until_signal(|token| {
            observed = Some(token.clone());
            async move {
                assert!(!token.is_cancelled());
                Ok::<_, Error>(())
            }
        })
        .await
        .unwrap();
        // Finished operations release anything still waiting on the token.
        assert!(observed.unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn blocking_work_runs_to_completion() {
        let sum = run_blocking(|| Ok((1..=10).sum::<u32>())).await.unwrap();
        assert_eq!(sum, 55);
    }
}
