use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tracing::trace;

use super::state::Completion;
use crate::error::{ExecError, Result};
use crate::stream::{split_lines, CombinedStream};

enum Phase {
    Reading(BoxStream<'static, std::io::Result<String>>, Completion),
    Done,
}

/// Lines of combined stdout and stderr, in arrival order.
///
/// Not restartable. After the last line the process is settled; a terminal
/// error or throw-on-error exit is yielded as a final `Err`.
pub struct Lines {
    inner: BoxStream<'static, Result<String>>,
}

impl Lines {
    pub(crate) fn new(chunks: CombinedStream, completion: Completion) -> Self {
        let lines = split_lines(chunks).boxed();
        let inner = futures::stream::unfold(Phase::Reading(lines, completion), |phase| async move {
            let Phase::Reading(mut lines, completion) = phase else {
                return None;
            };
            match lines.next().await {
                Some(Ok(line)) => Some((Ok(line), Phase::Reading(lines, completion))),
                Some(Err(err)) => Some((Err(ExecError::stream(err)), Phase::Done)),
                None => {
                    trace!("output streams ended");
                    let checked = match completion.settle().await {
                        Ok(exit_code) => completion.check_exit(exit_code, None),
                        Err(err) => Err(err),
                    };
                    checked.err().map(|err| (Err(err), Phase::Done))
                }
            }
        });
        Self {
            inner: inner.boxed(),
        }
    }

    pub(crate) fn failed(err: ExecError) -> Self {
        Self {
            inner: futures::stream::once(async move { Err(err) }).boxed(),
        }
    }
}

impl Stream for Lines {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for Lines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lines").finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use crate::process::{execute, Options};
    use crate::ExecError;
    use futures::{StreamExt, TryStreamExt};

    #[tokio::test]
    async fn yields_lines_in_order() {
        let mut process = execute("sh", ["-c", "echo foo; echo bar"], Options::new());
        let lines: Vec<String> = process.lines().try_collect().await.unwrap();
        assert_eq!(lines, ["foo", "bar"]);
        assert_eq!(process.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn includes_stderr() {
        let mut process = execute("sh", ["-c", "echo only-err >&2"], Options::new());
        let lines: Vec<String> = process.lines().try_collect().await.unwrap();
        assert_eq!(lines, ["only-err"]);
    }

    #[tokio::test]
    async fn fails_after_lines_on_non_zero_exit() {
        let mut process = execute(
            "sh",
            ["-c", "echo foo; exit 3"],
            Options::new().throw_on_error(true),
        );
        let mut lines = process.lines();
        assert_eq!(lines.next().await.unwrap().unwrap(), "foo");
        let err = lines.next().await.unwrap().unwrap_err();
        assert_eq!(err.non_zero_exit().map(|e| e.exit_code), Some(3));
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn launch_failure_ends_iteration() {
        let mut process = execute("nonexistent_command_12345", ["x"], Options::new());
        let items: Vec<_> = process.lines().collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ExecError::Spawn { .. })));
    }

    #[tokio::test]
    async fn unspawned_handle_fails() {
        let mut process = crate::Process::new("true", Vec::<String>::new(), Options::new());
        let items: Vec<_> = process.lines().collect().await;
        assert!(matches!(items.as_slice(), [Err(ExecError::NotSpawned)]));
    }
}
