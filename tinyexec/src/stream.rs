//! Byte stream helpers: draining, combining, and line splitting.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::trace;

/// A boxed byte source, so stdout and stderr can share one collection.
pub type ByteSource = Box<dyn AsyncRead + Unpin + Send>;

/// Read a byte stream to its end, decoding it as (lossy) UTF-8.
pub async fn read_to_string<R>(mut reader: R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Several byte sources merged into one stream of chunks.
///
/// Chunks are delivered in arrival order; each source keeps its own
/// internal order. The stream ends once every source has ended.
#[derive(Debug)]
pub struct CombinedStream {
    inner: ReceiverStream<io::Result<Bytes>>,
}

impl Stream for CombinedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Merge `sources` into a single [`CombinedStream`].
///
/// One reader task runs per source. Every task holds a sender clone, so the
/// channel (and therefore the combined stream) closes only after the last
/// source ends. A read error is forwarded and ends that source.
pub fn combine_streams<R>(sources: Vec<R>, buffer_size: usize) -> CombinedStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer_size.max(1));

    for (index, source) in sources.into_iter().enumerate() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut chunks = ReaderStream::new(source);
            while let Some(chunk) = chunks.next().await {
                let failed = chunk.is_err();
                if tx.send(chunk).await.is_err() || failed {
                    break;
                }
            }
            trace!(source = index, "combined source ended");
        });
    }

    // Drop the original sender so the channel closes when readers finish
    drop(tx);

    CombinedStream {
        inner: ReceiverStream::new(rx),
    }
}

/// Split a chunk stream on `\n`, yielding each line without its terminator.
///
/// A trailing `\r` is stripped as well. A final line without a newline is
/// still yielded. The stream ends after the first error.
pub fn split_lines<S>(chunks: S) -> impl Stream<Item = io::Result<String>> + Send
where
    S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
{
    let reader = StreamReader::new(chunks);
    futures::stream::try_unfold(reader, |mut reader| async move {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some((String::from_utf8_lossy(&line).into_owned(), reader)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = io::Result<Bytes>> + Unpin + Send {
        futures::stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(part.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn read_to_string_concatenates() {
        let reader: &[u8] = b"foobar";
        assert_eq!(read_to_string(reader).await.unwrap(), "foobar");
    }

    #[tokio::test]
    async fn read_to_string_rejects_on_error() {
        let reader = failing_reader();
        let err = read_to_string(reader).await.unwrap_err();
        assert_eq!(err.to_string(), "fudge");
    }

    fn failing_reader() -> StreamReader<impl Stream<Item = io::Result<Bytes>> + Unpin, Bytes>
    {
        StreamReader::new(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"foo")),
            Err(io::Error::other("fudge")),
        ]))
    }

    #[tokio::test]
    async fn combines_a_single_stream() {
        let source: &'static [u8] = b"foobar";
        let combined = combine_streams(vec![source], 4);
        let data: Vec<Bytes> = combined.try_collect().await.unwrap();
        assert_eq!(data.concat(), b"foobar");
    }

    #[tokio::test]
    async fn combines_multiple_streams() {
        let first: ByteSource = Box::new(&b"foo"[..]);
        let second: ByteSource = Box::new(&b"barbaz"[..]);
        let combined = combine_streams(vec![first, second], 4);
        let mut data: Vec<u8> = combined
            .try_collect::<Vec<Bytes>>()
            .await
            .unwrap()
            .concat();
        data.sort_unstable();
        let mut expected = b"foobarbaz".to_vec();
        expected.sort_unstable();
        assert_eq!(data, expected);
    }

    #[tokio::test]
    async fn waits_for_the_slowest_source() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let fast: ByteSource = Box::new(&b"fast"[..]);
        let slow: ByteSource = Box::new(reader);
        let mut combined = combine_streams(vec![fast, slow], 4);

        assert_eq!(combined.next().await.unwrap().unwrap(), Bytes::from_static(b"fast"));

        let pending = tokio::time::timeout(Duration::from_millis(50), combined.next()).await;
        assert!(pending.is_err(), "combined stream ended before the slow source");

        writer.write_all(b"slow").await.unwrap();
        drop(writer);
        assert_eq!(combined.next().await.unwrap().unwrap(), Bytes::from_static(b"slow"));
        assert!(combined.next().await.is_none());
    }

    #[tokio::test]
    async fn splits_lines_across_chunks() {
        let lines: Vec<String> = split_lines(chunks(&["fo", "o\nba", "r\n"]))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(lines, ["foo", "bar"]);
    }

    #[tokio::test]
    async fn keeps_unterminated_last_line_and_strips_cr() {
        let lines: Vec<String> = split_lines(chunks(&["a\r\n", "\n", "tail"]))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(lines, ["a", "", "tail"]);
    }
}
