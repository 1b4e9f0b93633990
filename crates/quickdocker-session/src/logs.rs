//! Line-oriented log tails.
//!
//! The runtime hands back raw byte chunks. [`LogCursor`] turns them into
//! text lines lazily: nothing is read from the runtime until the consumer
//! asks for the next line, so a slow consumer slows the read instead of
//! buffering without bound.

use std::collections::VecDeque;

use futures::{StreamExt, stream::BoxStream};
use quickdocker_core::{ByteStream, Result, SharedRuntime};

/// Lines shown when the caller does not ask for a tail length.
pub const DEFAULT_TAIL: usize = 200;

/// Lazy sequence of log lines, each with its terminator when it had one.
pub type LogLines = BoxStream<'static, String>;

/// Opens log tails on containers.
pub struct LogStreamer {
    runtime: SharedRuntime,
}

impl LogStreamer {
    #[must_use]
    pub fn new(runtime: SharedRuntime) -> Self {
        Self { runtime }
    }

    /// Start following `container_id`, beginning `tail` lines back.
    ///
    /// # Errors
    /// Returns [`quickdocker_core::Error::NotFound`] for an unknown container
    /// and [`quickdocker_core::Error::RuntimeUnavailable`] when the runtime
    /// cannot be reached. Failures after the tail has started end the stream
    /// instead.
    pub async fn stream(&self, container_id: &str, tail: usize) -> Result<LogLines> {
        let source = self.runtime.tail_logs(container_id, tail).await?;
        tracing::info!(container_id, tail, "Log tail opened");
        Ok(LogCursor::new(source).into_lines())
    }
}

/// Decodes chunks to lines, carrying partial UTF-8 sequences across chunks.
pub struct LogCursor {
    source: ByteStream,
    carry: Vec<u8>,
    pending: VecDeque<String>,
    exhausted: bool,
}

impl LogCursor {
    #[must_use]
    pub fn new(source: ByteStream) -> Self {
        Self {
            source,
            carry: Vec::new(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next line, or `None` once the source is exhausted or failed.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(line);
            }
            if self.exhausted {
                return None;
            }
            match self.source.next().await {
                Some(Ok(chunk)) => self.push_chunk(&chunk),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Log stream read failed");
                    self.finish();
                }
                None => self.finish(),
            }
        }
    }

    #[must_use]
    pub fn into_lines(self) -> LogLines {
        futures::stream::unfold(self, |mut cursor| async move {
            let line = cursor.next_line().await?;
            Some((line, cursor))
        })
        .boxed()
    }

    fn push_chunk(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);
        self.carry = bytes.split_off(incomplete_tail(&bytes));
        let text = String::from_utf8_lossy(&bytes);
        self.pending.extend(split_lines(&text).map(str::to_owned));
    }

    fn finish(&mut self) {
        self.exhausted = true;
        if !self.carry.is_empty() {
            let rest = std::mem::take(&mut self.carry);
            let text = String::from_utf8_lossy(&rest);
            self.pending.extend(split_lines(&text).map(str::to_owned));
        }
    }
}

/// Start of a truncated UTF-8 sequence at the end of `bytes`, or its length.
fn incomplete_tail(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let b = bytes[len - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = if b & 0b1110_0000 == 0b1100_0000 {
            2
        } else if b & 0b1111_0000 == 0b1110_0000 {
            3
        } else if b & 0b1111_1000 == 0b1111_0000 {
            4
        } else {
            1
        };
        return if needed > back { len - back } else { len };
    }
    len
}

/// Split on `\n`, `\r\n` and lone `\r`, keeping terminators.
///
/// Form feed, vertical tab and the Unicode line separators stay inside the
/// line; terminal output uses them as control characters, not line breaks.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;
    std::iter::from_fn(move || {
        while i < bytes.len() {
            let at = i;
            i += 1;
            let end = match bytes[at] {
                b'\n' => at + 1,
                b'\r' if bytes.get(at + 1) == Some(&b'\n') => {
                    i += 1;
                    at + 2
                }
                b'\r' => at + 1,
                _ => continue,
            };
            let line = &text[start..end];
            start = end;
            return Some(line);
        }
        if start < bytes.len() {
            let line = &text[start..];
            start = bytes.len();
            return Some(line);
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc, time::Duration};

    use bytes::Bytes;
    use quickdocker_core::{
        Error,
        testing::{FakeRuntime, container},
    };

    use super::*;

    fn chunks(parts: Vec<io::Result<Bytes>>) -> ByteStream {
        futures::stream::iter(parts).boxed()
    }

    async fn collect(source: ByteStream) -> Vec<String> {
        LogCursor::new(source).into_lines().collect().await
    }

    #[test]
    fn test_split_keeps_terminators() {
        let lines: Vec<_> = split_lines("a\nb\r\nc\rd").collect();
        assert_eq!(lines, vec!["a\n", "b\r\n", "c\r", "d"]);
        assert_eq!(split_lines("").count(), 0);
        assert_eq!(split_lines("\n\n").collect::<Vec<_>>(), vec!["\n", "\n"]);
        assert_eq!(
            split_lines("page\x0cbreak\u{2028}x\n").collect::<Vec<_>>(),
            vec!["page\x0cbreak\u{2028}x\n"]
        );
    }

    #[test]
    fn test_incomplete_tail() {
        assert_eq!(incomplete_tail(b"abc"), 3);
        let snowman = "☃".as_bytes();
        assert_eq!(incomplete_tail(&snowman[..2]), 0);
        assert_eq!(incomplete_tail(snowman), 3);
        let mut mixed = b"ok ".to_vec();
        mixed.push(snowman[0]);
        assert_eq!(incomplete_tail(&mixed), 3);
    }

    #[tokio::test]
    async fn test_lines_across_chunks() {
        let source = chunks(vec![
            Ok(Bytes::from("first\nsec")),
            Ok(Bytes::from("ond\n")),
        ]);
        assert_eq!(collect(source).await, vec!["first\n", "sec", "ond\n"]);
    }

    #[tokio::test]
    async fn test_utf8_split_across_chunks() {
        let snowman = "☃".as_bytes();
        let mut first = b"snow ".to_vec();
        first.extend_from_slice(&snowman[..1]);
        let mut second = snowman[1..].to_vec();
        second.extend_from_slice(b"\n");

        let lines = collect(chunks(vec![Ok(first.into()), Ok(second.into())])).await;
        assert_eq!(lines.concat(), "snow ☃\n");
        assert!(lines.iter().all(|l| !l.contains('\u{FFFD}')));
    }

    #[tokio::test]
    async fn test_invalid_bytes_are_replaced() {
        let lines = collect(chunks(vec![Ok(Bytes::from_static(b"bad \xff\n"))])).await;
        assert_eq!(lines, vec!["bad \u{FFFD}\n"]);
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        let source = chunks(vec![
            Ok(Bytes::from("one\n")),
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
            Ok(Bytes::from("never\n")),
        ]);
        assert_eq!(collect(source).await, vec!["one\n"]);
    }

    #[tokio::test]
    async fn test_tail_then_follow() {
        let fake = Arc::new(FakeRuntime::with_containers(vec![container(
            "web-1", "shop", "running",
        )]));
        fake.append_log("web-1", "a\nb\nc\nd\ne\n");
        let streamer = LogStreamer::new(fake.clone());

        let mut lines = streamer.stream("web-1", 1).await.unwrap();
        assert_eq!(lines.next().await.as_deref(), Some("e\n"));

        fake.append_log("web-1", "f\n");
        let next = tokio::time::timeout(Duration::from_secs(1), lines.next()).await;
        assert_eq!(next.unwrap().as_deref(), Some("f\n"));

        fake.finish_logs("web-1");
        assert_eq!(lines.next().await, None);
        drop(lines);
        assert_eq!(fake.open_sockets(), 0);
    }

    #[tokio::test]
    async fn test_tail_counts_lines() {
        let fake = Arc::new(FakeRuntime::with_containers(vec![container(
            "web-1", "shop", "running",
        )]));
        for line in ["a\n", "b\n", "c\n", "d\n", "e\n"] {
            fake.append_log("web-1", line);
        }
        let streamer = LogStreamer::new(fake.clone());
        let mut lines = streamer.stream("web-1", 3).await.unwrap();
        for expected in ["c\n", "d\n", "e\n"] {
            assert_eq!(lines.next().await.as_deref(), Some(expected));
        }

        fake.append_log("web-1", "f\n");
        assert_eq!(lines.next().await.as_deref(), Some("f\n"));
    }

    #[tokio::test]
    async fn test_unknown_container() {
        let fake = Arc::new(FakeRuntime::new());
        let streamer = LogStreamer::new(fake.clone());
        let Err(err) = streamer.stream("ghost", DEFAULT_TAIL).await else {
            panic!("expected an error");
        };
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(fake.open_sockets(), 0);
    }
}
