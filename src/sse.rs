//! Server-sent events decoding for the completion stream.
//!
//! The completion service answers streaming calls with `text/event-stream`
//! frames separated by a blank line. Only `data:` fields matter here;
//! comments (`:`) and other fields are skipped.

use crate::error::RelayError;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Payload that ends an OpenAI-style stream
pub const DONE_SENTINEL: &str = "[DONE]";

pub type DataStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Remove one complete frame from the front of `buffer`, if there is one.
pub fn extract_frame(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    let lf = buffer.windows(2).position(|w| w == b"\n\n");

    // Whichever delimiter comes first ends the frame
    let (pos, delimiter_len) = match (crlf, lf) {
        (Some(c), Some(l)) if l < c => (l, 2),
        (Some(c), _) => (c, 4),
        (None, Some(l)) => (l, 2),
        (None, None) => return None,
    };

    let frame = buffer.drain(..pos).collect::<Vec<u8>>();
    buffer.drain(..delimiter_len);
    Some(frame)
}

/// Join the `data:` lines of a frame. `None` when the frame carries no data.
pub fn data_from_frame(frame: &str) -> Option<String> {
    let mut data_parts: Vec<&str> = Vec::new();

    for raw_line in frame.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_parts.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data_parts.is_empty() {
        return None;
    }
    Some(data_parts.join("\n"))
}

/// Turn a byte stream into a stream of `data:` payloads.
///
/// The first transport error is yielded and ends the stream.
pub fn data_stream<S, B, E>(bytes: S) -> DataStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<RelayError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut bytes = Box::pin(bytes);

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => buffer.extend_from_slice(chunk.as_ref()),
                Err(e) => {
                    let err: RelayError = e.into();
                    yield Err(err);
                    return;
                }
            }

            while let Some(frame) = extract_frame(&mut buffer) {
                if let Some(data) = data_from_frame(&String::from_utf8_lossy(&frame)) {
                    yield Ok(data);
                }
            }
        }

        // Trailing frame without the final blank line
        if !buffer.is_empty() {
            if let Some(data) = data_from_frame(&String::from_utf8_lossy(&buffer)) {
                yield Ok(data);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_extract_frame_lf() {
        let mut buffer = b"data: one\n\ndata: two\n\npartial".to_vec();

        assert_eq!(extract_frame(&mut buffer).unwrap(), b"data: one");
        assert_eq!(extract_frame(&mut buffer).unwrap(), b"data: two");
        assert!(extract_frame(&mut buffer).is_none());
        assert_eq!(buffer, b"partial");
    }

    #[test]
    fn test_extract_frame_crlf() {
        let mut buffer = b"data: one\r\n\r\ndata: two\r\n\r\n".to_vec();

        assert_eq!(extract_frame(&mut buffer).unwrap(), b"data: one");
        assert_eq!(extract_frame(&mut buffer).unwrap(), b"data: two");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_data_from_frame() {
        assert_eq!(data_from_frame("data: {\"a\":1}").unwrap(), "{\"a\":1}");
        assert_eq!(data_from_frame("data:{\"a\":1}").unwrap(), "{\"a\":1}");
        assert_eq!(
            data_from_frame("event: message\ndata: first\ndata: second").unwrap(),
            "first\nsecond"
        );
        assert!(data_from_frame(": keep-alive").is_none());
        assert!(data_from_frame("event: ping").is_none());
    }

    #[tokio::test]
    async fn test_data_stream_reassembles_split_chunks() {
        let chunks: Vec<Result<&'static [u8], RelayError>> = vec![
            Ok(b"data: {\"id\":".as_slice()),
            Ok(b"1}\n\n: comment\n\ndata: {\"id\":2}\n".as_slice()),
            Ok(b"\ndata: [DONE]\n\n".as_slice()),
        ];

        let items: Vec<String> = data_stream(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(items, vec!["{\"id\":1}", "{\"id\":2}", "[DONE]"]);
    }

    #[tokio::test]
    async fn test_data_stream_stops_on_transport_error() {
        let chunks: Vec<Result<&'static [u8], RelayError>> = vec![
            Ok(b"data: a\n\n".as_slice()),
            Err(RelayError::Upstream("connection reset".to_string())),
            Ok(b"data: b\n\n".as_slice()),
        ];

        let items: Vec<Result<String, RelayError>> =
            data_stream(stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_data_stream_flushes_trailing_frame() {
        let chunks: Vec<Result<&'static [u8], RelayError>> = vec![Ok(b"data: tail".as_slice())];

        let items: Vec<String> = data_stream(stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(items, vec!["tail"]);
    }
}
