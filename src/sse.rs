//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! With `alt=sse` the Gemini API sends one `data:` line per event, each
//! holding a complete `GenerateContentResponse` chunk. Events are separated
//! by a blank line; the separator may use `\r\n` line endings.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::{Error, GenerateContentResponse, Result};

/// Process a stream of bytes into a stream of response chunks.
///
/// This function takes a byte stream from an HTTP response and converts it into
/// a stream of parsed `GenerateContentResponse` objects, handling SSE parsing,
/// buffering, and error conditions.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<GenerateContentResponse>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    // Convert transport errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    // Bytes are buffered until a complete event is available; a multi-byte
    // character may straddle two chunks, so decoding waits for the separator.
    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer),
        move |(mut stream, mut buffer)| async move {
            loop {
                // First check if we have a complete event in the buffer
                if let Some((event, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    match event {
                        Some(event) => return Some((event, (stream, buffer))),
                        None => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer)));
                    }
                    None => {
                        // End of stream: a final event may lack its trailing separator
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let event = parse_event(&std::mem::take(&mut buffer));
                        return event.map(|event| (event, (stream, buffer)));
                    }
                }
            }
        },
    )
}

/// Split the first complete event off the buffer.
///
/// Returns `None` when no separator is present yet. Otherwise returns the
/// parsed event (or `None` for events carrying no data, such as comments)
/// and the remaining bytes.
#[allow(clippy::type_complexity)]
fn extract_event(buffer: &[u8]) -> Option<(Option<Result<GenerateContentResponse>>, Vec<u8>)> {
    let (end, separator_len) = find_separator(buffer)?;
    let event = parse_event(&buffer[..end]);
    Some((event, buffer[end + separator_len..].to_vec()))
}

/// Locate the earliest blank-line separator, accepting both `\n\n` and `\r\n\r\n`.
fn find_separator(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Parse the data lines of one SSE event.
fn parse_event(event: &[u8]) -> Option<Result<GenerateContentResponse>> {
    let event_text = match std::str::from_utf8(event) {
        Ok(text) => text,
        Err(e) => return Some(Err(e.into())),
    };

    // Multiple data lines of one event are joined with newlines
    let data: Vec<&str> = event_text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim())
        .collect();
    if data.is_empty() {
        return None;
    }
    let data = data.join("\n");

    Some(parse_chunk(&data))
}

/// Parse one chunk, recognising error payloads sent in place of a response.
fn parse_chunk(data: &str) -> Result<GenerateContentResponse> {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: ErrorBody,
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        code: Option<u16>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        status: Option<String>,
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        let body = envelope.error;
        let message = body.message.unwrap_or_else(|| data.to_string());
        return Err(Error::api(body.code.unwrap_or(500), body.status, message));
    }

    serde_json::from_str::<GenerateContentResponse>(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })
}
