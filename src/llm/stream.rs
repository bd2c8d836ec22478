//! Server-sent-event decoding for streamed completions

use crate::error::LlmError;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Part {
    pub text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    pub(crate) fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Parse a single SSE line. Returns:
/// - Some(Ok(text)) for a chunk carrying text
/// - Some(Err(e)) for a malformed data line
/// - None for blank lines, comments, non-data fields and empty chunks
pub(crate) fn parse_sse_line(line: &str) -> Option<Result<String, LlmError>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<GenerateResponse>(data) {
        Ok(chunk) => {
            let text = chunk.text();
            if text.is_empty() { None } else { Some(Ok(text)) }
        }
        Err(e) => Some(Err(LlmError::InvalidResponse(format!(
            "Failed to parse stream chunk: {}",
            e
        )))),
    }
}

/// Convert a byte stream into a stream of complete lines
///
/// Bytes are buffered until a newline arrives, so a multi-byte character
/// split across chunks is decoded whole.
pub(crate) fn stream_lines<B, E>(
    byte_stream: impl Stream<Item = Result<B, E>> + Send + 'static,
) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures::stream::unfold(
        (Box::pin(byte_stream), Vec::<u8>::new(), false),
        |(mut stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    let line = String::from_utf8_lossy(&raw[..newline_pos])
                        .trim_end_matches('\r')
                        .to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => {
                        return Some((
                            Err(LlmError::Transport(format!("Stream read error: {}", e))),
                            (stream, buffer, true),
                        ));
                    }
                    None => {
                        let remaining = String::from_utf8_lossy(&buffer).to_string();
                        buffer.clear();
                        if !remaining.trim().is_empty() {
                            return Some((Ok(remaining), (stream, buffer, true)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Decode an SSE byte stream into text chunks
pub(crate) fn decode_sse<B, E>(
    byte_stream: impl Stream<Item = Result<B, E>> + Send + 'static,
) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    stream_lines(byte_stream).filter_map(|line| async move {
        match line {
            Ok(line) => parse_sse_line(&line),
            Err(e) => Some(Err(e)),
        }
    })
}
