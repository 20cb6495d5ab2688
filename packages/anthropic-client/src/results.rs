//! JSONL parser for batch result files.
//!
//! Converts a raw `reqwest` byte stream into `BatchResultItem` values, one per
//! line. Handles lines split across chunks and a missing trailing newline.

use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::AnthropicError;
use crate::types::BatchResultItem;

/// Stream adapter over the results body.
pub struct BatchResultStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    // Raw bytes, so multi-byte characters split across chunks survive
    buffer: Vec<u8>,
}

impl BatchResultStream {
    pub(crate) fn new(
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: Vec::new(),
        }
    }
}

impl Stream for BatchResultStream {
    type Item = Result<BatchResultItem, AnthropicError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(item) = try_parse_line(&mut this.buffer) {
                return Poll::Ready(Some(item));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(AnthropicError::Network(e.to_string()))));
                }
                Poll::Ready(None) => {
                    // Last line may lack its newline
                    let rest = std::mem::take(&mut this.buffer);
                    return match decode_line(&rest) {
                        Ok(line) if line.is_empty() => Poll::Ready(None),
                        Ok(line) => Poll::Ready(Some(parse_item(line))),
                        Err(e) => Poll::Ready(Some(Err(e))),
                    };
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Pop the next complete, non-blank line off the buffer and parse it.
fn try_parse_line(buffer: &mut Vec<u8>) -> Option<Result<BatchResultItem, AnthropicError>> {
    loop {
        let newline_pos = buffer.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();

        match decode_line(&raw) {
            Ok(line) if line.is_empty() => continue,
            Ok(line) => return Some(parse_item(line)),
            Err(e) => return Some(Err(e)),
        }
    }
}

fn decode_line(raw: &[u8]) -> Result<&str, AnthropicError> {
    std::str::from_utf8(raw)
        .map(str::trim)
        .map_err(|e| AnthropicError::Parse(format!("Invalid UTF-8 in results: {}", e)))
}

fn parse_item(line: &str) -> Result<BatchResultItem, AnthropicError> {
    serde_json::from_str(line).map_err(|e| {
        let preview: String = line.chars().take(200).collect();
        AnthropicError::Parse(format!(
            "Failed to parse result line: {} (line: {})",
            e, preview
        ))
    })
}
