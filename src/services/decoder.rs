//! Turns a successful upstream response into the generated text.
//!
//! `generateContent` answers with one JSON object. `streamGenerateContent` answers
//! with a JSON array of chunk objects; the array is split incrementally as bytes
//! arrive and each chunk's text is folded into the result in arrival order.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tracing::{error, warn};

use crate::error::{RelayError, RelayResult};
use crate::models::gemini::GenerateContentResponse;

#[async_trait]
pub trait ResponseDecoder: Send + Sync {
    /// Endpoint method this decoder understands, e.g. `generateContent`.
    fn method(&self) -> &'static str;

    async fn decode(&self, response: reqwest::Response) -> RelayResult<String>;
}

pub struct SingleResponseDecoder;

#[async_trait]
impl ResponseDecoder for SingleResponseDecoder {
    fn method(&self) -> &'static str {
        "generateContent"
    }

    async fn decode(&self, response: reqwest::Response) -> RelayResult<String> {
        let body = response
            .bytes()
            .await
            .map_err(|e| {
                RelayError::Network(format!("Failed to read model response: {}", e.without_url()))
            })?;
        decode_single(&body)
    }
}

pub fn decode_single(body: &[u8]) -> RelayResult<String> {
    let parsed: GenerateContentResponse = serde_json::from_slice(body).map_err(|e| {
        error!(
            "Failed to parse model response: {} - {}",
            e,
            String::from_utf8_lossy(body)
        );
        RelayError::EmptyOrInvalidResponse
    })?;

    match parsed.first_text() {
        Some(text) => Ok(text.to_string()),
        None => {
            if let Some(reason) = parsed
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.as_deref())
            {
                warn!("Prompt was blocked by the model: {}", reason);
            }
            error!(
                "Invalid response structure from API: {}",
                String::from_utf8_lossy(body)
            );
            Err(RelayError::EmptyOrInvalidResponse)
        }
    }
}

pub struct StreamChunkDecoder;

#[async_trait]
impl ResponseDecoder for StreamChunkDecoder {
    fn method(&self) -> &'static str {
        "streamGenerateContent"
    }

    async fn decode(&self, response: reqwest::Response) -> RelayResult<String> {
        concat_fragments(text_fragments(response.bytes_stream())).await
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SplitError {
    #[error("unexpected byte {0:#04x} outside a chunk object")]
    Unexpected(u8),
    #[error("stream ended before the chunk array was closed")]
    Truncated,
}

/// Incremental splitter for a top-level JSON array of objects.
///
/// Feed it arbitrary byte slices; it returns every object completed so far.
/// Only strings and nesting are tracked, the objects themselves are parsed later.
#[derive(Debug, Default)]
pub struct ChunkSplitter {
    opened: bool,
    closed: bool,
    depth: usize,
    in_string: bool,
    escaped: bool,
    current: Vec<u8>,
}

impl ChunkSplitter {
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, SplitError> {
        let mut complete = Vec::new();

        for &b in bytes {
            if self.depth == 0 {
                match b {
                    b' ' | b'\t' | b'\r' | b'\n' => {}
                    b'[' if !self.opened => self.opened = true,
                    b',' if self.opened && !self.closed => {}
                    b']' if self.opened && !self.closed => self.closed = true,
                    b'{' if self.opened && !self.closed => {
                        self.depth = 1;
                        self.current.push(b);
                    }
                    other => return Err(SplitError::Unexpected(other)),
                }
                continue;
            }

            self.current.push(b);

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        complete.push(std::mem::take(&mut self.current));
                    }
                }
                _ => {}
            }
        }

        Ok(complete)
    }

    pub fn finish(&self) -> Result<(), SplitError> {
        if self.opened && self.closed && self.depth == 0 {
            Ok(())
        } else {
            Err(SplitError::Truncated)
        }
    }
}

struct ChunkState<S> {
    bytes: Pin<Box<S>>,
    splitter: ChunkSplitter,
    ready: VecDeque<Vec<u8>>,
    finished: bool,
}

fn parse_chunk(raw: &[u8]) -> RelayResult<GenerateContentResponse> {
    serde_json::from_slice(raw).map_err(|e| {
        error!(
            "Failed to parse stream chunk: {} - {}",
            e,
            String::from_utf8_lossy(raw)
        );
        RelayError::EmptyOrInvalidResponse
    })
}

/// Lazily yields each chunk of a streamed response as it completes.
pub fn chunk_stream<S, E>(bytes: S) -> impl Stream<Item = RelayResult<GenerateContentResponse>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let state = ChunkState {
        bytes: Box::pin(bytes),
        splitter: ChunkSplitter::default(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(raw) = st.ready.pop_front() {
                return Some((parse_chunk(&raw), st));
            }
            if st.finished {
                return None;
            }

            match st.bytes.next().await {
                Some(Ok(bytes)) => match st.splitter.push(&bytes) {
                    Ok(objects) => st.ready.extend(objects),
                    Err(e) => {
                        error!("Malformed streamed response: {}", e);
                        st.finished = true;
                        return Some((Err(RelayError::EmptyOrInvalidResponse), st));
                    }
                },
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((
                        Err(RelayError::Network(format!(
                            "Failed to read model response stream: {}",
                            e
                        ))),
                        st,
                    ));
                }
                None => {
                    st.finished = true;
                    if let Err(e) = st.splitter.finish() {
                        error!("Malformed streamed response: {}", e);
                        return Some((Err(RelayError::EmptyOrInvalidResponse), st));
                    }
                }
            }
        }
    })
}

/// Text of every chunk that has some, in arrival order. Chunks without text are skipped.
pub fn text_fragments<S, E>(bytes: S) -> impl Stream<Item = RelayResult<String>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    chunk_stream(bytes).filter_map(|item| {
        futures::future::ready(match item {
            Ok(chunk) => chunk.first_text().map(|t| Ok(t.to_string())),
            Err(e) => Some(Err(e)),
        })
    })
}

pub async fn concat_fragments<F>(fragments: F) -> RelayResult<String>
where
    F: Stream<Item = RelayResult<String>>,
{
    let text = fragments
        .try_fold(String::new(), |mut acc, fragment| async move {
            acc.push_str(&fragment);
            Ok(acc)
        })
        .await?;

    if text.is_empty() {
        error!("Streamed response contained no text");
        return Err(RelayError::EmptyOrInvalidResponse);
    }

    Ok(text)
}
