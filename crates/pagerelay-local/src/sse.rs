//! Incremental decoder for Responses-style server-sent events.
//!
//! Network chunks can split a line (or a UTF-8 sequence) anywhere, so bytes are buffered until a
//! newline arrives and only complete lines are parsed. Each `data:` line is expected to carry one
//! JSON event; `event:`/`id:`/`retry:` fields and comments are ignored.

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// `response.output_text.delta`: a fragment of answer text.
    OutputTextDelta(String),
    /// `response.completed` / `response.done`.
    Completed,
    /// `response.failed` or a top-level `error` event.
    Failed(String),
    /// The literal `[DONE]` terminator.
    Done,
    /// Any other event type; carried for logging only.
    Other(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SseError {
    #[error("{0}")]
    Failed(String),
    #[error("stream error: {0}")]
    Transport(String),
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns events for every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(ev) = parse_line(&String::from_utf8_lossy(&line[..pos])) {
                out.push(ev);
            }
        }
        out
    }

    /// Flush a trailing line that never got its newline.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buf);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn parse_line(line: &str) -> Option<StreamEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty()
        || line.starts_with(':')
        || line.starts_with("event:")
        || line.starts_with("id:")
        || line.starts_with("retry:")
    {
        return None;
    }
    let data = match line.strip_prefix("data:") {
        Some(d) => d.strip_prefix(' ').unwrap_or(d),
        None => line,
    };
    if data.trim() == "[DONE]" {
        return Some(StreamEvent::Done);
    }
    let event: Value = serde_json::from_str(data).ok()?;
    let kind = event.get("type").and_then(Value::as_str).unwrap_or_default();
    Some(match kind {
        "response.output_text.delta" => StreamEvent::OutputTextDelta(
            event
                .get("delta")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        "response.completed" | "response.done" => StreamEvent::Completed,
        "response.failed" => StreamEvent::Failed(
            event
                .pointer("/response/error/message")
                .and_then(Value::as_str)
                .unwrap_or("Response failed")
                .to_string(),
        ),
        "error" => StreamEvent::Failed(
            event
                .get("message")
                .or_else(|| event.pointer("/error/message"))
                .and_then(Value::as_str)
                .unwrap_or("stream error")
                .to_string(),
        ),
        other => StreamEvent::Other(other.to_string()),
    })
}

struct DeltaState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

/// Lazily turn a byte stream into answer-text fragments.
///
/// Ends at `response.completed`/`[DONE]` or at end of body. A failure event or transport error is
/// yielded once as `Err`, after which the stream ends.
pub fn text_deltas<S, B, E>(body: S) -> impl Stream<Item = Result<String, SseError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DeltaState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };
    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(ev) = st.pending.pop_front() {
                match ev {
                    StreamEvent::OutputTextDelta(t) => return Some((Ok(t), st)),
                    StreamEvent::Failed(m) => {
                        st.pending.clear();
                        st.done = true;
                        return Some((Err(SseError::Failed(m)), st));
                    }
                    StreamEvent::Completed | StreamEvent::Done => {
                        st.pending.clear();
                        st.done = true;
                    }
                    StreamEvent::Other(_) => {}
                }
                continue;
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let evs = st.decoder.push(chunk.as_ref());
                    st.pending.extend(evs);
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(SseError::Transport(e.to_string())), st));
                }
                None => {
                    let evs = st.decoder.finish();
                    st.pending.extend(evs);
                    st.done = true;
                }
            }
        }
    })
}
