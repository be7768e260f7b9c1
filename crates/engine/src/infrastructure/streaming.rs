//! Line decoding for streamed model responses.
//!
//! Every backend that streams does it over a line-oriented body: Ollama
//! emits newline-delimited JSON, Anthropic and OpenAI emit server-sent
//! events. [`text_chunks`] buffers the raw bytes, reassembles complete
//! lines across chunk boundaries, and maps each line through a
//! backend-supplied decoder into narration text increments.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, Stream, StreamExt};

use crate::infrastructure::ports::{LlmError, TextStream};

/// Decode a line-oriented byte stream into text increments.
///
/// `decode` sees each complete line with trailing `\r\n` stripped and
/// returns the text it carries, if any. Lines decoded to `None` and empty
/// increments are dropped. A trailing line without a newline is still
/// decoded when the body ends. A transport error ends the stream after
/// yielding a single `Err` item.
pub(crate) fn text_chunks<S, B, E, F>(bytes: S, decode: F) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: Fn(&str) -> Option<String> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        buffer: String::new(),
        pending: VecDeque::new(),
        decode,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                return Some((Ok(text), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state
                        .buffer
                        .push_str(&String::from_utf8_lossy(chunk.as_ref()));
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    let err = LlmError::RequestFailed(format!("Stream read failed: {e}"));
                    return Some((Err(err), state));
                }
                None => {
                    state.done = true;
                    state.flush();
                }
            }
        }
    })
    .boxed()
}

struct DecodeState<S, F> {
    bytes: Pin<Box<S>>,
    buffer: String,
    pending: VecDeque<String>,
    decode: F,
    done: bool,
}

impl<S, F> DecodeState<S, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            self.push_decoded(&line);
        }
    }

    fn flush(&mut self) {
        let rest = std::mem::take(&mut self.buffer);
        self.push_decoded(&rest);
    }

    fn push_decoded(&mut self, line: &str) {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return;
        }
        if let Some(text) = (self.decode)(line) {
            if !text.is_empty() {
                self.pending.push_back(text);
            }
        }
    }
}
