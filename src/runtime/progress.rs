// ABOUTME: Decoder for the engine's newline-delimited JSON progress stream.
// ABOUTME: Turns raw body chunks into ProgressEvents, one per line.

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use std::fmt::Display;
use std::pin::Pin;

use super::EngineError;
use super::traits::{ProgressEvent, ProgressStream};

struct LineDecoder<S> {
    body: Pin<Box<S>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl<S> LineDecoder<S> {
    /// Pop the next complete, non-blank line from the buffer.
    fn next_line(&mut self) -> Option<Vec<u8>> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let trimmed = line.trim_ascii();
            if !trimmed.is_empty() {
                return Some(trimmed.to_vec());
            }
        }
        None
    }

    /// Whatever is left once the body has ended.
    fn take_rest(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buffer);
        let trimmed = rest.trim_ascii();
        (!trimmed.is_empty()).then(|| trimmed.to_vec())
    }
}

fn parse_event(line: &[u8]) -> Result<ProgressEvent, EngineError> {
    serde_json::from_slice(line)
        .map_err(|e| EngineError::InvalidResponse(format!("malformed progress event: {e}")))
}

/// Decode a chunked body into progress events.
///
/// Events are separated by newlines; chunk boundaries may fall anywhere.
/// A read failure yields one error and then ends the stream.
pub fn decode_progress<S, E>(body: S) -> ProgressStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let decoder = LineDecoder {
        body: Box::pin(body),
        buffer: Vec::new(),
        finished: false,
    };

    Box::pin(stream::unfold(decoder, |mut state| async move {
        loop {
            if let Some(line) = state.next_line() {
                return Some((parse_event(&line), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    let err = EngineError::Runtime(format!("progress stream interrupted: {e}"));
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    let rest = state.take_rest()?;
                    return Some((parse_event(&rest), state));
                }
            }
        }
    }))
}
