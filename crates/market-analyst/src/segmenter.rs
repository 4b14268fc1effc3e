//! Stream Segmenter
//!
//! Consumes an incremental token stream from a generative model and emits
//! complete, well-formed segments as soon as a boundary marker is observed.
//! The model is instructed to terminate each logical section with a soft
//! marker and the whole analysis with a hard marker; both are plain in-band
//! substrings, so a marker may arrive split across any number of tokens.

use std::collections::VecDeque;

use agent_core::provider::CompletionStream;
use futures::{Stream, StreamExt};

use crate::model::StreamSegment;
use crate::sanitizer::sanitize;

/// The in-band boundary vocabulary.
///
/// Kept behind this struct so the marker strings can change without touching
/// any caller.
#[derive(Clone, Debug)]
pub struct SegmentMarkers {
    /// Ends one segment, more may follow.
    pub soft: String,

    /// Ends the whole analysis.
    pub hard: String,
}

impl Default for SegmentMarkers {
    fn default() -> Self {
        Self {
            soft: "[SEGMENT_COMPLETE]".into(),
            hard: "[ANALYSIS_COMPLETE]".into(),
        }
    }
}

/// Incremental boundary-marker state machine.
///
/// Push tokens in; complete segments come out. Once the hard marker has been
/// seen the segmenter is done and ignores further input. If the stream ends
/// without a hard marker, whatever is left in the buffer is discarded:
/// partial content without its closing marker is not guaranteed well-formed.
pub struct Segmenter {
    markers: SegmentMarkers,
    current: String,
    transcript: String,
    sequence: u32,
    done: bool,
}

impl Segmenter {
    pub fn new(markers: SegmentMarkers) -> Self {
        Self {
            markers,
            current: String::new(),
            transcript: String::new(),
            sequence: 0,
            done: false,
        }
    }

    /// Whether the hard marker has been observed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Full raw text accumulated so far, markers included.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Append one token and drain every segment it completes.
    ///
    /// Several markers can land in a single token, so the scan repeats until
    /// the buffer holds no complete boundary. The earliest marker by string
    /// index wins when both are present.
    pub fn push(&mut self, token: &str) -> Vec<StreamSegment> {
        if self.done {
            return Vec::new();
        }

        self.transcript.push_str(token);
        self.current.push_str(token);

        let mut emitted = Vec::new();
        loop {
            let soft_idx = self.current.find(&self.markers.soft);
            let hard_idx = self.current.find(&self.markers.hard);

            let (idx, is_hard) = match (soft_idx, hard_idx) {
                (Some(s), Some(h)) if h < s => (h, true),
                (Some(s), _) => (s, false),
                (None, Some(h)) => (h, true),
                (None, None) => break,
            };

            let candidate = self.current[..idx].trim().to_string();
            if !candidate.is_empty() {
                emitted.push(StreamSegment {
                    content: sanitize(&candidate),
                    is_final: is_hard,
                    sequence: self.sequence,
                });
                self.sequence += 1;
            }

            if is_hard {
                self.done = true;
                self.current.clear();
                break;
            }
            self.current = self.current[idx + self.markers.soft.len()..].to_string();
        }

        emitted
    }
}

/// Adapt a raw completion stream into a lazy, finite sequence of segments.
///
/// Each segment is yielded as soon as its boundary is recognized, not
/// buffered until stream end. An upstream transport error ends the sequence;
/// segments already emitted stay delivered and the unterminated tail is
/// dropped.
pub fn segment_stream(
    upstream: CompletionStream,
    markers: SegmentMarkers,
) -> impl Stream<Item = StreamSegment> + Send {
    struct State {
        upstream: CompletionStream,
        segmenter: Segmenter,
        pending: VecDeque<StreamSegment>,
        exhausted: bool,
    }

    let state = State {
        upstream,
        segmenter: Segmenter::new(markers),
        pending: VecDeque::new(),
        exhausted: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(segment) = state.pending.pop_front() {
                return Some((segment, state));
            }
            if state.exhausted || state.segmenter.is_done() {
                return None;
            }
            match state.upstream.next().await {
                Some(Ok(chunk)) => {
                    state.pending.extend(state.segmenter.push(&chunk.delta));
                    if chunk.done {
                        state.exhausted = true;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "analysis stream failed mid-flight, truncating");
                    state.exhausted = true;
                }
                None => state.exhausted = true,
            }
        }
    })
}
