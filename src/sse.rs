//! Incremental parser for server-sent-event framing.
//!
//! Both providers stream responses as SSE: frames of `event:`/`data:`
//! lines terminated by a blank line. HTTP chunk boundaries fall anywhere —
//! mid-line, mid-UTF-8 sequence, between the two newlines of a frame
//! terminator — so the parser is a small state machine over an internal
//! byte buffer: [`SseParser::feed`] appends a chunk and returns every
//! frame completed so far, keeping any partial frame buffered for the
//! next call.
//!
//! ```text
//! event: content_block_delta
//! data: {"type":"content_block_delta","index":0,...}
//! <blank line>
//! ```
//!
//! The parser knows nothing about JSON or `[DONE]` sentinels; it yields
//! raw [`SseFrame`]s and the provider adapters interpret them.

/// One complete server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` line, if the frame had one
    pub event: Option<String>,

    /// Concatenated `data:` payload (multiple data lines joined with `\n`)
    pub data: String,
}

/// Stateful SSE frame assembler; one per stream.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of bytes and return all frames completed by it.
    ///
    /// Frames are delimited by a blank line (`\n\n` or `\r\n\r\n`).
    /// Incomplete trailing bytes stay buffered. Comment lines (leading
    /// `:`) and frames with no `data:` payload are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((frame_end, delim_len)) = find_frame_boundary(&self.buf) {
            let raw: Vec<u8> = self.buf.drain(..frame_end + delim_len).collect();
            if let Some(frame) = parse_frame(&raw[..frame_end]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes of any partial frame still waiting for its terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Locate the first blank-line delimiter, returning (frame length,
/// delimiter length). Checks the CRLF form first so `\r\n\r\n` is not
/// half-consumed as `\n\r\n`.
fn find_frame_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n");
    let lf = buf.windows(2).position(|w| w == b"\n\n");

    match (crlf, lf) {
        (Some(c), Some(l)) if c <= l => Some((c, 4)),
        (_, Some(l)) => Some((l, 2)),
        (Some(c), None) => Some((c, 4)),
        (None, None) => None,
    }
}

fn parse_frame(raw: &[u8]) -> Option<SseFrame> {
    let text = String::from_utf8_lossy(raw);

    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.starts_with(':') {
            // SSE comment / keep-alive
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.strip_prefix(' ').unwrap_or(value).to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}
