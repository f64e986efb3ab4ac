//! Incremental framing of a streamed JSON array.
//!
//! The scan engine writes `[ {host}, {host}, ... ]` over the life of the
//! scan. `JsonArrayCodec` yields each top-level element as soon as its last
//! byte arrives, so memory is bounded by one host object rather than the
//! whole scan. Elements are not parsed here; the driver decodes each frame
//! independently so one malformed host cannot poison the rest.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// Default cap on the size of a single element.
pub const DEFAULT_MAX_ELEMENT_LEN: usize = 8 * 1024 * 1024;

/// One unit produced by the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw bytes of one complete array element.
    Element(Bytes),
    /// An element exceeded the size cap and was dropped (total bytes).
    Oversized(usize),
    /// The stream ended inside an element (bytes seen).
    Truncated(usize),
}

/// Framing failures. Both end the stream.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("output is not a JSON array (starts with byte 0x{0:02x})")]
    NotAnArray(u8),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitOpen,
    BetweenElements,
    InElement,
    Discarding,
    Closed,
}

/// Tracks nesting and string state while scanning one element.
#[derive(Debug, Default, Clone, Copy)]
struct ElementScanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ElementScanner {
    /// Feed bytes; returns the element's exclusive end offset within `bytes`
    /// once it is complete.
    fn feed(&mut self, bytes: &[u8]) -> Option<usize> {
        for (i, &b) in bytes.iter().enumerate() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return Some(i + 1);
                    }
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    if self.depth == 0 {
                        // A stray closer still has to make progress.
                        return Some(i.max(1));
                    }
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Some(i + 1);
                    }
                }
                b',' if self.depth == 0 => return Some(i),
                b if self.depth == 0 && b.is_ascii_whitespace() => return Some(i),
                _ => {}
            }
        }
        None
    }
}

/// Splits a streamed top-level JSON array into element frames.
#[derive(Debug)]
pub struct JsonArrayCodec {
    state: State,
    scanner: ElementScanner,
    /// Bytes of the current element already scanned.
    cursor: usize,
    /// Bytes dropped from an oversized element so far.
    discarded: usize,
    max_element_len: usize,
}

impl JsonArrayCodec {
    pub fn new(max_element_len: usize) -> Self {
        Self {
            state: State::AwaitOpen,
            scanner: ElementScanner::default(),
            cursor: 0,
            discarded: 0,
            max_element_len,
        }
    }

    /// Whether the opening `[` has been seen.
    pub fn opened(&self) -> bool {
        self.state != State::AwaitOpen
    }

    fn start_element(&mut self) {
        self.state = State::InElement;
        self.scanner = ElementScanner::default();
        self.cursor = 0;
        self.discarded = 0;
    }

    fn finish_element(&mut self) {
        self.state = State::BetweenElements;
        self.scanner = ElementScanner::default();
        self.cursor = 0;
        self.discarded = 0;
    }
}

impl Default for JsonArrayCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ELEMENT_LEN)
    }
}

fn skip_while(src: &mut BytesMut, pred: impl Fn(u8) -> bool) {
    let n = src.iter().take_while(|&&b| pred(b)).count();
    src.advance(n);
}

impl Decoder for JsonArrayCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        loop {
            match self.state {
                State::AwaitOpen => {
                    skip_while(src, |b| b.is_ascii_whitespace());
                    let Some(&first) = src.first() else {
                        return Ok(None);
                    };
                    if first != b'[' {
                        return Err(CodecError::NotAnArray(first));
                    }
                    src.advance(1);
                    self.state = State::BetweenElements;
                }
                State::BetweenElements => {
                    skip_while(src, |b| b.is_ascii_whitespace() || b == b',');
                    let Some(&next) = src.first() else {
                        return Ok(None);
                    };
                    if next == b']' {
                        src.advance(1);
                        self.state = State::Closed;
                        continue;
                    }
                    self.start_element();
                }
                State::InElement => match self.scanner.feed(&src[self.cursor..]) {
                    Some(n) => {
                        let element = src.split_to(self.cursor + n).freeze();
                        self.finish_element();
                        return Ok(Some(Frame::Element(element)));
                    }
                    None if src.len() > self.max_element_len => {
                        self.discarded = src.len();
                        src.clear();
                        self.cursor = 0;
                        self.state = State::Discarding;
                        return Ok(None);
                    }
                    None => {
                        self.cursor = src.len();
                        return Ok(None);
                    }
                },
                State::Discarding => match self.scanner.feed(&src[..]) {
                    Some(n) => {
                        src.advance(n);
                        let total = self.discarded + n;
                        self.finish_element();
                        return Ok(Some(Frame::Oversized(total)));
                    }
                    None => {
                        self.discarded += src.len();
                        src.clear();
                        return Ok(None);
                    }
                },
                State::Closed => {
                    // Anything after the closing bracket is not ours.
                    src.clear();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        match self.state {
            State::InElement | State::Discarding => {
                let seen = src.len() + self.discarded;
                src.clear();
                self.state = State::Closed;
                Ok(Some(Frame::Truncated(seen)))
            }
            _ => {
                src.clear();
                Ok(None)
            }
        }
    }
}
