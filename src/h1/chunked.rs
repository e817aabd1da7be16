//! Incremental decoder for the chunked transfer-coding.
//!
//! The decoder never copies or reconstructs framing: callers feed it raw
//! spans and learn how many of those bytes belong to the current message,
//! so the original size lines, extensions, CRLFs and trailers can be
//! forwarded verbatim.

/// Longest accepted chunk-size or trailer line, including extensions.
const MAX_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Accumulating a chunk-size line.
    Size,
    /// Inside chunk data with this many bytes left.
    Data { remaining: u64 },
    /// Expecting the CRLF that terminates chunk data (`seen` counts `\r`).
    DataEnd { seen: u8 },
    /// After the zero chunk, accumulating trailer lines until a blank one.
    Trailers,
    /// Message complete.
    Done,
}

/// Error raised on malformed chunked framing.
#[derive(Debug)]
pub enum ChunkError {
    InvalidSize,
    MissingCrlf,
    LineTooLong,
}

impl std::fmt::Display for ChunkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkError::InvalidSize => write!(f, "invalid chunk size line"),
            ChunkError::MissingCrlf => write!(f, "chunk data not terminated by CRLF"),
            ChunkError::LineTooLong => write!(f, "chunk size or trailer line too long"),
        }
    }
}

impl std::error::Error for ChunkError {}

/// Outcome of feeding a span to the decoder.
#[derive(Debug, PartialEq, Eq)]
pub struct ChunkScan {
    /// How many input bytes belong to the current message.
    pub consumed: usize,
    /// Size of the chunk whose header completed within the span, if one did.
    pub boundary: Option<u64>,
    /// True once the terminal zero chunk and its trailers are consumed.
    pub finished: bool,
}

/// State of the incremental chunked parser.
#[derive(Debug)]
pub struct ChunkDecoder {
    phase: Phase,
    line: Vec<u8>,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            phase: Phase::Size,
            line: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Consume message bytes from `input`.
    ///
    /// Stops early when a second chunk header would begin, so each call
    /// reports at most one boundary. Bytes past `consumed` belong to the
    /// next message on the stream and must be retained by the caller.
    pub fn push(&mut self, input: &[u8]) -> Result<ChunkScan, ChunkError> {
        let mut i = 0;
        let mut boundary = None;

        while i < input.len() {
            match self.phase {
                Phase::Size => {
                    if boundary.is_some() {
                        break;
                    }
                    let b = input[i];
                    i += 1;
                    self.line.push(b);
                    if self.line.len() > MAX_LINE {
                        return Err(ChunkError::LineTooLong);
                    }
                    if b == b'\n' {
                        let size = parse_size_line(&self.line)?;
                        self.line.clear();
                        if size == 0 {
                            self.phase = Phase::Trailers;
                        } else {
                            boundary = Some(size);
                            self.phase = Phase::Data { remaining: size };
                        }
                    }
                }
                Phase::Data { remaining } => {
                    let take = remaining.min((input.len() - i) as u64);
                    i += take as usize;
                    let left = remaining - take;
                    self.phase = if left == 0 {
                        Phase::DataEnd { seen: 0 }
                    } else {
                        Phase::Data { remaining: left }
                    };
                }
                Phase::DataEnd { seen } => {
                    let b = input[i];
                    i += 1;
                    self.phase = match (seen, b) {
                        (0, b'\r') => Phase::DataEnd { seen: 1 },
                        (1, b'\n') => Phase::Size,
                        _ => return Err(ChunkError::MissingCrlf),
                    };
                }
                Phase::Trailers => {
                    let b = input[i];
                    i += 1;
                    self.line.push(b);
                    if self.line.len() > MAX_LINE {
                        return Err(ChunkError::LineTooLong);
                    }
                    if b == b'\n' {
                        let blank = self.line == b"\r\n" || self.line == b"\n";
                        self.line.clear();
                        if blank {
                            self.phase = Phase::Done;
                        }
                    }
                }
                Phase::Done => break,
            }
        }

        Ok(ChunkScan {
            consumed: i,
            boundary,
            finished: self.phase == Phase::Done,
        })
    }
}

fn parse_size_line(line: &[u8]) -> Result<u64, ChunkError> {
    let text = std::str::from_utf8(line).map_err(|_| ChunkError::InvalidSize)?;
    let size_hex = text
        .trim_end_matches(['\r', '\n'])
        .split(';')
        .next()
        .unwrap_or("")
        .trim();
    if size_hex.is_empty() {
        return Err(ChunkError::InvalidSize);
    }
    u64::from_str_radix(size_hex, 16).map_err(|_| ChunkError::InvalidSize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_then_terminal() {
        let mut dec = ChunkDecoder::new();

        let scan = dec.push(b"5\r\nhello\r\n").unwrap();
        assert_eq!(scan.consumed, 10);
        assert_eq!(scan.boundary, Some(5));
        assert!(!scan.finished);

        let scan = dec.push(b"0\r\n\r\n").unwrap();
        assert_eq!(scan.consumed, 5);
        assert_eq!(scan.boundary, None);
        assert!(scan.finished);
    }

    #[test]
    fn stops_before_second_chunk_header() {
        let mut dec = ChunkDecoder::new();
        let input = b"3\r\nabc\r\n4\r\ndefg\r\n0\r\n\r\n";

        let scan = dec.push(input).unwrap();
        assert_eq!(scan.consumed, 8);
        assert_eq!(scan.boundary, Some(3));

        let scan = dec.push(&input[8..]).unwrap();
        assert_eq!(scan.consumed, 9);
        assert_eq!(scan.boundary, Some(4));

        let scan = dec.push(&input[17..]).unwrap();
        assert!(scan.finished);
    }

    #[test]
    fn split_size_line_across_reads() {
        let mut dec = ChunkDecoder::new();

        let scan = dec.push(b"1").unwrap();
        assert_eq!(scan.consumed, 1);
        assert_eq!(scan.boundary, None);

        let scan = dec.push(b"0\r\n").unwrap();
        assert_eq!(scan.boundary, Some(0x10));
    }

    #[test]
    fn residual_after_terminal_is_not_consumed() {
        let mut dec = ChunkDecoder::new();
        let scan = dec.push(b"0\r\n\r\nGET / HTTP/1.1\r\n").unwrap();
        assert!(scan.finished);
        assert_eq!(scan.consumed, 5);
    }

    #[test]
    fn chunk_extensions_are_consumed_verbatim() {
        let mut dec = ChunkDecoder::new();
        let input = b"5;name=value\r\nhello\r\n0\r\n\r\n";
        let scan = dec.push(input).unwrap();
        assert_eq!(scan.boundary, Some(5));
        assert_eq!(scan.consumed, 21);
        let scan = dec.push(&input[scan.consumed..]).unwrap();
        assert!(scan.finished);
    }

    #[test]
    fn trailers_before_terminal_blank_line() {
        let mut dec = ChunkDecoder::new();
        let scan = dec.push(b"0\r\nx-sum: 1\r\n").unwrap();
        assert!(!scan.finished);
        let scan = dec.push(b"\r\n").unwrap();
        assert!(scan.finished);
    }

    #[test]
    fn bad_size_line_is_rejected() {
        let mut dec = ChunkDecoder::new();
        assert!(matches!(dec.push(b"zz\r\n"), Err(ChunkError::InvalidSize)));
    }

    #[test]
    fn missing_data_crlf_is_rejected() {
        let mut dec = ChunkDecoder::new();
        assert!(matches!(
            dec.push(b"3\r\nabcXY"),
            Err(ChunkError::MissingCrlf)
        ));
    }
}
