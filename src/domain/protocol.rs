//! Rangefinder line protocol
//!
//! Protocol:
//! - One reading per line, terminated by `\n` (a trailing `\r` is tolerated)
//! - Data lines: `D:<int>,<int>,...,<int>`, two samples per slot
//! - Anything without the `D:` marker is chatter from the microcontroller
//!   (boot banners, debug prints) and is ignored

use thiserror::Error;

/// Prefix identifying a data-bearing line
pub const MARKER: &str = "D:";

/// Sensors per slot
pub const SAMPLES_PER_SLOT: usize = 2;

/// Sample sequence did not have exactly two readings per slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected {expected} samples, got {actual}")]
pub struct ShapeError {
    pub expected: usize,
    pub actual: usize,
}

/// Reasons a raw line was discarded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// Bytes are not valid UTF-8
    #[error("line is not valid text: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// A sample token is not a non-negative integer
    #[error("malformed sample {token:?} at position {index}")]
    Malformed { index: usize, token: String },

    /// Wrong number of samples for the configured slot count
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

impl LineError {
    /// Short label used for log events and counters
    pub fn kind(&self) -> &'static str {
        match self {
            LineError::Decode(_) => "decode",
            LineError::Malformed { .. } => "malformed",
            LineError::Shape(_) => "shape",
        }
    }
}

/// Decode raw transport bytes into a trimmed text line
pub fn decode_line(raw: &[u8]) -> Result<&str, LineError> {
    Ok(std::str::from_utf8(raw)?.trim())
}

/// Parse a decoded line into distance samples
///
/// Returns `Ok(None)` for lines without the marker. A single bad token rejects
/// the whole line.
pub fn parse_samples(line: &str) -> Result<Option<Vec<u32>>, LineError> {
    let Some(payload) = line.trim().strip_prefix(MARKER) else {
        return Ok(None);
    };

    payload
        .split(',')
        .enumerate()
        .map(|(index, token)| {
            let token = token.trim();
            token
                .parse::<u32>()
                .map_err(|_| LineError::Malformed { index, token: token.to_string() })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Check that a sample sequence covers exactly `slot_count` slots
pub fn check_shape(samples: &[u32], slot_count: usize) -> Result<(), ShapeError> {
    let expected = slot_count * SAMPLES_PER_SLOT;
    if samples.len() != expected {
        return Err(ShapeError { expected, actual: samples.len() });
    }
    Ok(())
}

/// Full line pipeline: decode, parse and shape-check a raw line
///
/// `Ok(None)` means the line carried no data and nothing should change.
pub fn parse_frame(raw: &[u8], slot_count: usize) -> Result<Option<Vec<u32>>, LineError> {
    let line = decode_line(raw)?;
    match parse_samples(line)? {
        Some(samples) => {
            check_shape(&samples, slot_count)?;
            Ok(Some(samples))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_line() {
        let samples = parse_samples("D:10,10,3,3,10,2").unwrap();
        assert_eq!(samples, Some(vec![10, 10, 3, 3, 10, 2]));
    }

    #[test]
    fn test_non_data_line_is_ignored() {
        assert_eq!(parse_samples("Sensor array ready").unwrap(), None);
        assert_eq!(parse_samples("").unwrap(), None);
        assert_eq!(parse_samples("d:1,2").unwrap(), None);
    }

    #[test]
    fn test_framing_noise_is_stripped() {
        let line = decode_line(b"  D:1,2,3,4,5,6\r\n").unwrap();
        assert_eq!(line, "D:1,2,3,4,5,6");
        assert_eq!(parse_samples(line).unwrap(), Some(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn test_token_whitespace_tolerated() {
        assert_eq!(parse_samples("D:1, 2 ,3").unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_malformed_token_rejects_line() {
        let err = parse_samples("D:10,abc,3,3,10,2").unwrap_err();
        assert_eq!(err, LineError::Malformed { index: 1, token: "abc".to_string() });
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_empty_and_negative_tokens_are_malformed() {
        assert!(matches!(parse_samples("D:"), Err(LineError::Malformed { index: 0, .. })));
        assert!(matches!(parse_samples("D:1,,2"), Err(LineError::Malformed { index: 1, .. })));
        assert!(matches!(parse_samples("D:1,-2"), Err(LineError::Malformed { index: 1, .. })));
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let err = decode_line(&[b'D', b':', 0xFF, 0xFE, b'\n']).unwrap_err();
        assert!(matches!(err, LineError::Decode(_)));
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_check_shape() {
        assert!(check_shape(&[1, 2, 3, 4, 5, 6], 3).is_ok());
        assert_eq!(
            check_shape(&[10, 10, 3, 3], 3),
            Err(ShapeError { expected: 6, actual: 4 })
        );
    }

    #[test]
    fn test_parse_frame() {
        assert_eq!(parse_frame(b"D:1,3,9,9,2,2\n", 3).unwrap(), Some(vec![1, 3, 9, 9, 2, 2]));
        assert_eq!(parse_frame(b"boot ok\n", 3).unwrap(), None);

        let err = parse_frame(b"D:10,10,3,3\n", 3).unwrap_err();
        assert_eq!(err, LineError::Shape(ShapeError { expected: 6, actual: 4 }));
        assert_eq!(err.kind(), "shape");
    }
}
