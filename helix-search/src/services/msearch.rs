use crate::error::ParseError;

/// One header/body pair of a multi-search payload, borrowed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPair<'a> {
    pub header: &'a [u8],
    pub body: &'a [u8],
    /// One-based line number of the header.
    pub line: usize,
}

/// Splits a newline-delimited multi-search payload into pairs.
///
/// Lines may end in `\n` or `\r\n`, and blank lines are skipped. The iterator
/// is forward-only: each pair is handed out once, and after an error it
/// yields nothing more.
pub struct PairDecoder<'a> {
    rest: &'a [u8],
    line: usize,
    failed: bool,
}

impl<'a> PairDecoder<'a> {
    pub const fn new(payload: &'a [u8]) -> Self {
        Self {
            rest: payload,
            line: 0,
            failed: false,
        }
    }

    /// Decodes the whole payload, rejecting an empty one.
    pub fn decode_all(payload: &'a [u8]) -> Result<Vec<RawPair<'a>>, ParseError> {
        let pairs = Self::new(payload).collect::<Result<Vec<_>, _>>()?;
        if pairs.is_empty() {
            return Err(ParseError::InvalidBatch(
                "request body must contain at least one header and query line".to_string(),
            ));
        }
        Ok(pairs)
    }

    fn next_line(&mut self) -> Option<(usize, &'a [u8])> {
        while !self.rest.is_empty() {
            let (line, rest) = match self.rest.iter().position(|b| *b == b'\n') {
                Some(end) => (&self.rest[..end], &self.rest[end + 1..]),
                None => (self.rest, &[][..]),
            };
            self.rest = rest;
            self.line += 1;
            let line = line.trim_ascii();
            if !line.is_empty() {
                return Some((self.line, line));
            }
        }
        None
    }
}

impl<'a> Iterator for PairDecoder<'a> {
    type Item = Result<RawPair<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (line, header) = self.next_line()?;
        match self.next_line() {
            Some((_, body)) => Some(Ok(RawPair { header, body, line })),
            None => {
                self.failed = true;
                Some(Err(ParseError::InvalidBatch(format!(
                    "header on line {line} has no query line after it"
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pairs_with_crlf_and_blank_lines() {
        let payload = b"{\"index\":\"a\"}\r\n{\"query\":{}}\r\n\n{}\n   \n{\"size\":1}";
        let pairs = PairDecoder::decode_all(payload).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].header, b"{\"index\":\"a\"}");
        assert_eq!(pairs[0].body, b"{\"query\":{}}");
        assert_eq!(pairs[0].line, 1);
        assert_eq!(pairs[1].header, b"{}");
        assert_eq!(pairs[1].body, b"{\"size\":1}");
        assert_eq!(pairs[1].line, 4);
    }

    #[test]
    fn test_odd_line_count_is_invalid() {
        let mut decoder = PairDecoder::new(b"{}\n{}\n{\"index\":\"b\"}\n");
        assert!(decoder.next().unwrap().is_ok());
        match decoder.next() {
            Some(Err(ParseError::InvalidBatch(msg))) => assert!(msg.contains("line 3")),
            other => panic!("expected invalid batch, got {other:?}"),
        }
        assert!(decoder.next().is_none());
        assert!(PairDecoder::decode_all(b"{}\n{}\n{}").is_err());
    }

    #[test]
    fn test_empty_payload_is_invalid() {
        assert!(matches!(
            PairDecoder::decode_all(b""),
            Err(ParseError::InvalidBatch(_))
        ));
        assert!(PairDecoder::decode_all(b"\n\r\n  \n").is_err());
    }

    #[test]
    fn test_trailing_newline_is_optional() {
        assert_eq!(PairDecoder::decode_all(b"{}\n{}\n").unwrap().len(), 1);
        assert_eq!(PairDecoder::decode_all(b"{}\n{}").unwrap().len(), 1);
    }
}
