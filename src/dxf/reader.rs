//! ASCII DXF group-code tokenizer.
//!
//! A DXF file is a flat stream of (group code, value) pairs: the code on
//! one line, the value on the next. This reader owns the file contents and
//! hands out pairs one at a time, with a single-pair `put_back` so entity
//! parsers can stop cleanly at the next `0` code.

use thiserror::Error;

/// One (group code, value) pair.
pub type GroupPair = (i32, String);

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("invalid group code {code:?} at line {line}")]
    InvalidGroupCode { code: String, line: usize },
    #[error("group code {code} at line {line} has no value line")]
    MissingValue { code: i32, line: usize },
}

/// Pull-based reader over a DXF source.
#[derive(Debug)]
pub struct DxfReader {
    source: String,
    pos: usize,
    line: usize,
    pending: Option<GroupPair>,
}

impl DxfReader {
    pub fn new(source: String) -> Self {
        Self {
            source,
            pos: 0,
            line: 0,
            pending: None,
        }
    }

    /// Next (code, value) pair, or `None` at end of input.
    pub fn next_pair(&mut self) -> Result<Option<GroupPair>, ReadError> {
        if let Some(pair) = self.pending.take() {
            return Ok(Some(pair));
        }

        let code_line = match self.next_line() {
            Some(line) => line,
            None => return Ok(None),
        };
        let code_lineno = self.line;
        let code: i32 = code_line.trim().parse().map_err(|_| ReadError::InvalidGroupCode {
            code: code_line.trim().to_string(),
            line: code_lineno,
        })?;

        let value = match self.next_line() {
            Some(line) => line,
            None => return Err(ReadError::MissingValue {
                code,
                line: code_lineno,
            }),
        };

        Ok(Some((code, value)))
    }

    /// Return a pair to the reader; the next `next_pair` call yields it.
    /// Only one pair of lookback is ever needed.
    pub fn put_back(&mut self, pair: GroupPair) {
        debug_assert!(self.pending.is_none(), "double put_back");
        self.pending = Some(pair);
    }

    /// Next raw line, with the trailing CR of CRLF files removed.
    /// Returns `None` at end of input. A trailing newline does not
    /// produce a final empty line.
    fn next_line(&mut self) -> Option<String> {
        if self.pos >= self.source.len() {
            return None;
        }
        let rest = &self.source[self.pos..];
        let (raw, advance) = match rest.find('\n') {
            Some(idx) => (&rest[..idx], idx + 1),
            None => (rest, rest.len()),
        };
        self.pos += advance;
        self.line += 1;
        Some(raw.strip_suffix('\r').unwrap_or(raw).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(text: &str) -> DxfReader {
        DxfReader::new(text.to_string())
    }

    #[test]
    fn reads_pairs_in_order() {
        let mut r = reader("0\nSECTION\n2\nENTITIES\n");
        assert_eq!(r.next_pair().unwrap(), Some((0, "SECTION".into())));
        assert_eq!(r.next_pair().unwrap(), Some((2, "ENTITIES".into())));
        assert_eq!(r.next_pair().unwrap(), None);
    }

    #[test]
    fn handles_crlf_input() {
        let mut r = reader("0\r\nLINE\r\n10\r\n1.5\r\n");
        assert_eq!(r.next_pair().unwrap(), Some((0, "LINE".into())));
        assert_eq!(r.next_pair().unwrap(), Some((10, "1.5".into())));
    }

    #[test]
    fn code_lines_tolerate_leading_whitespace() {
        // AutoCAD writes right-aligned group codes ("  0").
        let mut r = reader("  0\nLINE\n 10\n0.0\n");
        assert_eq!(r.next_pair().unwrap(), Some((0, "LINE".into())));
        assert_eq!(r.next_pair().unwrap(), Some((10, "0.0".into())));
    }

    #[test]
    fn put_back_replays_pair() {
        let mut r = reader("0\nLINE\n0\nCIRCLE\n");
        let first = r.next_pair().unwrap().unwrap();
        r.put_back(first);
        assert_eq!(r.next_pair().unwrap(), Some((0, "LINE".into())));
        assert_eq!(r.next_pair().unwrap(), Some((0, "CIRCLE".into())));
    }

    #[test]
    fn non_numeric_code_is_an_error() {
        let mut r = reader("zero\nLINE\n");
        assert!(matches!(
            r.next_pair(),
            Err(ReadError::InvalidGroupCode { .. })
        ));
    }

    #[test]
    fn dangling_code_is_an_error() {
        let mut r = reader("0\nLINE\n10");
        assert_eq!(r.next_pair().unwrap(), Some((0, "LINE".into())));
        // "10" has a value line missing entirely
        assert!(matches!(r.next_pair(), Err(ReadError::MissingValue { .. })));
    }

    #[test]
    fn empty_input_yields_none() {
        let mut r = reader("");
        assert_eq!(r.next_pair().unwrap(), None);
    }
}
