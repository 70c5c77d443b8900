//! Incremental delimited-record parsing over arbitrary byte chunks.

use csv::{ByteRecord, ReaderBuilder};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parses records out of a stream that arrives in fixed-size chunks.
///
/// Complete records are returned as soon as their terminator has been seen.
/// The unterminated tail is held back in [`ChunkParser::pending`] so that a
/// record split across chunks, or across invocations, is reassembled.
#[derive(Debug, Clone)]
pub struct ChunkParser {
    delimiter: u8,
    pending: Vec<u8>,
    at_start: bool,
}

impl ChunkParser {
    /// Parser positioned at the beginning of a file.
    pub fn new(delimiter: u8) -> Self {
        Self {
            delimiter,
            pending: Vec::new(),
            at_start: true,
        }
    }

    /// Parser picking up mid-file with a previously saved tail.
    pub fn resume(delimiter: u8, pending: Vec<u8>) -> Self {
        Self {
            delimiter,
            pending,
            at_start: false,
        }
    }

    /// Bytes received but not yet part of a complete record.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Add a chunk and return every record it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Vec<String>>, csv::Error> {
        let chunk = if self.at_start {
            self.at_start = false;
            chunk.strip_prefix(UTF8_BOM).unwrap_or(chunk)
        } else {
            chunk
        };
        self.pending.extend_from_slice(chunk);

        let complete = complete_prefix_len(&self.pending, self.delimiter);
        if complete == 0 {
            return Ok(Vec::new());
        }
        let rest = self.pending.split_off(complete);
        let ready = std::mem::replace(&mut self.pending, rest);
        parse_records(&ready, self.delimiter)
    }

    /// End of input: parse whatever is left, terminated or not.
    pub fn finish(&mut self) -> Result<Vec<Vec<String>>, csv::Error> {
        let rest = std::mem::take(&mut self.pending);
        if rest.is_empty() {
            return Ok(Vec::new());
        }
        parse_records(&rest, self.delimiter)
    }
}

/// Length of the longest prefix that ends on a record terminator outside quotes.
///
/// A quote only opens a quoted field at the start of a field; elsewhere it is
/// a literal character, as the record parser treats it.
fn complete_prefix_len(buf: &[u8], delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut field_start = true;
    let mut just_closed = false;
    let mut end = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if in_quotes {
            if byte == b'"' {
                in_quotes = false;
                just_closed = true;
            }
            continue;
        }
        if byte == b'"' && (field_start || just_closed) {
            in_quotes = true;
            field_start = false;
            just_closed = false;
            continue;
        }
        just_closed = false;
        let terminator = byte == b'\n' || byte == b'\r';
        field_start = terminator || byte == delimiter;
        if terminator {
            end = i + 1;
        }
    }
    end
}

fn parse_records(bytes: &[u8], delimiter: u8) -> Result<Vec<Vec<String>>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut records = Vec::new();
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        records.push(record.iter().map(decode_field).collect());
    }
    Ok(records)
}

/// UTF-8 when valid, otherwise read as Latin-1.
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}
