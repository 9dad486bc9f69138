use crate::error::{BookingError, Result};
use serde::Serialize;
use std::io::Write;

/// Result class of one request row.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Ok,
    /// A business rule said no; nothing changed.
    Rejected,
    /// The request could not be carried out (lock timeout, storage).
    Failed,
}

/// One output row: `line,op,outcome,code,reference`.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct Outcome {
    pub line: u64,
    pub op: &'static str,
    pub outcome: Verdict,
    /// The new status on success, the error code otherwise.
    pub code: String,
    /// Id of the affected booking or membership, or the sweep count.
    pub reference: String,
}

impl Outcome {
    pub fn ok(line: u64, op: &'static str, code: &str, reference: impl ToString) -> Self {
        Self {
            line,
            op,
            outcome: Verdict::Ok,
            code: code.to_string(),
            reference: reference.to_string(),
        }
    }

    pub fn error(line: u64, op: &'static str, error: &BookingError) -> Self {
        Self {
            line,
            op,
            outcome: if error.is_rejection() {
                Verdict::Rejected
            } else {
                Verdict::Failed
            },
            code: error.code().to_string(),
            reference: String::new(),
        }
    }
}

/// Writes outcomes as CSV, header first.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, outcome: &Outcome) -> Result<()> {
        self.writer.serialize(outcome)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_header_and_rows() {
        let mut buffer = Vec::new();
        {
            let mut writer = OutcomeWriter::new(&mut buffer);
            writer.write(&Outcome::ok(2, "book", "confirmed", 1)).unwrap();
            writer
                .write(&Outcome::error(3, "book", &BookingError::ClassFull(1)))
                .unwrap();
            writer
                .write(&Outcome::error(4, "cancel", &BookingError::Busy))
                .unwrap();
            writer.flush().unwrap();
        }
        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(
            output,
            "line,op,outcome,code,reference\n\
             2,book,ok,confirmed,1\n\
             3,book,rejected,class_full,\n\
             4,cancel,failed,busy,\n"
        );
    }
}
