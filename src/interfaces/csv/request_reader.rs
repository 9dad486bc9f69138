use crate::domain::ids::{BookingId, ClassId, PaymentId, UserId};
use crate::domain::membership::Package;
use crate::error::{BookingError, Result};
use serde::Deserialize;
use std::io::Read;

/// Operation named in the `op` column.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Book,
    Cancel,
    Complete,
    Purchase,
    Sweep,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Book => "book",
            Op::Cancel => "cancel",
            Op::Complete => "complete",
            Op::Purchase => "purchase",
            Op::Sweep => "sweep",
        }
    }
}

/// One validated request row.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Request {
    Book {
        user: UserId,
        class: ClassId,
        payment: Option<PaymentId>,
    },
    Cancel {
        user: UserId,
        booking: BookingId,
        reason: Option<String>,
    },
    Complete {
        booking: BookingId,
    },
    Purchase {
        user: UserId,
        package: Package,
        payment: PaymentId,
    },
    Sweep,
}

impl Request {
    pub fn op(&self) -> Op {
        match self {
            Request::Book { .. } => Op::Book,
            Request::Cancel { .. } => Op::Cancel,
            Request::Complete { .. } => Op::Complete,
            Request::Purchase { .. } => Op::Purchase,
            Request::Sweep => Op::Sweep,
        }
    }
}

/// Raw row; which columns are required depends on `op`.
#[derive(Debug, Deserialize)]
struct RequestRecord {
    op: Op,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    class: Option<u64>,
    #[serde(default)]
    payment: Option<u64>,
    #[serde(default)]
    booking: Option<u64>,
    #[serde(default)]
    package: Option<Package>,
    #[serde(default)]
    reason: Option<String>,
}

fn required<T>(value: Option<T>, op: Op, column: &str) -> Result<T> {
    value.ok_or_else(|| BookingError::InvalidInput(format!("{} requires `{column}`", op.as_str())))
}

impl TryFrom<RequestRecord> for Request {
    type Error = BookingError;

    fn try_from(r: RequestRecord) -> Result<Self> {
        let op = r.op;
        let user = || -> Result<UserId> { required(r.user.as_deref(), op, "user")?.parse() };

        Ok(match op {
            Op::Book => Request::Book {
                user: user()?,
                class: ClassId(required(r.class, op, "class")?),
                payment: r.payment.map(PaymentId),
            },
            Op::Cancel => Request::Cancel {
                user: user()?,
                booking: BookingId(required(r.booking, op, "booking")?),
                reason: r.reason.clone().filter(|s| !s.is_empty()),
            },
            Op::Complete => Request::Complete {
                booking: BookingId(required(r.booking, op, "booking")?),
            },
            Op::Purchase => Request::Purchase {
                user: user()?,
                package: required(r.package, op, "package")?,
                payment: PaymentId(required(r.payment, op, "payment")?),
            },
            Op::Sweep => Request::Sweep,
        })
    }
}

/// Reads booking requests from a CSV source.
///
/// Wraps `csv::Reader` and yields each request together with the line it
/// started on. Whitespace is trimmed and short rows are accepted, so trailing
/// empty columns may be left out.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
    headers: csv::StringRecord,
}

impl<R: Read> RequestReader<R> {
    /// Creates a new `RequestReader` from any `Read` source, consuming the
    /// header row.
    pub fn new(source: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        let headers = reader.headers()?.clone();
        Ok(Self { reader, headers })
    }

    /// Lazily reads and validates requests, one `(line, request)` per row.
    pub fn requests(self) -> impl Iterator<Item = (u64, Result<Request>)> {
        let headers = self.headers;
        self.reader
            .into_records()
            .enumerate()
            .map(move |(index, record)| {
                let fallback = index as u64 + 2;
                match record {
                    Ok(record) => {
                        let line = record.position().map_or(fallback, |p| p.line());
                        let request = record
                            .deserialize::<RequestRecord>(Some(&headers))
                            .map_err(BookingError::from)
                            .and_then(Request::try_from);
                        (line, request)
                    }
                    Err(e) => {
                        let line = e.position().map_or(fallback, |p| p.line());
                        (line, Err(BookingError::from(e)))
                    }
                }
            })
    }
}
