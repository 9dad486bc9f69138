//! Batch driver surface: CSV requests in, CSV outcomes out, plus the JSON
//! fixture that seeds reference data.

pub mod batch;
pub mod csv;
pub mod fixture;
