//! Caller-side output sink.
//!
//! The engine never writes files. Callers that persist results implement
//! [`OutputWriter`] and hand a finished [`RunOutcome`] to [`write_outcome`].

use crate::models::{ProcessingResult, RunOutcome};
use std::io;

/// Destination for finished run output.
pub trait OutputWriter: Send + Sync {
    /// Persist one successful model output.
    fn write_result(&self, result: &ProcessingResult) -> io::Result<()>;

    /// Persist the synthesized output.
    fn write_synthesis(&self, content: &str) -> io::Result<()>;
}

/// Write every successful result and the synthesis, if any.
///
/// Stops at the first write error. Returns the number of items written.
pub fn write_outcome(writer: &dyn OutputWriter, outcome: &RunOutcome) -> io::Result<usize> {
    let mut written = 0;
    for result in outcome.successes() {
        writer.write_result(result)?;
        written += 1;
    }
    if let Some(content) = &outcome.synthesized {
        writer.write_synthesis(content)?;
        written += 1;
    }
    Ok(written)
}
