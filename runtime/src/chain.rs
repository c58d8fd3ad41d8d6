//! Incremental validation of operator chains against a table of supported
//! sequences.
//!
//! Each viable table row keeps one cursor: the position just past the last
//! kind it matched. Appending a kind scans every viable row forward from its
//! cursor; rows that find the kind survive with their cursor moved past the
//! hit, the rest drop out. Since a cursor never moves backwards, a row can
//! neither match the same position twice nor backtrack.
//!
//! ```ignore
//! let mut validator = ChainValidator::fusion();
//! validator.advance(OperatorKind::Convolution)?;
//! validator.advance(OperatorKind::Activation)?;  // Bias may be skipped
//! assert!(validator.advance(OperatorKind::Bias).is_err());
//! ```

use std::sync::Arc;

use smallvec::SmallVec;
use snafu::ensure;
use tracing::debug;

use crate::error::{Result, UnsupportedChainSnafu};
use crate::operator::OperatorKind;

type Cursors = SmallVec<[Option<usize>; 4]>;

#[derive(Debug, Clone)]
pub struct ChainValidator {
    rows: Arc<[Box<[OperatorKind]>]>,
    /// `None` marks a row that no longer matches.
    cursors: Cursors,
    matched: SmallVec<[OperatorKind; 4]>,
}

impl ChainValidator {
    pub fn new<R>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = OperatorKind>,
    {
        let rows: Arc<[Box<[OperatorKind]>]> = rows.into_iter().map(|row| row.into_iter().collect()).collect();
        let cursors = rows.iter().map(|_| Some(0)).collect();
        Self { rows, cursors, matched: SmallVec::new() }
    }

    /// The fused convolution table: convolution, optionally followed by bias,
    /// optionally followed by activation.
    pub fn fusion() -> Self {
        Self::new([[OperatorKind::Convolution, OperatorKind::Bias, OperatorKind::Activation]])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[OperatorKind]> {
        self.rows.iter().map(|row| &**row)
    }

    /// Extend the matched prefix by `kind`.
    ///
    /// On failure the validator is left exactly as it was.
    pub fn advance(&mut self, kind: OperatorKind) -> Result<()> {
        let next: Cursors = self
            .rows
            .iter()
            .zip(&self.cursors)
            .map(|(row, cursor)| {
                let start = (*cursor)?;
                row[start..].iter().position(|candidate| *candidate == kind).map(|offset| start + offset + 1)
            })
            .collect();

        if next.iter().all(Option::is_none) {
            debug!(%kind, matched = ?self.matched, "operator does not extend any supported chain");
        }
        ensure!(
            next.iter().any(Option::is_some),
            UnsupportedChainSnafu { kind, index: self.matched.len(), matched: self.matched.to_vec() }
        );

        self.cursors = next;
        self.matched.push(kind);
        Ok(())
    }

    /// Kinds accepted so far, in append order.
    pub fn matched_prefix(&self) -> &[OperatorKind] {
        &self.matched
    }

    /// Whether some row has been matched through its last kind.
    pub fn is_complete(&self) -> bool {
        self.rows.iter().zip(&self.cursors).any(|(row, cursor)| *cursor == Some(row.len()))
    }

    pub fn reset(&mut self) {
        self.cursors.iter_mut().for_each(|cursor| *cursor = Some(0));
        self.matched.clear();
    }
}

impl Default for ChainValidator {
    fn default() -> Self {
        Self::fusion()
    }
}
