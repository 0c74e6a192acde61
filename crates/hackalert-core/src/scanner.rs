//! Finds the rows appended since the previous poll.
//!
//! The scan boundary is re-derived from scratch on every poll: it is the last
//! row whose first column has content. Trailing blank rows are therefore
//! absorbed without any bookkeeping. Rows between the watermark and that
//! boundary are extracted, and blank or undated rows are dropped.
//!
//! Dropped rows are not retried: the watermark moves past them. A submission
//! with an unreadable end date is announced never, and only shows up in the
//! logs (and in [`ScanOutcome::skipped`]).

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::formatter::{parse_end_date, EndDateError};
use crate::gate::{AccessGate, GateError};
use crate::snapshot::{RawRow, SheetSnapshot, FIRST_DATA_ROW};
use crate::source::{SheetInfo, SheetSource, SourceError};
use crate::watermark::Watermark;

const MIN_END_DATE_YEAR: i32 = 1970;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    InvalidEndDate(EndDateError),
    BeforeUnixEpoch(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub row_index: usize,
    pub end_date: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub accepted: Vec<RawRow>,
    pub skipped: Vec<SkippedRow>,
    pub last_row_with_content: Option<usize>,
}

/// Highest data row whose first column is non-blank.
pub fn last_row_with_content(snapshot: &SheetSnapshot) -> Option<usize> {
    (FIRST_DATA_ROW..snapshot.row_count())
        .rev()
        .find(|&row| !snapshot.cell(row, 0).trim().is_empty())
}

/// End-date check used to accept a row.
pub fn check_end_date(raw: &str) -> Result<NaiveDate, SkipReason> {
    let date = parse_end_date(raw).map_err(SkipReason::InvalidEndDate)?;
    if date.year() < MIN_END_DATE_YEAR {
        return Err(SkipReason::BeforeUnixEpoch(date));
    }
    Ok(date)
}

/// Pure scan of `snapshot` for rows after `watermark`. Does not move the watermark.
pub fn scan_snapshot(snapshot: &SheetSnapshot, watermark: Watermark) -> ScanOutcome {
    let mut outcome = ScanOutcome {
        last_row_with_content: last_row_with_content(snapshot),
        ..ScanOutcome::default()
    };

    let Some(last) = outcome.last_row_with_content else {
        return outcome;
    };

    for row_index in watermark.next_candidate()..=last {
        let row = RawRow::extract(snapshot, row_index);
        if !row.has_data() {
            continue;
        }

        match check_end_date(row.end_date()) {
            Ok(_) => outcome.accepted.push(row),
            Err(reason) => outcome.skipped.push(SkippedRow {
                row_index,
                end_date: row.end_date().to_string(),
                reason,
            }),
        }
    }

    outcome
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to authenticate with the spreadsheet: {0}")]
    Authenticate(#[source] GateError<SourceError>),
    #[error("failed to load spreadsheet info: {0}")]
    LoadInfo(#[source] GateError<SourceError>),
}

/// Owns the spreadsheet session and the watermark for the lifetime of the process.
pub struct SheetWatcher {
    source: Arc<dyn SheetSource>,
    gate: AccessGate,
    sheet: SheetInfo,
    watermark: Watermark,
}

impl SheetWatcher {
    /// Authenticates and loads sheet metadata, each through the gate.
    pub async fn initialize(source: Arc<dyn SheetSource>, gate: AccessGate) -> Result<Self, InitError> {
        let backend: &dyn SheetSource = source.as_ref();

        gate.run("authenticate", || backend.authenticate())
            .await
            .map_err(InitError::Authenticate)?;

        let sheet = gate
            .run("load_info", || backend.load_info())
            .await
            .map_err(InitError::LoadInfo)?;

        info!(
            spreadsheet = %sheet.spreadsheet_title,
            sheet = %sheet.sheet_title,
            rows = sheet.row_count,
            "spreadsheet session ready"
        );

        Ok(Self {
            source,
            gate,
            sheet,
            watermark: Watermark::new(),
        })
    }

    pub fn sheet(&self) -> &SheetInfo {
        &self.sheet
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub async fn load_snapshot(&self) -> Result<SheetSnapshot, GateError<SourceError>> {
        let backend: &dyn SheetSource = self.source.as_ref();
        let sheet = &self.sheet;
        self.gate
            .run("load_cells", || backend.load_cells(sheet))
            .await
    }

    /// Loads a fresh snapshot and scans it. The watermark only moves when the load succeeds.
    pub async fn scan_new_rows(&mut self) -> Result<ScanOutcome, GateError<SourceError>> {
        let snapshot = self.load_snapshot().await?;
        let outcome = scan_snapshot(&snapshot, self.watermark);

        for skipped in &outcome.skipped {
            error!(
                row = skipped.row_index,
                end_date = %skipped.end_date,
                reason = ?skipped.reason,
                "invalid end date; row will not be announced"
            );
        }

        if let Some(last) = outcome.last_row_with_content {
            self.watermark.advance_to(last);
        }

        debug!(
            accepted = outcome.accepted.len(),
            skipped = outcome.skipped.len(),
            watermark = ?self.watermark.current(),
            "scan complete"
        );

        Ok(outcome)
    }

    /// Like [`Self::scan_new_rows`], but a failed load is logged and yields no rows.
    pub async fn new_rows(&mut self) -> Vec<RawRow> {
        match self.scan_new_rows().await {
            Ok(outcome) => outcome.accepted,
            Err(err) => {
                error!(error = %err, "error getting new rows");
                Vec::new()
            }
        }
    }
}
