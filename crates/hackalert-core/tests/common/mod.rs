#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hackalert_core::{
    AccessGate, GatePolicy, MessageSink, Notification, SheetInfo, SheetSnapshot, SheetSource,
    SinkError, SourceError,
};
use tokio::sync::Notify;

pub const HEADER: [&str; 7] = [
    "Timestamp",
    "Email Address",
    "Hackathon Name",
    "Registration Link",
    "Type",
    "End Date",
    "Other Information",
];

pub fn sheet(rows: &[[&str; 7]]) -> SheetSnapshot {
    SheetSnapshot::from_rows(std::iter::once(HEADER).chain(rows.iter().copied()))
}

pub fn entry(timestamp: &str, name: &str, end_date: &str) -> [String; 7] {
    [
        timestamp.to_string(),
        "someone@example.com".to_string(),
        name.to_string(),
        format!("https://example.com/{}", name.to_lowercase().replace(' ', "-")),
        "Online".to_string(),
        end_date.to_string(),
        String::new(),
    ]
}

pub fn sheet_of(entries: &[[String; 7]]) -> SheetSnapshot {
    let mut rows: Vec<Vec<String>> = vec![HEADER.iter().map(|s| s.to_string()).collect()];
    rows.extend(entries.iter().map(|fields| fields.to_vec()));
    SheetSnapshot::new(rows)
}

pub fn instant_policy() -> GatePolicy {
    GatePolicy {
        min_spacing: Duration::ZERO,
        max_attempts: 3,
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
    }
}

pub fn instant_gate() -> AccessGate {
    AccessGate::new(instant_policy())
}

pub fn sheet_info() -> SheetInfo {
    SheetInfo {
        spreadsheet_title: "Hackathon Submissions".to_string(),
        sheet_id: 0,
        sheet_title: "Form Responses 1".to_string(),
        row_count: 1000,
        column_count: 26,
    }
}

/// In-memory sheet whose contents and failures are set by the test.
#[derive(Default)]
pub struct MemorySource {
    snapshot: Mutex<SheetSnapshot>,
    auth_failures: Mutex<VecDeque<SourceError>>,
    info_failures: Mutex<VecDeque<SourceError>>,
    load_failures: Mutex<VecDeque<SourceError>>,
    hold: Option<(Arc<Notify>, Arc<Notify>)>,
    pub loads: AtomicUsize,
    pub info_loads: AtomicUsize,
}

impl MemorySource {
    pub fn new(snapshot: SheetSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Every load signals `entered` and then waits for `release`.
    pub fn held(snapshot: SheetSnapshot, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            hold: Some((entered, release)),
            ..Self::default()
        }
    }

    pub fn set_snapshot(&self, snapshot: SheetSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn fail_auth(&self, err: SourceError) {
        self.auth_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_info(&self, err: SourceError) {
        self.info_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_load(&self, err: SourceError) {
        self.load_failures.lock().unwrap().push_back(err);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetSource for MemorySource {
    async fn authenticate(&self) -> Result<(), SourceError> {
        match self.auth_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn load_info(&self) -> Result<SheetInfo, SourceError> {
        self.info_loads.fetch_add(1, Ordering::SeqCst);
        match self.info_failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(sheet_info()),
        }
    }

    async fn load_cells(&self, _sheet: &SheetInfo) -> Result<SheetSnapshot, SourceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.hold {
            entered.notify_one();
            release.notified().await;
        }
        let failure = self.load_failures.lock().unwrap().pop_front();
        match failure {
            Some(err) => Err(err),
            None => Ok(self.snapshot.lock().unwrap().clone()),
        }
    }
}

/// Records what would have been posted; can be told to fail on the n-th send.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
    fail_on: Mutex<Option<usize>>,
    attempts: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(attempt: usize) -> Self {
        Self {
            fail_on: Mutex::new(Some(attempt)),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|notification| match notification {
                Notification::Text(text) => Some(text),
                Notification::Embed(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if *self.fail_on.lock().unwrap() == Some(attempt) {
            return Err(SinkError::Http {
                status: 500,
                body: "upstream unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
