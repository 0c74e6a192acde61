//! Incremental row detection and announcement formatting for the hackathon relay.
//!
//! The pipeline is: [`poll::PollLoop`] -> [`gate::AccessGate`] -> [`scanner::SheetWatcher`]
//! -> [`formatter`] -> [`sink::MessageSink`].

pub mod config;
pub mod formatter;
pub mod gate;
pub mod poll;
pub mod scanner;
pub mod sink;
pub mod snapshot;
pub mod source;
pub mod watermark;

pub use config::{ConfigError, DiscordConfig, RelayConfig, SheetsConfig};
pub use formatter::{format_row, MessageStyle};
pub use gate::{AccessGate, GateError, GatePolicy, Throttled};
pub use poll::{PollLoop, PollState, TickError, TickOutcome};
pub use scanner::{InitError, ScanOutcome, SheetWatcher};
pub use sink::{MessageSink, Notification, SinkError};
pub use snapshot::{RawRow, SheetSnapshot};
pub use source::{SheetInfo, SheetSource, SourceError};
pub use watermark::Watermark;
