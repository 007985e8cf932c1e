//! Log file tail generator.
//!
//! Opens the file, skips what is already there and then polls for appended
//! bytes every check cycle. Complete lines are matched against a regex; a
//! trailing fragment without a line breaker waits for the next poll.

use futures::StreamExt;
use regex::Regex;
use serde_json::{Map, Value};
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{EventGenerator, EventInput, EventStream, already_built};
use crate::core::event_data::EventData;

const DEFAULT_LINE_BREAKER: &str = "\n";
const DEFAULT_MATCHER: &str = ".";
const DEFAULT_CHECK_CYCLE: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Watch {
    path: PathBuf,
    line_breaker: String,
    matcher: Regex,
    check_cycle: Duration,
}

impl Watch {
    fn event_for(&self, line: &str) -> Option<EventData> {
        let captures = self.matcher.captures(line)?;

        let mut groups = Map::new();
        for (i, name) in self.matcher.capture_names().enumerate() {
            let value = captures.get(i).map(|m| m.as_str()).unwrap_or_default();
            match name {
                Some(name) => {
                    groups.insert(name.to_string(), Value::String(value.to_string()));
                }
                None if i == 0 => {
                    groups.insert("0".to_string(), Value::String(value.to_string()));
                }
                None => {}
            }
        }

        Some(
            EventData::new("log-file")
                .with("file", self.path.display().to_string())
                .with("line", line)
                .with("groups", groups),
        )
    }
}

/// Emits a notification for every appended line matching a regex.
#[derive(Debug)]
pub struct LogFileGenerator {
    watch: Arc<Watch>,
    built: bool,
}

impl LogFileGenerator {
    /// Create a tail on `path`. Unset options fall back to a `\n` breaker,
    /// a `.` matcher and a one second cycle.
    pub fn new(
        path: impl Into<PathBuf>,
        line_breaker: Option<&str>,
        matcher: Option<&str>,
        check_cycle: Option<Duration>,
    ) -> Result<Self, regex::Error> {
        let matcher = Regex::new(matcher.filter(|m| !m.is_empty()).unwrap_or(DEFAULT_MATCHER))?;
        Ok(Self {
            watch: Arc::new(Watch {
                path: path.into(),
                line_breaker: line_breaker
                    .filter(|b| !b.is_empty())
                    .unwrap_or(DEFAULT_LINE_BREAKER)
                    .to_string(),
                matcher,
                check_cycle: check_cycle
                    .filter(|c| !c.is_zero())
                    .unwrap_or(DEFAULT_CHECK_CYCLE),
            }),
            built: false,
        })
    }

    pub(crate) fn from_input(input: &EventInput) -> Option<Box<dyn EventGenerator>> {
        let config = &input.config;
        let path = config.log_file.as_deref().filter(|f| !f.is_empty())?;
        match Self::new(
            path,
            config.log_line_breaker.as_deref(),
            config.log_matcher.as_deref(),
            config.log_check_cycle,
        ) {
            Ok(generator) => Some(Box::new(generator)),
            Err(e) => {
                tracing::error!(job = %input.job, file = path, error = %e, "error creating log file listener");
                None
            }
        }
    }
}

impl EventGenerator for LogFileGenerator {
    fn build_tick_channel(&mut self) -> EventStream {
        if std::mem::replace(&mut self.built, true) {
            already_built();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(tail(Arc::clone(&self.watch), tx));
        UnboundedReceiverStream::new(rx).boxed()
    }
}

async fn tail(watch: Arc<Watch>, tx: mpsc::UnboundedSender<EventData>) {
    let file = File::open(&watch.path).await;
    let mut file = match file {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(file = %watch.path.display(), error = %e, "failed to open log file");
            return;
        }
    };
    if let Err(e) = file.seek(SeekFrom::End(0)).await {
        tracing::warn!(file = %watch.path.display(), error = %e, "error skipping initial data");
        return;
    }

    let breaker = watch.line_breaker.as_bytes();
    let mut pending: Vec<u8> = Vec::new();
    loop {
        match file.read_to_end(&mut pending).await {
            Ok(read) => tracing::trace!(file = %watch.path.display(), read, "polled log file"),
            Err(e) => {
                tracing::error!(file = %watch.path.display(), error = %e, "error reading log file");
                return;
            }
        }

        while let Some(at) = find(&pending, breaker) {
            let line: Vec<u8> = pending.drain(..at + breaker.len()).take(at).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = watch.event_for(&line) {
                if tx.send(event).is_err() {
                    return;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(watch.check_cycle) => {}
            _ = tx.closed() => return,
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
