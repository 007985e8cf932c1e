//! Fixed-period generator.

use chrono::Local;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

use super::{EventGenerator, EventInput, EventStream, already_built};
use crate::core::event_data::EventData;

/// Emits one notification per period, starting one period after the stream
/// is built.
#[derive(Debug)]
pub struct IntervalGenerator {
    period: Duration,
    built: bool,
}

impl IntervalGenerator {
    /// Create a generator firing every `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            built: false,
        }
    }

    pub(crate) fn from_input(input: &EventInput) -> Option<Box<dyn EventGenerator>> {
        input
            .config
            .interval
            .filter(|d| !d.is_zero())
            .map(|d| Box::new(Self::new(d)) as Box<dyn EventGenerator>)
    }
}

impl EventGenerator for IntervalGenerator {
    fn build_tick_channel(&mut self) -> EventStream {
        if std::mem::replace(&mut self.built, true) {
            already_built();
        }

        let period = self.period;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::debug!(interval = ?period, "interval ticker started");

        IntervalStream::new(ticker)
            .map(move |_| {
                EventData::new("interval")
                    .with("interval", format!("{:?}", period))
                    .with("time", Local::now().to_rfc3339())
            })
            .boxed()
    }
}
