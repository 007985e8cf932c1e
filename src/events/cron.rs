//! Cron generator backed by the shared engine.

use futures::StreamExt;
use futures::stream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{EventGenerator, EventInput, EventStream, already_built};
use crate::core::event_data::EventData;
use crate::core::schedule::Schedule;
use crate::global::GlobalState;

/// Emits one notification per cron match.
///
/// An expression that does not parse yields a stream that never fires; the
/// job then stays idle instead of aborting startup.
#[derive(Debug)]
pub struct CronGenerator {
    expression: String,
    state: Arc<GlobalState>,
    built: bool,
}

impl CronGenerator {
    /// Create a generator registering `expression` on the shared engine.
    pub fn new(expression: impl Into<String>, state: Arc<GlobalState>) -> Self {
        Self {
            expression: expression.into(),
            state,
            built: false,
        }
    }

    pub(crate) fn from_input(input: &EventInput) -> Option<Box<dyn EventGenerator>> {
        let expression = input.config.cron.as_deref().filter(|c| !c.is_empty())?;
        Some(Box::new(Self::new(expression, Arc::clone(&input.state))))
    }
}

impl EventGenerator for CronGenerator {
    fn build_tick_channel(&mut self) -> EventStream {
        if std::mem::replace(&mut self.built, true) {
            already_built();
        }

        let schedule = match Schedule::parse(&self.expression) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::warn!(cron = %self.expression, error = %e, "cannot initialize cron");
                return stream::pending().boxed();
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let payload = EventData::new("cron").with("cron", self.expression.clone());
        self.state.cron_engine().schedule(schedule, payload, tx);
        UnboundedReceiverStream::new(rx).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fires_through_shared_engine() {
        let state = Arc::new(GlobalState::new());
        let mut generator = CronGenerator::new("@every 50ms", Arc::clone(&state));
        let mut stream = generator.build_tick_channel();

        let event = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("cron should fire")
            .unwrap();
        assert_eq!(event.emitter(), "cron");
        assert_eq!(event.get("cron").unwrap(), "@every 50ms");
        assert_eq!(state.cron_engine().len(), 1);
        state.cron_engine().shutdown();
    }

    #[tokio::test]
    async fn test_bad_expression_never_fires() {
        let state = Arc::new(GlobalState::new());
        let mut generator = CronGenerator::new("not a cron", Arc::clone(&state));
        let mut stream = generator.build_tick_channel();

        let next = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
        assert!(next.is_err());
        assert!(state.cron_engine().is_empty());
    }
}
