//! Trigger sources.
//!
//! Every configured [`JobEvent`] is turned into an [`EventGenerator`] through
//! the first-match [`EVENT_REGISTRY`]. A generator produces a stream of
//! [`EventData`] exactly once; the streams of one job are fanned in with
//! [`merge`] before the dispatch loop consumes them.

mod cron;
pub mod docker;
mod init;
mod interval;
mod log_file;
mod merge;
mod web_event;

pub use self::cron::CronGenerator;
pub use docker::{DockerEventGenerator, DockerFilter};
pub use init::InitGenerator;
pub use interval::IntervalGenerator;
pub use log_file::LogFileGenerator;
pub use merge::merge;
pub use web_event::WebEventGenerator;

use futures::stream::BoxStream;
use std::sync::{Arc, LazyLock};

use crate::config::JobEvent;
use crate::core::event_data::EventData;
use crate::core::registry::Registry;
use crate::core::types::JobId;
use crate::global::GlobalState;

/// Stream of trigger notifications.
pub type EventStream = BoxStream<'static, EventData>;

/// A source of trigger notifications.
///
/// [`EventGenerator::build_tick_channel`] may be called once per instance.
/// Calling it again is a programming error and panics.
pub trait EventGenerator: Send {
    /// Start producing notifications.
    fn build_tick_channel(&mut self) -> EventStream;
}

/// Input handed to every generator factory.
#[derive(Debug, Clone)]
pub struct EventInput {
    /// Trigger specification.
    pub config: JobEvent,
    /// Process-wide state, for listeners and the cron engine.
    pub state: Arc<GlobalState>,
    /// Owning job, for logging.
    pub job: JobId,
}

/// Registry selecting a generator from a trigger specification.
pub type EventRegistry = Registry<EventInput, Box<dyn EventGenerator>>;

/// Built-in generators in match order.
pub static EVENT_REGISTRY: LazyLock<EventRegistry> = LazyLock::new(|| {
    Registry::new()
        .with(InitGenerator::from_input)
        .with(IntervalGenerator::from_input)
        .with(CronGenerator::from_input)
        .with(WebEventGenerator::from_input)
        .with(DockerEventGenerator::from_input)
        .with(LogFileGenerator::from_input)
});

/// Build the generator matching `input`, if any.
pub fn build(input: &EventInput) -> Option<Box<dyn EventGenerator>> {
    let generator = EVENT_REGISTRY.get(input);
    if generator.is_none() {
        tracing::warn!(job = %input.job, event = %input.config, "no event generator matched");
    }
    generator
}

pub(crate) fn already_built() -> ! {
    panic!("already built the ticker channel")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn input(config: JobEvent) -> EventInput {
        EventInput {
            config,
            state: Arc::new(GlobalState::new()),
            job: JobId::new("test"),
        }
    }

    #[tokio::test]
    async fn test_registry_selects_by_field() {
        let mut init = build(&input(JobEvent {
            on_init: true,
            ..JobEvent::default()
        }))
        .unwrap();
        let first = init.build_tick_channel().next().await.unwrap();
        assert_eq!(first.emitter(), "init");

        assert!(
            build(&input(JobEvent {
                interval: Some(Duration::from_secs(1)),
                ..JobEvent::default()
            }))
            .is_some()
        );
        assert!(
            build(&input(JobEvent {
                web_event: Some("deploy".into()),
                ..JobEvent::default()
            }))
            .is_some()
        );
    }

    #[test]
    fn test_empty_event_matches_nothing() {
        assert!(build(&input(JobEvent::default())).is_none());
        assert_eq!(EVENT_REGISTRY.len(), 6);
    }
}
