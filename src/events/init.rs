//! One-shot generator fired at startup.

use futures::StreamExt;
use futures::stream;

use super::{EventGenerator, EventInput, EventStream, already_built};
use crate::core::event_data::EventData;

/// Emits a single notification, then closes.
#[derive(Debug, Default)]
pub struct InitGenerator {
    built: bool,
}

impl InitGenerator {
    /// Create the generator.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_input(input: &EventInput) -> Option<Box<dyn EventGenerator>> {
        input
            .config
            .on_init
            .then(|| Box::new(Self::new()) as Box<dyn EventGenerator>)
    }
}

impl EventGenerator for InitGenerator {
    fn build_tick_channel(&mut self) -> EventStream {
        if std::mem::replace(&mut self.built, true) {
            already_built();
        }
        stream::once(async { EventData::new("init") }).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emits_exactly_once() {
        let mut generator = InitGenerator::new();
        let events: Vec<EventData> = generator.build_tick_channel().collect().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].emitter(), "init");
    }

    #[test]
    #[should_panic(expected = "already built the ticker channel")]
    fn test_second_build_panics() {
        let mut generator = InitGenerator::new();
        let _first = generator.build_tick_channel();
        let _second = generator.build_tick_channel();
    }
}
