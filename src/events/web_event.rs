//! Generator fired through the HTTP surface.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{EventGenerator, EventInput, EventStream, already_built};
use crate::core::event_data::EventData;
use crate::global::GlobalState;

/// Registers a listener for a named web event and emits one notification
/// per dispatch.
#[derive(Debug)]
pub struct WebEventGenerator {
    event: String,
    state: Arc<GlobalState>,
    built: bool,
}

impl WebEventGenerator {
    /// Create a generator listening for `event`.
    pub fn new(event: impl Into<String>, state: Arc<GlobalState>) -> Self {
        Self {
            event: event.into(),
            state,
            built: false,
        }
    }

    pub(crate) fn from_input(input: &EventInput) -> Option<Box<dyn EventGenerator>> {
        let event = input.config.web_event.as_deref().filter(|e| !e.is_empty())?;
        Some(Box::new(Self::new(event, Arc::clone(&input.state))))
    }
}

impl EventGenerator for WebEventGenerator {
    fn build_tick_channel(&mut self) -> EventStream {
        if std::mem::replace(&mut self.built, true) {
            already_built();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let event = self.event.clone();
        self.state.add_event_listener(
            self.event.clone(),
            Arc::new(move || {
                let _ = tx.send(EventData::new("web-event").with("event", event.clone()));
            }),
        );
        UnboundedReceiverStream::new(rx).boxed()
    }
}
