//! Fan-in of a job's trigger streams.

use futures::StreamExt;
use futures::stream::select_all;

use super::EventStream;

/// Merge `streams` into one.
///
/// Notifications are forwarded as they arrive; order is kept per source only.
/// The merged stream ends once every source has ended.
pub fn merge(streams: Vec<EventStream>) -> EventStream {
    select_all(streams).boxed()
}
