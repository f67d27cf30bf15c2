/*
[INPUT]:  One or many subscription descriptors, path builder, handler builder
[OUTPUT]: One resilient channel per descriptor behind one aggregate handle
[POS]:    WebSocket layer - fan-out of a subscribe call into member channels
[UPDATE]: When changing fan-out validation or aggregate teardown
*/

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::http::{Result, StreamError};
use crate::types::IntoSubscriptions;
use crate::ws::channel::{ChannelHandle, ChannelOpener, ChannelState, MessageHandler};

/// Open one channel per descriptor.
///
/// Every path is built before the first channel opens, so an invalid descriptor
/// anywhere in the input fails the whole call without any connection attempt.
pub fn open_many<T, P, F, H>(
    opener: &ChannelOpener,
    params: P,
    path_fn: F,
    handler_fn: H,
) -> Result<GroupHandle>
where
    P: IntoSubscriptions<T>,
    F: Fn(&T) -> Result<String>,
    H: Fn(&T, &str) -> MessageHandler,
{
    let params = params.into_subscriptions();
    if params.is_empty() {
        return Err(StreamError::config("at least one subscription is required"));
    }

    let paths = params.iter().map(&path_fn).collect::<Result<Vec<_>>>()?;
    for path in &paths {
        opener.url_for(path)?;
    }

    let mut members = Vec::with_capacity(params.len());
    for (param, path) in params.iter().zip(&paths) {
        // already-opened members are torn down by drop if this fails
        members.push(opener.open(path, handler_fn(param, path))?);
    }

    Ok(GroupHandle::new(members))
}

/// Aggregate teardown over every member channel of one subscribe call
#[derive(Debug)]
#[must_use = "dropping a GroupHandle tears every member channel down"]
pub struct GroupHandle {
    members: Vec<ChannelHandle>,
    torn_down: AtomicBool,
}

impl GroupHandle {
    pub(crate) fn new(members: Vec<ChannelHandle>) -> Self {
        Self {
            members,
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.members.iter().map(ChannelHandle::path).collect()
    }

    pub fn states(&self) -> Vec<ChannelState> {
        self.members.iter().map(ChannelHandle::state).collect()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Tear every member down in order. Later calls are no-ops.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(channels = self.members.len(), "tearing down channel group");
        for member in &self.members {
            member.teardown();
        }
    }

    /// Resolves once every member channel is closed
    pub async fn closed(&self) {
        for member in &self.members {
            member.closed().await;
        }
    }
}

impl Drop for GroupHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}
