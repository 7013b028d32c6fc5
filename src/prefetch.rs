//! Background acquisition of the next item.
//!
//! While an image is on screen the cycle starts one prefetch task. The task
//! writes only its own result (the `JoinHandle` output); the cycle reads and
//! clears it at the top of the next iteration.

use log::{debug, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::info_client::{acquire_descriptor, InfoSource};
use crate::model::MediaDescriptor;
use crate::resolver::ResolveOptions;

/// Holds at most one outstanding prefetch task.
#[derive(Debug, Default)]
pub struct PrefetchSlot {
    task: Option<JoinHandle<Option<MediaDescriptor>>>,
}

impl PrefetchSlot {
    pub fn is_outstanding(&self) -> bool {
        self.task.is_some()
    }

    /// Starts a prefetch unless one is already outstanding. Returns whether a
    /// new task was spawned.
    pub fn start(
        &mut self,
        source: Arc<dyn InfoSource>,
        info_base: String,
        options: ResolveOptions,
    ) -> bool {
        if self.task.is_some() {
            debug!("Prefetch already outstanding, not starting another");
            return false;
        }
        debug!("Starting background prefetch from {}", info_base);
        self.task = Some(tokio::spawn(async move {
            acquire_descriptor(source.as_ref(), &info_base, options).await
        }));
        true
    }

    /// Consumes the prefetched descriptor if the task has already finished.
    ///
    /// Never waits on the network: an unfinished task stays in the slot and
    /// `None` is returned. A finished task that produced nothing is discarded.
    pub async fn take_ready(&mut self) -> Option<MediaDescriptor> {
        if !self.task.as_ref().is_some_and(|t| t.is_finished()) {
            return None;
        }
        let task = self.task.take()?;
        match task.await {
            Ok(Some(descriptor)) => {
                debug!("Consuming prefetched item {}", descriptor.media_url);
                Some(descriptor)
            }
            Ok(None) => {
                debug!("Prefetch finished without an item, discarding");
                None
            }
            Err(e) => {
                warn!("Prefetch task failed: {}", e);
                None
            }
        }
    }

    /// Drops any outstanding task.
    pub fn discard(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
