//! The per-record offset handle and the requests it emits back to the
//! owning event loop.

use tokio::sync::{mpsc, oneshot};

use crate::error::OffsetError;
use crate::topic_partition::TopicPartition;

/// A request flowing from an [`OffsetHandle`] back to the event loop that
/// owns the consumer.
///
/// This is the crate's answer to the "cyclic interaction between record and
/// offset" design note: the handle never holds a back-pointer into the
/// manager's state, it only holds a cloneable sender of these requests.
pub enum OffsetRequest {
    /// Mark `offset` as the highest acknowledged for `topic_partition`.
    Acknowledge {
        /// Partition being acknowledged.
        topic_partition: TopicPartition,
        /// Next-offset-to-consume value (not the last consumed offset).
        offset: i64,
    },
    /// Commit exactly `offset` for `topic_partition`, replying with the result.
    Commit {
        /// Partition being committed.
        topic_partition: TopicPartition,
        /// Next-offset-to-consume value (not the last consumed offset).
        offset: i64,
        /// Channel the event loop replies on once the broker confirms.
        reply: oneshot::Sender<Result<(), OffsetError>>,
    },
}

/// The per-delivered-message handle carrying `(topic, partition, offset)`
/// plus the operations tied back to the owning `OffsetManager`.
#[derive(Clone)]
pub struct OffsetHandle {
    topic_partition: TopicPartition,
    offset: i64,
    requests: mpsc::UnboundedSender<OffsetRequest>,
}

impl OffsetHandle {
    /// Construct a handle. Only the receiver crate's event loop should call
    /// this — application code only ever receives handles, never builds them.
    #[must_use]
    pub fn new(
        topic_partition: TopicPartition,
        offset: i64,
        requests: mpsc::UnboundedSender<OffsetRequest>,
    ) -> Self {
        Self {
            topic_partition,
            offset,
            requests,
        }
    }

    /// The partition this offset belongs to.
    #[must_use]
    pub const fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    /// The offset of the message this handle was delivered with.
    #[must_use]
    pub const fn offset(&self) -> i64 {
        self.offset
    }

    /// Mark this offset as acknowledged, eligible for a future batched
    /// commit. Non-blocking; callable from any thread.
    pub fn acknowledge(&self) {
        // A closed receiver means the event loop has already shut down;
        // there's nothing left to acknowledge into, so this is a silent
        // no-op rather than an error the caller would need to handle.
        let _ = self.requests.send(OffsetRequest::Acknowledge {
            topic_partition: self.topic_partition.clone(),
            offset: self.offset + 1,
        });
    }

    /// Commit this exact offset immediately, independent of the batch/
    /// interval triggers. Resolves when the broker confirms.
    ///
    /// # Errors
    ///
    /// Returns [`OffsetError::ManagerGone`] if the owning event loop has
    /// already shut down, or the commit's own [`OffsetError`] otherwise.
    pub async fn commit(&self) -> Result<(), OffsetError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(OffsetRequest::Commit {
                topic_partition: self.topic_partition.clone(),
                offset: self.offset + 1,
                reply,
            })
            .map_err(|_| OffsetError::ManagerGone)?;
        rx.await.map_err(|_| OffsetError::ManagerGone)?
    }
}
