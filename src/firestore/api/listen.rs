//! Snapshot streams.
//!
//! A stream owns the listener registration it was opened with. The
//! registration is released exactly once: when the backend reports an error
//! (after that error has been yielded), when the backend closes the channel,
//! on [`cancel`](DocumentSnapshotStream::cancel), or when the stream is
//! dropped. Nothing is yielded after any of these.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::firestore::error::FirestoreResult;
use crate::firestore::model::DocumentKey;
use crate::firestore::remote::datastore::{ListenEvent, ListenTarget, ListenerRegistration};

use super::query::{Query, QueryDefinition, QuerySnapshot};
use super::snapshot::{compute_changes, DocumentSnapshot};
use super::Firestore;

type EventReceiver = async_channel::Receiver<FirestoreResult<ListenEvent>>;

struct Subscription {
    receiver: Pin<Box<EventReceiver>>,
    registration: Option<ListenerRegistration>,
    terminated: bool,
}

impl Subscription {
    fn open(firestore: &Firestore, target: ListenTarget) -> FirestoreResult<Self> {
        let (sender, receiver) = async_channel::unbounded();
        let registration = firestore.datastore().listen(target, sender)?;
        Ok(Self {
            receiver: Box::pin(receiver),
            registration: Some(registration),
            terminated: false,
        })
    }

    fn finish(&mut self) {
        self.terminated = true;
        self.receiver.close();
        if let Some(registration) = self.registration.take() {
            registration.remove();
        }
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<FirestoreResult<ListenEvent>>> {
        if self.terminated {
            return Poll::Ready(None);
        }
        match self.receiver.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(Some(Err(err))) => {
                log::debug!("Snapshot listener terminated: {err}");
                self.finish();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Live snapshots of one document.
pub struct DocumentSnapshotStream {
    key: DocumentKey,
    subscription: Subscription,
}

impl DocumentSnapshotStream {
    pub(crate) fn open(firestore: &Firestore, key: DocumentKey) -> FirestoreResult<Self> {
        let subscription = Subscription::open(firestore, ListenTarget::Document(key.clone()))?;
        Ok(Self { key, subscription })
    }

    /// Stops listening. Safe to call repeatedly or after the stream ended.
    pub fn cancel(&mut self) {
        self.subscription.finish();
    }

    pub fn is_terminated(&self) -> bool {
        self.subscription.terminated
    }

    /// Maps every snapshot through the codec; missing documents yield `None`.
    pub fn decoded<T>(self) -> impl Stream<Item = FirestoreResult<Option<T>>>
    where
        T: DeserializeOwned,
    {
        self.map(|snapshot| snapshot.and_then(|snapshot| snapshot.data_as::<T>()))
    }
}

impl Stream for DocumentSnapshotStream {
    type Item = FirestoreResult<DocumentSnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            return match self.subscription.poll_event(cx) {
                Poll::Ready(Some(Ok(ListenEvent::Document(snapshot)))) => Poll::Ready(Some(Ok(snapshot))),
                Poll::Ready(Some(Ok(other))) => {
                    log::warn!(
                        "Ignoring query event on document listener {}: {other:?}",
                        self.key.canonical_string()
                    );
                    continue;
                }
                Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            };
        }
    }
}

/// Live results of a query, each emission carrying its changes relative to
/// the previous one.
pub struct QuerySnapshotStream {
    query: Query,
    previous: Option<Vec<DocumentSnapshot>>,
    subscription: Subscription,
}

impl QuerySnapshotStream {
    pub(crate) fn open(query: Query, definition: QueryDefinition) -> FirestoreResult<Self> {
        let subscription = Subscription::open(query.firestore(), ListenTarget::Query(definition))?;
        Ok(Self {
            query,
            previous: None,
            subscription,
        })
    }

    /// Stops listening. Safe to call repeatedly or after the stream ended.
    pub fn cancel(&mut self) {
        self.subscription.finish();
    }

    pub fn is_terminated(&self) -> bool {
        self.subscription.terminated
    }
}

impl Stream for QuerySnapshotStream {
    type Item = FirestoreResult<QuerySnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            return match this.subscription.poll_event(cx) {
                Poll::Ready(Some(Ok(ListenEvent::Query { documents, metadata }))) => {
                    let previous = this.previous.as_deref().unwrap_or_default();
                    let changes = compute_changes(previous, &documents);
                    this.previous = Some(documents.clone());
                    Poll::Ready(Some(Ok(QuerySnapshot::new(
                        this.query.clone(),
                        documents,
                        changes,
                        metadata,
                    ))))
                }
                Poll::Ready(Some(Ok(other))) => {
                    log::warn!("Ignoring document event on query listener: {other:?}");
                    continue;
                }
                Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            };
        }
    }
}
