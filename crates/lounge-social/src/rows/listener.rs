//! Subscription task folding row changes into a [`RowCollection`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::{
    ChannelMessage, ChannelStatus, ChannelTransport, RowFilter, SubscribeOptions, Subscription,
    TransportError,
};

use super::collection::{RowCollection, RowEntity, RowEvent};

/// Hooks run after a change has been folded in (e.g. refreshing a
/// counter). Only called when the collection actually changed.
pub trait RowObserver<T>: Send + Sync {
    fn on_insert(&self, _row: &T) {}
    fn on_update(&self, _row: &T) {}
    fn on_delete(&self, _removed: &[T]) {}
}

struct Shared<T> {
    collection: Mutex<RowCollection<T>>,
    items_tx: watch::Sender<Vec<T>>,
    observer: Option<Arc<dyn RowObserver<T>>>,
}

impl<T: RowEntity> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, RowCollection<T>> {
        self.collection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, collection: &RowCollection<T>) {
        self.items_tx.send_replace(collection.items().to_vec());
    }

    fn notify(&self, event: &RowEvent<T>) {
        let Some(observer) = &self.observer else {
            return;
        };
        match event {
            RowEvent::Inserted(row) => observer.on_insert(row),
            RowEvent::Updated(row) => observer.on_update(row),
            RowEvent::Removed(rows) => observer.on_delete(rows),
        }
    }
}

/// Keeps a local collection in sync with one filtered table.
pub struct RowChangeListener<T: RowEntity> {
    transport: Arc<dyn ChannelTransport>,
    topic: String,
    shared: Arc<Shared<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T: RowEntity> RowChangeListener<T> {
    /// Subscribe `topic` to changes matching `filter`, starting from the
    /// already loaded `initial` rows.
    pub async fn attach(
        transport: Arc<dyn ChannelTransport>,
        topic: &str,
        filter: RowFilter,
        initial: Vec<T>,
    ) -> Result<Self, TransportError> {
        Self::attach_inner(transport, topic, filter, initial, None).await
    }

    pub async fn attach_with(
        transport: Arc<dyn ChannelTransport>,
        topic: &str,
        filter: RowFilter,
        initial: Vec<T>,
        observer: Arc<dyn RowObserver<T>>,
    ) -> Result<Self, TransportError> {
        Self::attach_inner(transport, topic, filter, initial, Some(observer)).await
    }

    async fn attach_inner(
        transport: Arc<dyn ChannelTransport>,
        topic: &str,
        filter: RowFilter,
        initial: Vec<T>,
        observer: Option<Arc<dyn RowObserver<T>>>,
    ) -> Result<Self, TransportError> {
        let collection = RowCollection::from_items(initial);
        let (items_tx, _) = watch::channel(collection.items().to_vec());
        let shared = Arc::new(Shared {
            collection: Mutex::new(collection),
            items_tx,
            observer,
        });

        let subscription = transport
            .subscribe(topic, SubscribeOptions::rows(filter.clone()))
            .await?;
        let task = tokio::spawn(fold_changes(subscription, filter, Arc::clone(&shared)));
        info!(topic = %topic, "Row listener attached");

        Ok(Self {
            transport,
            topic: topic.to_string(),
            shared,
            task: Some(task),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Optimistically add a row the local user just created. A later echo
    /// of the same insert is ignored.
    pub fn insert_local(&self, row: T) -> bool {
        let mut collection = self.shared.lock();
        let added = collection.insert(row);
        if added {
            self.shared.publish(&collection);
        }
        added
    }

    pub fn items(&self) -> Vec<T> {
        self.shared.lock().items().to_vec()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<T>> {
        self.shared.items_tx.subscribe()
    }

    /// Stop folding, leave the topic and release the collection.
    pub async fn detach(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        if let Err(e) = self.transport.unsubscribe(&self.topic).await {
            warn!(topic = %self.topic, error = %e, "Row listener unsubscribe failed");
        }
        let mut collection = self.shared.lock();
        collection.clear();
        self.shared.publish(&collection);
        info!(topic = %self.topic, "Row listener detached");
    }
}

impl<T: RowEntity> Drop for RowChangeListener<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!(topic = %self.topic, "Row listener dropped without detach");
            task.abort();
        }
    }
}

async fn fold_changes<T: RowEntity>(
    mut subscription: Subscription,
    filter: RowFilter,
    shared: Arc<Shared<T>>,
) {
    let topic = subscription.topic().to_string();
    while let Some(message) = subscription.recv().await {
        match message {
            ChannelMessage::RowChange(change) => {
                if !filter.matches(&change) {
                    debug!(topic = %topic, table = %change.table, "Row change outside filter");
                    continue;
                }
                let event = {
                    let mut collection = shared.lock();
                    let event = collection.apply(&change);
                    if event.is_some() {
                        shared.publish(&collection);
                    }
                    event
                };
                if let Some(event) = event {
                    shared.notify(&event);
                }
            }
            ChannelMessage::Status(ChannelStatus::Subscribed) => {
                debug!(topic = %topic, "Row channel subscribed");
            }
            ChannelMessage::Status(ChannelStatus::Error(reason)) => {
                warn!(topic = %topic, reason = %reason, "Row channel error");
            }
            ChannelMessage::Status(ChannelStatus::TimedOut) => {
                warn!(topic = %topic, "Row channel subscribe timed out");
            }
            ChannelMessage::Broadcast { .. } => {}
        }
    }
}
