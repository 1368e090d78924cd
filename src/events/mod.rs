//! Table change events.
//!
//! Every successful write made through a [`NotifyingStore`] is published on the
//! [`EventHub`]. Consumers either pull from a [`Subscription`] (the admin SSE
//! feed) or register a callback with [`EventHub::on_insert`] /
//! [`EventHub::on_update`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::database::{Row, Store, StoreError, Table};
use crate::filter::FilterData;
use crate::types::Operation;

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub operation: Operation,
    pub row: Row,
}

/// Which events a subscriber wants. `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub table: Option<Table>,
    pub operation: Option<Operation>,
}

impl EventFilter {
    pub fn table(table: Table) -> Self {
        Self { table: Some(table), operation: None }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.table.map_or(true, |t| t == event.table) && self.operation.map_or(true, |op| op == event.operation)
    }
}

#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        tracing::trace!(table = %event.table, operation = ?event.operation, "change event");
        // No receivers is not an error
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        Subscription { receiver: self.sender.subscribe(), filter }
    }

    /// Run `handler` for every inserted row of `table` that satisfies `predicate`.
    pub fn on_insert<P, H>(&self, table: Table, predicate: P, handler: H) -> ListenerHandle
    where
        P: Fn(&Row) -> bool + Send + 'static,
        H: Fn(ChangeEvent) + Send + 'static,
    {
        self.listen(EventFilter { table: Some(table), operation: Some(Operation::Insert) }, predicate, handler)
    }

    /// Run `handler` for every updated row of `table` that satisfies `predicate`.
    pub fn on_update<P, H>(&self, table: Table, predicate: P, handler: H) -> ListenerHandle
    where
        P: Fn(&Row) -> bool + Send + 'static,
        H: Fn(ChangeEvent) + Send + 'static,
    {
        self.listen(EventFilter { table: Some(table), operation: Some(Operation::Update) }, predicate, handler)
    }

    fn listen<P, H>(&self, filter: EventFilter, predicate: P, handler: H) -> ListenerHandle
    where
        P: Fn(&Row) -> bool + Send + 'static,
        H: Fn(ChangeEvent) + Send + 'static,
    {
        let mut subscription = self.subscribe(filter);
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if predicate(&event.row) {
                    handler(event);
                }
            }
        });
        ListenerHandle { task }
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    filter: EventFilter,
}

impl Subscription {
    /// Next matching event, or `None` once the hub is gone. Events dropped
    /// because this subscriber fell behind are skipped.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Stops the listener task when dropped.
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// `Store` decorator that publishes a [`ChangeEvent`] after each successful write.
pub struct NotifyingStore<S> {
    inner: S,
    hub: EventHub,
}

impl<S: Store> NotifyingStore<S> {
    pub fn new(inner: S, hub: EventHub) -> Self {
        Self { inner, hub }
    }

    fn publish_rows(&self, table: Table, operation: Operation, rows: &[Row]) {
        for row in rows {
            self.hub.publish(ChangeEvent { table, operation, row: row.clone() });
        }
    }
}

#[async_trait]
impl<S: Store> Store for NotifyingStore<S> {
    async fn select(&self, table: Table, filter: FilterData) -> Result<Vec<Row>, StoreError> {
        self.inner.select(table, filter).await
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        let written = self.inner.insert(table, rows).await?;
        self.publish_rows(table, Operation::Insert, &written);
        Ok(written)
    }

    async fn update(&self, table: Table, where_clause: Value, patch: Row) -> Result<Vec<Row>, StoreError> {
        let written = self.inner.update(table, where_clause, patch).await?;
        self.publish_rows(table, Operation::Update, &written);
        Ok(written)
    }

    async fn delete(&self, table: Table, where_clause: Value) -> Result<u64, StoreError> {
        let removed = self.inner.delete(table, where_clause.clone()).await?;
        if removed > 0 {
            let mut row = Row::new();
            row.insert("where".to_string(), where_clause);
            row.insert("count".to_string(), Value::from(removed));
            self.hub.publish(ChangeEvent { table, operation: Operation::Delete, row });
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}
