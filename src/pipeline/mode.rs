use crate::utils::{CsvIoError, Result};
use tokio::sync::{mpsc, oneshot};

/// Per-row callback. The pipeline waits until the continuation is resumed
/// before it produces the next row.
pub type RowCallback<R> = Box<dyn FnMut(R, Continuation) + Send>;

/// Handed to a row callback together with the row.
#[derive(Debug)]
pub struct Continuation {
    tx: oneshot::Sender<std::result::Result<(), String>>,
}

impl Continuation {
    pub(crate) fn new() -> (Self, oneshot::Receiver<std::result::Result<(), String>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Lets the pipeline move on to the next row.
    pub fn resume(self) {
        let _ = self.tx.send(Ok(()));
    }

    /// Stops the pipeline; `end()` reports the reason.
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(reason.into()));
    }
}

/// Receiving end of a piped subscription.
#[derive(Debug)]
pub struct RowSubscriber<R> {
    id: usize,
    rx: mpsc::Receiver<R>,
}

impl<R> RowSubscriber<R> {
    pub(crate) fn new(id: usize, rx: mpsc::Receiver<R>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Next row, or `None` once the pipeline has finished or dropped this
    /// subscriber.
    pub async fn recv(&mut self) -> Option<R> {
        self.rx.recv().await
    }

    pub async fn collect(mut self) -> Vec<R> {
        let mut rows = Vec::new();
        while let Some(row) = self.rx.recv().await {
            rows.push(row);
        }
        rows
    }
}

/// Reference-counted set of attached downstream consumers.
pub struct SubscriptionRegistry<R> {
    subscribers: Vec<(usize, mpsc::Sender<R>)>,
}

impl<R> Default for SubscriptionRegistry<R> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<R: Clone> SubscriptionRegistry<R> {
    /// Returns the subscriber count after attaching.
    pub fn subscribe(&mut self, id: usize, tx: mpsc::Sender<R>) -> usize {
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.push((id, tx));
        self.subscribers.len()
    }

    /// Returns the subscriber count after detaching.
    pub fn unsubscribe(&mut self, id: usize) -> usize {
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len()
    }

    pub fn count(&self) -> usize {
        self.subscribers.len()
    }

    /// Detaches subscribers whose receiver has been dropped.
    pub fn prune_closed(&mut self) -> usize {
        let before = self.subscribers.len();
        self.subscribers.retain(|(id, tx)| {
            let open = !tx.is_closed();
            if !open {
                tracing::debug!(subscriber = *id, "Subscriber dropped without unsubscribing");
            }
            open
        });
        before - self.subscribers.len()
    }

    /// Sends `row` to every subscriber in attach order, waiting on full
    /// channels. Subscribers whose receiver is gone are detached.
    pub async fn broadcast(&mut self, row: R) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();

        for (id, tx) in &self.subscribers {
            if tx.send(row.clone()).await.is_ok() {
                delivered += 1;
            } else {
                gone.push(*id);
            }
        }

        for id in gone {
            let remaining = self.unsubscribe(id);
            tracing::debug!(subscriber = id, remaining, "Subscriber detached");
        }
        delivered
    }

    /// Like [`broadcast`](Self::broadcast), but hands the row back when no
    /// subscriber took it.
    pub async fn broadcast_or_return(&mut self, row: R) -> std::result::Result<usize, R> {
        match self.broadcast(row.clone()).await {
            0 => Err(row),
            delivered => Ok(delivered),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Collect,
    Callback,
    Piped,
    CallbackAndPiped,
}

/// Outcome of a finished pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<R> {
    /// Rows retained in collect mode.
    pub collected: Vec<R>,
    pub rows_delivered: usize,
    /// Export fields emitted unformatted after a formatter fault.
    pub formatting_faults: usize,
}

impl<R> Default for Completion<R> {
    fn default() -> Self {
        Self {
            collected: Vec::new(),
            rows_delivered: 0,
            formatting_faults: 0,
        }
    }
}

impl Completion<String> {
    /// Collected export output as one text.
    pub fn text(&self) -> String {
        self.collected.concat()
    }
}

/// Decides where each produced row goes.
pub struct ModeController<R> {
    callback: Option<RowCallback<R>>,
    registry: SubscriptionRegistry<R>,
    collected: Vec<R>,
    delivered: usize,
}

impl<R> Default for ModeController<R> {
    fn default() -> Self {
        Self {
            callback: None,
            registry: SubscriptionRegistry::default(),
            collected: Vec::new(),
            delivered: 0,
        }
    }
}

impl<R: Clone + Send> ModeController<R> {
    pub fn attach_callback(&mut self, callback: RowCallback<R>) {
        if self.callback.replace(callback).is_some() {
            tracing::debug!("Row callback replaced");
        }
    }

    pub fn subscribe(&mut self, id: usize, tx: mpsc::Sender<R>) -> usize {
        let count = self.registry.subscribe(id, tx);
        tracing::debug!(subscriber = id, subscribers = count, "Subscriber attached");
        count
    }

    pub fn unsubscribe(&mut self, id: usize) -> usize {
        let count = self.registry.unsubscribe(id);
        tracing::debug!(subscriber = id, subscribers = count, "Subscriber detached");
        count
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.count()
    }

    pub fn mode(&self) -> DeliveryMode {
        match (self.callback.is_some(), self.registry.count() > 0) {
            (false, false) => DeliveryMode::Collect,
            (true, false) => DeliveryMode::Callback,
            (false, true) => DeliveryMode::Piped,
            (true, true) => DeliveryMode::CallbackAndPiped,
        }
    }

    pub async fn deliver(&mut self, row: R) -> Result<()> {
        self.delivered += 1;
        self.registry.prune_closed();
        let piped = self.registry.count() > 0;

        if let Some(callback) = self.callback.as_mut() {
            let (continuation, resumed) = Continuation::new();
            callback(row.clone(), continuation);

            match resumed.await {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => return Err(CsvIoError::CallbackFailed(reason)),
                Err(_) => {
                    return Err(CsvIoError::CallbackAbandoned {
                        row: self.delivered,
                    })
                }
            }
            if piped {
                self.registry.broadcast(row).await;
            }
            return Ok(());
        }

        if !piped {
            self.collected.push(row);
            return Ok(());
        }
        // Every subscriber may have gone away while the send was pending.
        if let Err(row) = self.registry.broadcast_or_return(row).await {
            self.collected.push(row);
        }
        Ok(())
    }

    pub fn finish(self, formatting_faults: usize) -> Completion<R> {
        Completion {
            collected: self.collected,
            rows_delivered: self.delivered,
            formatting_faults,
        }
    }
}
