//! Pull-based iteration for `{{each}}`.
//!
//! Every collection is consumed through [`ItemStream`]: the renderer pulls an
//! item, renders the body, and only then pulls the next one. Not pulling is
//! the pause; the next pull is the resume.

use super::value::Value;
use crate::error::BoxError;
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tokio::sync::{mpsc, oneshot};

/// One item produced by a stream
#[derive(Debug, Clone)]
pub struct Item {
    /// Explicit key; the renderer falls back to the index
    pub key: Option<Value>,
    pub value: Value,
}

impl Item {
    pub fn new(value: Value) -> Self {
        Self { key: None, value }
    }

    pub fn keyed(key: Value, value: Value) -> Self {
        Self { key: Some(key), value }
    }
}

pub trait ItemStream {
    /// Next item, or `None` once the stream has ended
    fn next_item(&mut self) -> LocalBoxFuture<'_, Result<Option<Item>, BoxError>>;
}

/// Iterates a plain array, one item per scheduler step
pub struct ArrayStream {
    items: Rc<Vec<Value>>,
    index: usize,
}

impl ArrayStream {
    pub fn new(items: Rc<Vec<Value>>) -> Self {
        Self { items, index: 0 }
    }
}

impl ItemStream for ArrayStream {
    fn next_item(&mut self) -> LocalBoxFuture<'_, Result<Option<Item>, BoxError>> {
        async move {
            tokio::task::yield_now().await;
            let item = self.items.get(self.index).cloned().map(Item::new);
            self.index += 1;
            Ok(item)
        }
        .boxed_local()
    }
}

/// Breach of the push-channel contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolViolation {
    message: String,
}

impl ProtocolViolation {
    fn new(message: &str) -> Self {
        Self { message: message.to_string() }
    }
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iterator protocol violation: {}", self.message)
    }
}

impl std::error::Error for ProtocolViolation {}

/// Why an [`Emitter`] call failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    /// The consumer is gone, usually because the render failed
    Closed,
    Protocol(ProtocolViolation),
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::Closed => write!(f, "stream consumer has gone away"),
            EmitError::Protocol(violation) => violation.fmt(f),
        }
    }
}

impl std::error::Error for EmitError {}

enum Event {
    Data(Item, oneshot::Sender<()>),
    End,
}

#[derive(Default)]
struct Shared {
    ended: Cell<bool>,
    violation: RefCell<Option<ProtocolViolation>>,
}

impl Shared {
    fn violate(&self, message: &str) -> EmitError {
        let violation = ProtocolViolation::new(message);
        self.violation.borrow_mut().get_or_insert_with(|| violation.clone());
        EmitError::Protocol(violation)
    }
}

/// Producer half of a push channel
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<Event>,
    shared: Rc<Shared>,
}

impl Emitter {
    /// Emit an item; resolves once the consumer has finished rendering it
    pub async fn data(&self, value: Value) -> Result<(), EmitError> {
        self.send(Item::new(value)).await
    }

    pub async fn keyed(&self, key: Value, value: Value) -> Result<(), EmitError> {
        self.send(Item::keyed(key, value)).await
    }

    async fn send(&self, item: Item) -> Result<(), EmitError> {
        if self.shared.ended.get() {
            return Err(self.shared.violate("data after end"));
        }
        let (ack, acked) = oneshot::channel();
        self.tx.send(Event::Data(item, ack)).map_err(|_| EmitError::Closed)?;
        acked.await.map_err(|_| EmitError::Closed)
    }

    /// Signal the end of the stream. Must be called exactly once.
    pub fn end(&self) -> Result<(), EmitError> {
        if self.shared.ended.replace(true) {
            return Err(self.shared.violate("end signalled more than once"));
        }
        self.tx.send(Event::End).map_err(|_| EmitError::Closed)
    }
}

/// Consumer half of a push channel
pub struct ChannelStream {
    rx: mpsc::UnboundedReceiver<Event>,
    shared: Rc<Shared>,
    pending_ack: Option<oneshot::Sender<()>>,
    finished: bool,
}

/// Create a push channel with backpressure: each `data` call waits for the
/// consumer to come back for the next item.
pub fn channel() -> (Emitter, ChannelStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Rc::new(Shared::default());
    let emitter = Emitter { tx, shared: shared.clone() };
    let stream = ChannelStream { rx, shared, pending_ack: None, finished: false };
    (emitter, stream)
}

impl ChannelStream {
    fn check(&self) -> Result<(), BoxError> {
        match self.shared.violation.borrow_mut().take() {
            Some(violation) => Err(Box::new(violation)),
            None => Ok(()),
        }
    }
}

impl ItemStream for ChannelStream {
    fn next_item(&mut self) -> LocalBoxFuture<'_, Result<Option<Item>, BoxError>> {
        async move {
            // Resume the producer of the previous item
            if let Some(ack) = self.pending_ack.take() {
                let _ = ack.send(());
            }
            self.check()?;
            if self.finished {
                return Ok(None);
            }
            match self.rx.recv().await {
                Some(Event::Data(item, ack)) => {
                    self.check()?;
                    self.pending_ack = Some(ack);
                    Ok(Some(item))
                }
                Some(Event::End) => {
                    self.finished = true;
                    self.check()?;
                    Ok(None)
                }
                None => Err(Box::new(ProtocolViolation::new("stream dropped without signalling end")) as BoxError),
            }
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(stream: &mut dyn ItemStream) -> Result<Vec<Value>, BoxError> {
        let mut values = Vec::new();
        while let Some(item) = stream.next_item().await? {
            values.push(item.value);
        }
        Ok(values)
    }

    #[tokio::test]
    async fn test_array_stream() {
        let mut stream = ArrayStream::new(Rc::new(vec![1.0.into(), 2.0.into()]));
        assert_eq!(drain(&mut stream).await.unwrap(), vec![Value::Number(1.0), Value::Number(2.0)]);
        assert!(stream.next_item().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_channel_waits_for_next_pull() {
        let (emitter, mut stream) = channel();
        let log = RefCell::new(Vec::new());
        let producer = async {
            for n in 0..3 {
                emitter.data(Value::Number(n as f64)).await.unwrap();
                log.borrow_mut().push(format!("acked {}", n));
            }
            emitter.end().unwrap();
        };
        let consumer = async {
            while let Some(item) = stream.next_item().await.unwrap() {
                log.borrow_mut().push(format!("got {}", item.value.to_display_string()));
            }
        };
        tokio::join!(producer, consumer);
        assert_eq!(
            log.into_inner(),
            vec!["got 0", "acked 0", "got 1", "acked 1", "got 2", "acked 2"]
        );
    }

    #[tokio::test]
    async fn test_double_end_is_a_violation() {
        let (emitter, mut stream) = channel();
        emitter.end().unwrap();
        assert!(matches!(emitter.end(), Err(EmitError::Protocol(_))));
        let err = stream.next_item().await.unwrap_err();
        assert!(err.downcast_ref::<ProtocolViolation>().is_some());
    }

    #[tokio::test]
    async fn test_data_after_end_is_a_violation() {
        let (emitter, _stream) = channel();
        emitter.end().unwrap();
        let err = emitter.data(Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "iterator protocol violation: data after end");
    }

    #[tokio::test]
    async fn test_dropped_emitter_is_a_violation() {
        let (emitter, mut stream) = channel();
        drop(emitter);
        let err = stream.next_item().await.unwrap_err();
        assert!(err.to_string().contains("without signalling end"));
    }

    #[tokio::test]
    async fn test_closed_consumer() {
        let (emitter, stream) = channel();
        drop(stream);
        assert_eq!(emitter.data(Value::Null).await, Err(EmitError::Closed));
    }
}
