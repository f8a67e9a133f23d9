//! Ordered delivery of inbound text messages.
//!
//! A [`MessageChannel`] hands every inbound message to exactly one receive
//! request, in the order the requests were issued. Requests are registered
//! when [`MessageChannel::receive`] is called, not when the returned future is
//! first polled, so two receives issued back to back resolve to the first and
//! second message no matter which future the caller polls first.
//!
//! The socket itself is serviced by a [`ChannelDriver`], which runs as its own
//! task and feeds arrivals and failures into the shared queue.

use crate::error::TransportError;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

/// Outcome of a receive that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(String),

    /// The channel was closed locally while the request was queued.
    Canceled,
}

type Delivery = Result<Inbound, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChannelState {
    Open,

    /// Closed locally; every receive resolves as canceled.
    Closed,

    /// The peer closed the connection. Buffered messages are still handed
    /// out, after which receives fail with `ClosedByPeer`.
    PeerClosed,

    Failed(TransportError),
}

/// A receive request and, once assigned, its delivery.
#[derive(Debug)]
struct Slot {
    ticket: u64,
    delivery: Option<Delivery>,
    waker: Option<Waker>,
}

impl Slot {
    fn fill(&mut self, delivery: Delivery) {
        self.delivery = Some(delivery);
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// Outstanding receive requests paired with arrived-but-unclaimed messages.
///
/// Arrivals are assigned to the oldest unfilled request, or buffered when
/// every request already holds one. A message only leaves the queue when the
/// future holding it completes; dropping that future hands the message on to
/// the next request in line.
#[derive(Debug)]
struct QueuedReceiver {
    waiting: VecDeque<Slot>,
    arrived: VecDeque<String>,
    state: ChannelState,
    next_ticket: u64,
}

impl QueuedReceiver {
    fn new() -> Self {
        Self {
            waiting: VecDeque::new(),
            arrived: VecDeque::new(),
            state: ChannelState::Open,
            next_ticket: 0,
        }
    }

    /// Registers a request, or answers it at once.
    fn request(&mut self) -> Result<u64, Delivery> {
        if let Some(message) = self.arrived.pop_front() {
            return Err(Ok(Inbound::Message(message)));
        }

        match &self.state {
            ChannelState::Open => {
                let ticket = self.next_ticket;
                self.next_ticket += 1;
                self.waiting.push_back(Slot {
                    ticket,
                    delivery: None,
                    waker: None,
                });
                Ok(ticket)
            }
            ChannelState::Closed => Err(Ok(Inbound::Canceled)),
            ChannelState::PeerClosed => Err(Err(TransportError::ClosedByPeer)),
            ChannelState::Failed(error) => Err(Err(error.clone())),
        }
    }

    fn poll(&mut self, ticket: u64, waker: &Waker) -> Poll<Delivery> {
        let Some(index) = self.waiting.iter().position(|slot| slot.ticket == ticket) else {
            return Poll::Ready(Ok(Inbound::Canceled));
        };

        if self.waiting[index].delivery.is_none() {
            self.waiting[index].waker = Some(waker.clone());
            return Poll::Pending;
        }

        match self.waiting.remove(index).and_then(|slot| slot.delivery) {
            Some(delivery) => Poll::Ready(delivery),
            None => Poll::Ready(Ok(Inbound::Canceled)),
        }
    }

    /// Withdraws a request whose future was dropped before completing.
    fn withdraw(&mut self, ticket: u64) {
        let Some(index) = self.waiting.iter().position(|slot| slot.ticket == ticket) else {
            return;
        };
        let Some(Slot {
            delivery: Some(Ok(Inbound::Message(message))),
            ..
        }) = self.waiting.remove(index)
        else {
            return;
        };

        if matches!(self.state, ChannelState::Closed | ChannelState::Failed(..)) {
            return;
        }

        // Later requests hold later messages; shift each one back a place.
        let mut message = message;
        for slot in self.waiting.iter_mut().skip(index) {
            match &mut slot.delivery {
                Some(Ok(Inbound::Message(later))) => std::mem::swap(later, &mut message),
                _ => {
                    slot.fill(Ok(Inbound::Message(message)));
                    return;
                }
            }
        }

        self.arrived.push_front(message);
    }

    fn deliver(&mut self, message: String) {
        if self.state != ChannelState::Open {
            debug!("Dropping message received after the channel stopped");
            return;
        }

        match self.waiting.iter_mut().find(|slot| slot.delivery.is_none()) {
            Some(slot) => slot.fill(Ok(Inbound::Message(message))),
            None => self.arrived.push_back(message),
        }
    }

    fn fill_unanswered(&mut self, delivery: Delivery) {
        for slot in self.waiting.iter_mut().filter(|slot| slot.delivery.is_none()) {
            slot.fill(delivery.clone());
        }
    }

    fn close(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }

        self.state = ChannelState::Closed;
        self.arrived.clear();
        self.fill_unanswered(Ok(Inbound::Canceled));
    }

    fn finish(&mut self) {
        if self.state != ChannelState::Open {
            return;
        }

        self.state = ChannelState::PeerClosed;
        self.fill_unanswered(Err(TransportError::ClosedByPeer));
    }

    fn fail(&mut self, error: TransportError) {
        if matches!(self.state, ChannelState::Closed | ChannelState::Failed(..)) {
            return;
        }

        self.arrived.clear();
        self.fill_unanswered(Err(error.clone()));
        self.state = ChannelState::Failed(error);
    }

    fn send_error(&self) -> Option<TransportError> {
        match &self.state {
            ChannelState::Open => None,
            ChannelState::Closed => Some(TransportError::ChannelClosed),
            ChannelState::PeerClosed => Some(TransportError::ClosedByPeer),
            ChannelState::Failed(error) => Some(error.clone()),
        }
    }
}

fn lock(queue: &Mutex<QueuedReceiver>) -> MutexGuard<'_, QueuedReceiver> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Future returned by [`MessageChannel::receive`].
#[derive(Debug)]
#[must_use = "a receive request keeps its place in line until dropped"]
pub struct Receive {
    inner: ReceiveInner,
}

#[derive(Debug)]
enum ReceiveInner {
    Ready(Option<Delivery>),
    Queued {
        queue: Arc<Mutex<QueuedReceiver>>,
        ticket: u64,
        done: bool,
    },
}

impl Receive {
    fn ready(delivery: Delivery) -> Self {
        Self {
            inner: ReceiveInner::Ready(Some(delivery)),
        }
    }

    fn queued(queue: Arc<Mutex<QueuedReceiver>>, ticket: u64) -> Self {
        Self {
            inner: ReceiveInner::Queued {
                queue,
                ticket,
                done: false,
            },
        }
    }
}

impl Future for Receive {
    type Output = Delivery;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            ReceiveInner::Ready(delivery) => {
                Poll::Ready(delivery.take().unwrap_or(Ok(Inbound::Canceled)))
            }
            ReceiveInner::Queued { done: true, .. } => Poll::Ready(Ok(Inbound::Canceled)),
            ReceiveInner::Queued { queue, ticket, done } => {
                let delivery = lock(queue).poll(*ticket, cx.waker());
                *done = delivery.is_ready();
                delivery
            }
        }
    }
}

impl Drop for Receive {
    fn drop(&mut self) {
        if let ReceiveInner::Queued {
            queue,
            ticket,
            done: false,
        } = &self.inner
        {
            lock(queue).withdraw(*ticket);
        }
    }
}

/// Handle to a duplex text-message connection. Clones share the same queue.
#[derive(Debug, Clone)]
pub struct MessageChannel {
    queue: Arc<Mutex<QueuedReceiver>>,
    outbox: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl MessageChannel {
    /// Creates a channel with no transport attached. The returned driver is
    /// the transport's side of the channel.
    pub fn new(cancel: CancellationToken) -> (MessageChannel, ChannelDriver) {
        let queue = Arc::new(Mutex::new(QueuedReceiver::new()));
        let (outbox, outgoing) = mpsc::unbounded_channel();

        let channel = MessageChannel {
            queue: queue.clone(),
            outbox,
            cancel: cancel.clone(),
        };
        let driver = ChannelDriver {
            queue,
            outgoing,
            cancel,
        };
        (channel, driver)
    }

    /// Opens a WebSocket connection to `address`.
    ///
    /// Only returns once the handshake has completed. The socket is serviced
    /// by a spawned task that stops when `cancel` fires or the connection ends.
    pub async fn connect(
        address: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<MessageChannel, TransportError> {
        if !address.starts_with("ws://") {
            return Err(TransportError::UnsupportedScheme(address.to_string()));
        }

        let (socket, _) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(address))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|e| TransportError::Handshake {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        info!("Connected to {}", address);

        let (channel, driver) = MessageChannel::new(cancel);
        tokio::spawn(driver.pump(socket));
        Ok(channel)
    }

    fn lock(&self) -> MutexGuard<'_, QueuedReceiver> {
        lock(&self.queue)
    }

    /// Queues `text` for sending. Fails only if the channel is no longer open.
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        if let Some(error) = self.lock().send_error() {
            return Err(error);
        }

        self.outbox
            .send(text)
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Requests the next inbound message.
    pub fn receive(&self) -> Receive {
        let request = self.lock().request();
        match request {
            Ok(ticket) => Receive::queued(self.queue.clone(), ticket),
            Err(delivery) => Receive::ready(delivery),
        }
    }

    /// Closes the channel, resolving every queued receive as canceled.
    pub fn close(&self) {
        self.lock().close();
        self.cancel.cancel();
    }

    pub fn is_open(&self) -> bool {
        self.lock().state == ChannelState::Open
    }
}

/// The transport's side of a [`MessageChannel`].
#[derive(Debug)]
pub struct ChannelDriver {
    queue: Arc<Mutex<QueuedReceiver>>,
    outgoing: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl ChannelDriver {
    fn lock(&self) -> MutexGuard<'_, QueuedReceiver> {
        lock(&self.queue)
    }

    pub fn deliver(&self, message: String) {
        self.lock().deliver(message);
    }

    /// Marks the connection as closed by the peer.
    pub fn finish(&self) {
        self.lock().finish();
    }

    pub fn fail(&self, error: TransportError) {
        self.lock().fail(error);
    }

    /// Next message queued by [`MessageChannel::send`], or `None` once every
    /// channel handle is gone.
    pub async fn next_outgoing(&mut self) -> Option<String> {
        self.outgoing.recv().await
    }

    pub fn try_next_outgoing(&mut self) -> Option<String> {
        self.outgoing.try_recv().ok()
    }

    /// Moves messages between the socket and the channel until either side
    /// stops.
    pub async fn pump<S>(mut self, socket: S)
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin,
    {
        let (mut sink, mut stream) = socket.split();
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Channel canceled, closing connection");
                    self.lock().close();
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!("Failed to send close frame: {}", e);
                    }
                    break;
                }

                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.deliver(text),
                    Some(Ok(Message::Close(frame))) => {
                        info!("Connection closed by peer: {:?}", frame);
                        self.finish();
                        break;
                    }
                    Some(Ok(other)) => debug!("Ignoring non-text frame: {:?}", other),
                    Some(Err(e)) => {
                        error!("Error receiving message: {}", e);
                        self.fail(TransportError::Socket(e.to_string()));
                        break;
                    }
                    None => {
                        info!("Connection ended");
                        self.finish();
                        break;
                    }
                },

                outgoing = self.outgoing.recv() => match outgoing {
                    Some(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            warn!("Error sending message: {}", e);
                            self.fail(TransportError::Socket(e.to_string()));
                            break;
                        }
                    }
                    None => {
                        debug!("All channel handles dropped");
                        self.lock().close();
                        break;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn message(text: &str) -> Delivery {
        Ok(Inbound::Message(text.to_string()))
    }

    fn queue_sizes(channel: &MessageChannel) -> (usize, usize) {
        let queue = channel.lock();
        (queue.waiting.len(), queue.arrived.len())
    }

    #[test]
    fn test_receives_resolve_in_request_order() {
        let (channel, driver) = MessageChannel::new(CancellationToken::new());
        let mut first = task::spawn(channel.receive());
        let mut second = task::spawn(channel.receive());
        let mut third = task::spawn(channel.receive());

        assert_pending!(third.poll());
        assert_pending!(first.poll());
        assert_eq!(queue_sizes(&channel), (3, 0));

        driver.deliver("m1".to_string());
        driver.deliver("m2".to_string());
        driver.deliver("m3".to_string());

        assert!(third.is_woken());
        assert_ready_eq!(third.poll(), message("m3"));
        assert_ready_eq!(second.poll(), message("m2"));
        assert_ready_eq!(first.poll(), message("m1"));
        assert_eq!(queue_sizes(&channel), (0, 0));
    }

    #[test]
    fn test_arrivals_are_buffered_until_requested() {
        let (channel, driver) = MessageChannel::new(CancellationToken::new());
        driver.deliver("m1".to_string());
        driver.deliver("m2".to_string());
        assert_eq!(queue_sizes(&channel), (0, 2));

        assert_ready_eq!(task::spawn(channel.receive()).poll(), message("m1"));
        assert_eq!(queue_sizes(&channel), (0, 1));
        assert_ready_eq!(task::spawn(channel.receive()).poll(), message("m2"));

        let mut third = task::spawn(channel.receive());
        assert_pending!(third.poll());
        assert_eq!(queue_sizes(&channel), (1, 0));
    }

    #[test]
    fn test_dropped_request_does_not_consume_message() {
        let (channel, driver) = MessageChannel::new(CancellationToken::new());
        let abandoned = channel.receive();
        let mut kept = task::spawn(channel.receive());
        drop(abandoned);

        driver.deliver("m1".to_string());
        assert_ready_eq!(kept.poll(), message("m1"));
    }

    #[test]
    fn test_message_of_dropped_request_goes_to_next_request() {
        let (channel, driver) = MessageChannel::new(CancellationToken::new());
        let first = channel.receive();
        driver.deliver("m1".to_string());
        drop(first);

        assert_eq!(queue_sizes(&channel), (0, 1));
        assert_ready_eq!(task::spawn(channel.receive()).poll(), message("m1"));
    }

    #[test]
    fn test_dropped_request_shifts_later_messages_back() {
        let (channel, driver) = MessageChannel::new(CancellationToken::new());
        let first = channel.receive();
        let mut second = task::spawn(channel.receive());
        let mut third = task::spawn(channel.receive());

        driver.deliver("m1".to_string());
        driver.deliver("m2".to_string());
        drop(first);

        assert_ready_eq!(second.poll(), message("m1"));
        assert_ready_eq!(third.poll(), message("m2"));
        assert_eq!(queue_sizes(&channel), (0, 0));
    }

    #[test]
    fn test_completed_request_is_not_redelivered() {
        let (channel, driver) = MessageChannel::new(CancellationToken::new());
        let mut first = task::spawn(channel.receive());
        driver.deliver("m1".to_string());

        assert_ready_eq!(first.poll(), message("m1"));
        drop(first);

        let mut next = task::spawn(channel.receive());
        assert_pending!(next.poll());
    }

    #[test]
    fn test_close_cancels_queued_requests() {
        let (channel, _driver) = MessageChannel::new(CancellationToken::new());
        let mut first = task::spawn(channel.receive());
        let mut second = task::spawn(channel.receive());

        channel.close();

        assert_ready_eq!(first.poll(), Ok(Inbound::Canceled));
        assert_ready_eq!(second.poll(), Ok(Inbound::Canceled));
        assert_ready_eq!(task::spawn(channel.receive()).poll(), Ok(Inbound::Canceled));
        assert_eq!(
            channel.send("late".to_string()),
            Err(TransportError::ChannelClosed)
        );
    }

    #[test]
    fn test_failure_reaches_every_queued_request() {
        let (channel, driver) = MessageChannel::new(CancellationToken::new());
        let mut first = task::spawn(channel.receive());
        let mut second = task::spawn(channel.receive());
        let fault = TransportError::Socket("connection reset".to_string());

        driver.fail(fault.clone());

        assert_ready_eq!(first.poll(), Err(fault.clone()));
        assert_ready_eq!(second.poll(), Err(fault.clone()));
        assert_ready_eq!(task::spawn(channel.receive()).poll(), Err(fault.clone()));
        assert_eq!(channel.send("late".to_string()), Err(fault));
        assert!(!channel.is_open());
    }

    #[test]
    fn test_failure_discards_buffered_messages() {
        let (channel, driver) = MessageChannel::new(CancellationToken::new());
        driver.deliver("m1".to_string());
        driver.fail(TransportError::ClosedByPeer);

        assert_eq!(queue_sizes(&channel), (0, 0));
        assert_ready_eq!(
            task::spawn(channel.receive()).poll(),
            Err(TransportError::ClosedByPeer)
        );
    }

    #[test]
    fn test_peer_close_drains_buffer_first() {
        let (channel, driver) = MessageChannel::new(CancellationToken::new());
        driver.deliver("last".to_string());
        driver.finish();

        assert_ready_eq!(task::spawn(channel.receive()).poll(), message("last"));
        assert_ready_eq!(
            task::spawn(channel.receive()).poll(),
            Err(TransportError::ClosedByPeer)
        );
    }

    #[tokio::test]
    async fn test_sent_messages_reach_driver_in_order() {
        let (channel, mut driver) = MessageChannel::new(CancellationToken::new());
        channel.send("first".to_string()).unwrap();
        channel.clone().send("second".to_string()).unwrap();

        assert_eq!(driver.next_outgoing().await, Some("first".to_string()));
        assert_eq!(driver.next_outgoing().await, Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_rejected() {
        let result = MessageChannel::connect(
            "http://127.0.0.1:3030",
            Duration::from_millis(100),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(TransportError::UnsupportedScheme(..))));
    }
}
