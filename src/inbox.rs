use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::Message;

/// The error returned by an [`Inbox`] callback
/// after the inbox was dropped.
#[derive(thiserror::Error, Debug)]
#[error("inbox closed")]
pub struct InboxClosed;

/// A queue of received messages.
///
/// Pass [`Inbox::sender`] to [`crate::Server::new`]
/// to collect every message the server accepts.
#[derive(Debug)]
pub struct Inbox {
    channel_tx: mpsc::UnboundedSender<Message>,
    channel_rx: mpsc::UnboundedReceiver<Message>,
}

impl Inbox {
    pub fn new() -> Self {
        let (channel_tx, channel_rx) = mpsc::unbounded_channel();
        Self {
            channel_tx,
            channel_rx,
        }
    }

    /// Create a delivery callback that queues into this inbox.
    pub fn sender(
        &self,
    ) -> impl Fn(Message) -> Result<(), InboxClosed> + Send + Sync + 'static
    {
        let channel_tx = self.channel_tx.clone();
        move |message| channel_tx.send(message).map_err(|_| InboxClosed)
    }

    /// Receive a single message.
    pub async fn receive(&mut self) -> Message {
        loop {
            // NOTE: since the inbox keeps a sender itself,
            //       the channel never closes and
            //       we cannot receive `None`
            if let Some(message) = self.channel_rx.recv().await {
                return message;
            }
        }
    }

    /// Take a message if one is queued.
    pub fn try_receive(&mut self) -> Option<Message> {
        self.channel_rx.try_recv().ok()
    }

    /// Create a stream of messages.
    pub fn stream(&mut self) -> impl Stream<Item = Message> + '_ {
        async_stream::stream! {
            loop {
                yield self.receive().await;
            }
        }
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}
