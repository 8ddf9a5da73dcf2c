use tokio::sync::{broadcast, mpsc, oneshot};

use super::envelope::{Envelope, Reply};
use super::ids::Origin;

/// Outcome of a best-effort send.
///
/// `NoListener` is an expected result: the receiving context may not exist yet, may have
/// been torn down, or may have chosen not to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    Delivered(T),
    NoListener,
}

impl<T> Delivery<T> {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// One message as seen by the receiving context.
#[derive(Debug)]
pub struct Inbound {
    pub envelope: Envelope,
    pub origin: Option<Origin>,
    responder: Option<oneshot::Sender<Reply>>,
}

impl Inbound {
    pub fn new(envelope: Envelope, origin: Option<Origin>) -> Self {
        Self {
            envelope,
            origin,
            responder: None,
        }
    }

    pub fn expects_reply(&self) -> bool {
        self.responder.is_some()
    }

    /// Answers the sender. Returns false when no answer was requested or the sender left.
    pub fn respond(&mut self, reply: Reply) -> bool {
        self.responder
            .take()
            .map(|responder| responder.send(reply).is_ok())
            .unwrap_or(false)
    }
}

pub type Inbox = mpsc::UnboundedReceiver<Inbound>;

/// Sending half of a context's inbox.
#[derive(Debug, Clone)]
pub struct Mailbox {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl Mailbox {
    pub fn channel() -> (Self, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// True when both handles feed the same inbox.
    pub fn same_channel(&self, other: &Mailbox) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Fire-and-forget send.
    pub fn post(&self, envelope: Envelope, origin: Option<Origin>) -> Delivery<()> {
        match self.tx.send(Inbound::new(envelope, origin)) {
            Ok(()) => Delivery::Delivered(()),
            Err(_) => Delivery::NoListener,
        }
    }

    /// Sends and waits for the receiver's answer.
    ///
    /// A receiver that drops the message without answering counts as no listener.
    pub async fn request(&self, envelope: Envelope, origin: Option<Origin>) -> Delivery<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let inbound = Inbound {
            envelope,
            origin,
            responder: Some(reply_tx),
        };
        if self.tx.send(inbound).is_err() {
            return Delivery::NoListener;
        }

        match reply_rx.await {
            Ok(reply) => Delivery::Delivered(reply),
            Err(_) => Delivery::NoListener,
        }
    }
}

/// Page-scoped broadcast space shared by everything attached to one tab's page.
#[derive(Debug, Clone)]
pub struct PageChannel {
    tx: broadcast::Sender<Envelope>,
}

impl PageChannel {
    pub const CAPACITY: usize = 32;

    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    pub fn post(&self, envelope: Envelope) -> Delivery<()> {
        match self.tx.send(envelope) {
            Ok(_) => Delivery::Delivered(()),
            Err(_) => Delivery::NoListener,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

impl Default for PageChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VideoId;
    use crate::ids::{TabId, WindowId};

    #[tokio::test]
    async fn post_to_dropped_inbox_reports_no_listener() {
        let (mailbox, inbox) = Mailbox::channel();
        drop(inbox);
        assert_eq!(mailbox.post(Envelope::GetVideoId, None), Delivery::NoListener);
        assert_eq!(
            mailbox.request(Envelope::GetVideoId, None).await,
            Delivery::NoListener
        );
    }

    #[tokio::test]
    async fn request_round_trips_through_responder() {
        let (mailbox, mut inbox) = Mailbox::channel();
        let origin = Origin::new(TabId::new(3), WindowId::new(1));

        let responder = tokio::spawn(async move {
            let mut inbound = inbox.recv().await.unwrap();
            assert_eq!(inbound.origin, Some(origin));
            assert!(inbound.expects_reply());
            inbound.respond(Reply::video_id(VideoId::new("abc")))
        });

        let reply = mailbox.request(Envelope::GetVideoId, Some(origin)).await;
        assert_eq!(reply, Delivery::Delivered(Reply::video_id(VideoId::new("abc"))));
        assert!(responder.await.unwrap());
    }

    #[tokio::test]
    async fn unanswered_request_reports_no_listener() {
        let (mailbox, mut inbox) = Mailbox::channel();
        tokio::spawn(async move {
            // Receive and drop without answering.
            let _ = inbox.recv().await;
        });
        assert_eq!(
            mailbox.request(Envelope::GetVideoId, None).await,
            Delivery::NoListener
        );
    }

    #[test]
    fn page_channel_without_subscribers_has_no_listener() {
        let channel = PageChannel::new();
        assert_eq!(channel.post(Envelope::OpenSidePanel), Delivery::NoListener);

        let mut receiver = channel.subscribe();
        assert!(channel.post(Envelope::OpenSidePanel).is_delivered());
        assert_eq!(receiver.try_recv().unwrap(), Envelope::OpenSidePanel);
    }
}
