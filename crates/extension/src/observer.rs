use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vidchat_protocol::{
    Delivery, Envelope, Inbound, Inbox, Mailbox, Origin, PageChannel, Reply, VideoId,
    extract_video_id,
};

use crate::host::MessageBus;

/// Signals raised inside the page document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// The document finished loading.
    Loaded,
    /// The document tree changed; `url` is the location at that moment.
    DomMutated { url: String },
    /// Back/forward navigation.
    HistoryNavigated { url: String },
    /// The page asked for the panel to be opened in its window.
    PanelRequested,
}

/// Page-embedded watcher owning the "last known identifier for this page".
#[derive(Debug)]
pub struct PageObserver {
    origin: Origin,
    live_url: String,
    last_seen_url: String,
    current: Option<VideoId>,
    bus: Arc<MessageBus>,
    page: PageChannel,
}

impl PageObserver {
    /// Creates the observer for a page that loaded at `url`.
    pub fn new(origin: Origin, url: impl Into<String>, bus: Arc<MessageBus>) -> Self {
        let url = url.into();
        let page = bus.page(origin.tab);
        Self {
            origin,
            current: extract_video_id(&url),
            last_seen_url: url.clone(),
            live_url: url,
            bus,
            page,
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn current(&self) -> Option<&VideoId> {
        self.current.as_ref()
    }

    /// Answer to a direct query: the tracked identifier, else a fresh extraction.
    pub fn query_video_id(&self) -> Option<VideoId> {
        self.current
            .clone()
            .or_else(|| extract_video_id(&self.live_url))
    }

    /// Announces the page's identifier into the page broadcast once loading completes.
    pub fn on_loaded(&mut self) -> Delivery<()> {
        match self.query_video_id() {
            Some(video_id) => self.broadcast(video_id),
            None => Delivery::NoListener,
        }
    }

    /// Mutation-driven detection: only a location that differs from the last one seen
    /// counts as navigation.
    pub fn on_dom_mutated(&mut self, url: &str) -> Option<VideoId> {
        if url == self.last_seen_url {
            return None;
        }

        self.last_seen_url = url.to_string();
        self.live_url = url.to_string();
        self.check_video_change()
    }

    pub fn on_history_navigated(&mut self, url: &str) -> Option<VideoId> {
        self.last_seen_url = url.to_string();
        self.live_url = url.to_string();
        self.check_video_change()
    }

    /// Recomputes the identifier and propagates it if it changed.
    ///
    /// Returns the new identifier when a change was emitted.
    fn check_video_change(&mut self) -> Option<VideoId> {
        let video_id = extract_video_id(&self.live_url)?;
        if self.current.as_ref() == Some(&video_id) {
            return None;
        }

        tracing::info!(
            tab = %self.origin.tab,
            video_id = %video_id,
            previous = ?self.current.as_ref().map(VideoId::as_str),
            "page video changed"
        );
        self.current = Some(video_id.clone());

        let relayed = self
            .bus
            .send_runtime(Envelope::video_changed(video_id.clone()), Some(self.origin));
        if !relayed.is_delivered() {
            tracing::debug!(tab = %self.origin.tab, "coordinator not listening; change not relayed");
        }
        self.broadcast(video_id.clone());

        Some(video_id)
    }

    fn broadcast(&self, video_id: VideoId) -> Delivery<()> {
        let delivery = self.page.post(Envelope::video_changed(video_id));
        if !delivery.is_delivered() {
            tracing::debug!(tab = %self.origin.tab, "no page listener for video broadcast");
        }
        delivery
    }

    pub fn request_panel(&self) -> Delivery<()> {
        self.bus
            .send_runtime(Envelope::OpenSidePanel, Some(self.origin))
    }

    pub fn handle_inbound(&mut self, mut inbound: Inbound) {
        match inbound.envelope.clone() {
            Envelope::VideoChanged { video_id } => {
                // The coordinator's view of a completed load is authoritative here.
                tracing::debug!(tab = %self.origin.tab, video_id = %video_id, "coordinator relayed video");
                // The relay describes a location this observer never saw; forget the old
                // one so the next mutation rechecks.
                self.last_seen_url.clear();
                self.live_url.clear();
                self.current = Some(video_id.clone());
                self.broadcast(video_id);
            }
            Envelope::GetVideoId => {
                let reply = Reply::video_id(self.query_video_id());
                if !inbound.respond(reply) {
                    tracing::debug!(tab = %self.origin.tab, "video query sender went away");
                }
            }
            Envelope::OpenSidePanel => {
                tracing::debug!(tab = %self.origin.tab, "ignoring panel request addressed to a page");
            }
        }
    }

    pub fn handle_page_event(&mut self, event: PageEvent) {
        match event {
            PageEvent::Loaded => {
                self.on_loaded();
            }
            PageEvent::DomMutated { url } => {
                self.on_dom_mutated(&url);
            }
            PageEvent::HistoryNavigated { url } => {
                self.on_history_navigated(&url);
            }
            PageEvent::PanelRequested => {
                if !self.request_panel().is_delivered() {
                    tracing::debug!(tab = %self.origin.tab, "coordinator not listening; panel request dropped");
                }
            }
        }
    }

    /// Registers the observer as its tab's listener and starts processing page events.
    pub fn attach(self) -> ObserverHandle {
        let (mailbox, inbox) = Mailbox::channel();
        self.bus.attach_tab(self.origin.tab, mailbox.clone());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(mailbox, inbox, events_rx));
        ObserverHandle {
            events: events_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mailbox: Mailbox,
        mut inbox: Inbox,
        mut events: mpsc::UnboundedReceiver<PageEvent>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_page_event(event),
                    None => break,
                },
                inbound = inbox.recv() => match inbound {
                    Some(inbound) => self.handle_inbound(inbound),
                    None => break,
                },
            }
        }

        self.bus.detach_tab(self.origin.tab, &mailbox);
        tracing::debug!(tab = %self.origin.tab, "page observer detached");
    }
}

/// Feeds page events to a running observer.
#[derive(Debug)]
pub struct ObserverHandle {
    events: mpsc::UnboundedSender<PageEvent>,
    task: JoinHandle<()>,
}

impl ObserverHandle {
    pub fn send(&self, event: PageEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Stops the observer, as when the page unloads.
    pub async fn detach(self) {
        let Self { events, task } = self;
        drop(events);
        if let Err(error) = task.await {
            tracing::error!(error = %error, "page observer task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidchat_protocol::{TabId, WindowId};

    const FIRST: &str = "https://www.youtube.com/watch?v=first&t=1s";
    const SECOND: &str = "https://www.youtube.com/watch?v=second";

    fn origin() -> Origin {
        Origin::new(TabId::new(9), WindowId::new(2))
    }

    fn id(raw: &str) -> VideoId {
        VideoId::new(raw).unwrap()
    }

    #[test]
    fn initial_identifier_comes_from_load_url() {
        let observer = PageObserver::new(origin(), FIRST, Arc::new(MessageBus::new()));
        assert_eq!(observer.current(), Some(&id("first")));
    }

    #[test]
    fn url_change_notifies_coordinator_and_page() {
        let bus = Arc::new(MessageBus::new());
        let (runtime, mut runtime_inbox) = Mailbox::channel();
        bus.attach_runtime(runtime);
        let mut page = bus.page(origin().tab).subscribe();

        let mut observer = PageObserver::new(origin(), FIRST, bus.clone());
        assert_eq!(observer.on_dom_mutated(SECOND), Some(id("second")));

        let inbound = runtime_inbox.try_recv().unwrap();
        assert_eq!(inbound.envelope, Envelope::video_changed(id("second")));
        assert_eq!(inbound.origin, Some(origin()));
        assert_eq!(page.try_recv().unwrap(), Envelope::video_changed(id("second")));
    }

    #[test]
    fn unchanged_or_missing_identifier_emits_nothing() {
        let bus = Arc::new(MessageBus::new());
        let (runtime, mut runtime_inbox) = Mailbox::channel();
        bus.attach_runtime(runtime);

        let mut observer = PageObserver::new(origin(), FIRST, bus);
        // Same video, different timestamp.
        assert_eq!(
            observer.on_dom_mutated("https://www.youtube.com/watch?v=first&t=99s"),
            None
        );
        // Leaving the watch page keeps the last identifier.
        assert_eq!(observer.on_dom_mutated("https://www.youtube.com/feed/trending"), None);
        assert_eq!(observer.current(), Some(&id("first")));
        assert!(runtime_inbox.try_recv().is_err());
    }

    #[test]
    fn mutation_with_same_location_is_not_navigation() {
        let mut observer = PageObserver::new(origin(), FIRST, Arc::new(MessageBus::new()));
        observer.current = None;
        // Location unchanged, so no recheck even though the identifier was cleared.
        assert_eq!(observer.on_dom_mutated(FIRST), None);
        // History navigation always rechecks.
        assert_eq!(observer.on_history_navigated(FIRST), Some(id("first")));
    }

    #[test]
    fn rapid_navigation_keeps_last_identifier() {
        let mut observer = PageObserver::new(origin(), FIRST, Arc::new(MessageBus::new()));
        observer.on_dom_mutated(SECOND);
        observer.on_dom_mutated("https://youtu.be/third");
        assert_eq!(observer.current(), Some(&id("third")));
    }

    #[test]
    fn relayed_change_is_adopted_and_forwarded() {
        let bus = Arc::new(MessageBus::new());
        let mut page = bus.page(origin().tab).subscribe();
        let mut observer = PageObserver::new(origin(), FIRST, bus);

        observer.handle_inbound(Inbound::new(Envelope::video_changed(id("relayed")), None));

        assert_eq!(observer.current(), Some(&id("relayed")));
        assert_eq!(page.try_recv().unwrap(), Envelope::video_changed(id("relayed")));
    }

    #[test]
    fn return_to_previous_location_after_relay_is_detected() {
        let mut observer = PageObserver::new(origin(), FIRST, Arc::new(MessageBus::new()));
        observer.handle_inbound(Inbound::new(Envelope::video_changed(id("second")), None));

        assert_eq!(observer.on_dom_mutated(FIRST), Some(id("first")));
        assert_eq!(observer.current(), Some(&id("first")));
    }

    #[test]
    fn load_completion_broadcasts_once() {
        let bus = Arc::new(MessageBus::new());
        let mut page = bus.page(origin().tab).subscribe();
        let mut observer = PageObserver::new(origin(), FIRST, bus);

        assert!(observer.on_loaded().is_delivered());
        assert_eq!(page.try_recv().unwrap(), Envelope::video_changed(id("first")));
        assert!(page.try_recv().is_err());
    }

    #[test]
    fn query_falls_back_to_live_url() {
        let mut observer = PageObserver::new(
            origin(),
            "https://www.youtube.com/",
            Arc::new(MessageBus::new()),
        );
        assert_eq!(observer.query_video_id(), None);

        observer.live_url = SECOND.to_string();
        assert_eq!(observer.query_video_id(), Some(id("second")));
    }

    #[tokio::test]
    async fn attached_observer_answers_tab_queries() {
        let bus = Arc::new(MessageBus::new());
        let handle = PageObserver::new(origin(), FIRST, bus.clone()).attach();

        let reply = bus.request_tab(origin().tab, Envelope::GetVideoId).await;
        assert_eq!(reply, Delivery::Delivered(Reply::video_id(Some(id("first")))));

        handle.detach().await;
        assert_eq!(
            bus.send_to_tab(origin().tab, Envelope::GetVideoId),
            Delivery::NoListener
        );
    }
}
