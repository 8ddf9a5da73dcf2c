use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use vidchat_protocol::{
    Delivery, Envelope, Inbound, Inbox, Mailbox, Reply, TabId, VideoId, extract_video_id,
    is_eligible,
};

use crate::host::{HostEvent, MessageBus, TabHost, TabInfo};

/// Background service mirroring tab -> video associations.
///
/// State lives only as long as the service runs; every [`Coordinator::start`] begins empty.
pub struct Coordinator {
    host: Arc<dyn TabHost>,
    bus: Arc<MessageBus>,
    tabs: HashMap<TabId, VideoId>,
}

impl Coordinator {
    pub fn new(host: Arc<dyn TabHost>, bus: Arc<MessageBus>) -> Self {
        Self {
            host,
            bus,
            tabs: HashMap::new(),
        }
    }

    /// Last identifier recorded for `tab`. May lag behind the live URL.
    pub fn tab_video_id(&self, tab: TabId) -> Option<&VideoId> {
        self.tabs.get(&tab)
    }

    /// Identifier of the focused tab, read from its live URL rather than the mirror.
    pub fn active_video_id(&self) -> Option<VideoId> {
        self.host
            .active_tab()
            .and_then(|tab| extract_video_id(&tab.url))
    }

    pub fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::NavigationCompleted { tab, url } => self.on_navigation_completed(tab, &url),
            HostEvent::IconActivated(tab) => self.on_icon_activated(&tab),
        }
    }

    fn on_navigation_completed(&mut self, tab: TabId, url: &str) {
        let eligible = is_eligible(url);
        self.host.set_panel_enabled(tab, eligible);
        if !eligible {
            return;
        }

        let Some(video_id) = extract_video_id(url) else {
            return;
        };
        self.tabs.insert(tab, video_id.clone());

        match self
            .bus
            .send_to_tab(tab, Envelope::video_changed(video_id.clone()))
        {
            Delivery::Delivered(()) => {
                tracing::debug!(tab = %tab, video_id = %video_id, "relayed video change to page");
            }
            Delivery::NoListener => {
                tracing::debug!(tab = %tab, video_id = %video_id, "page observer not attached yet");
            }
        }
    }

    fn on_icon_activated(&self, tab: &TabInfo) {
        if !is_eligible(&tab.url) {
            tracing::debug!(tab = %tab.id, "icon activated on an ineligible page");
            return;
        }

        let opened = self.host.open_panel(tab.window);
        tracing::debug!(tab = %tab.id, window = %tab.window, opened, "panel open requested from icon");
    }

    pub fn handle_inbound(&mut self, mut inbound: Inbound) {
        match inbound.envelope.clone() {
            Envelope::VideoChanged { video_id } => match inbound.origin {
                Some(origin) => {
                    self.tabs.insert(origin.tab, video_id);
                }
                None => {
                    tracing::debug!(video_id = %video_id, "ignoring video change without a sender tab");
                }
            },
            Envelope::GetVideoId => {
                let video_id = self.active_video_id();
                if !inbound.respond(Reply::video_id(video_id)) {
                    tracing::debug!("video query sender went away");
                }
            }
            Envelope::OpenSidePanel => {
                let success = match inbound.origin {
                    Some(origin) => self.host.open_panel(origin.window),
                    None => false,
                };
                inbound.respond(Reply::panel_opened(success));
            }
        }
    }

    /// Registers as the runtime listener and starts serving.
    pub fn start(self, host_events: mpsc::UnboundedReceiver<HostEvent>) -> CoordinatorHandle {
        let (mailbox, inbox) = Mailbox::channel();
        self.bus.attach_runtime(mailbox.clone());
        let bus = self.bus.clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(inbox, host_events, shutdown_rx));
        tracing::info!("coordinator started");

        CoordinatorHandle {
            bus,
            mailbox,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        mut inbox: Inbox,
        mut host_events: mpsc::UnboundedReceiver<HostEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Self {
        let mut host_events_open = true;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                event = host_events.recv(), if host_events_open => match event {
                    Some(event) => self.handle_host_event(event),
                    None => host_events_open = false,
                },
                inbound = inbox.recv() => match inbound {
                    Some(inbound) => self.handle_inbound(inbound),
                    None => break,
                },
            }
        }

        tracing::info!(tracked_tabs = self.tabs.len(), "coordinator stopped");
        self
    }
}

/// Owner of a running [`Coordinator`].
///
/// Dropping the handle stops the service; [`CoordinatorHandle::shutdown`] also hands back
/// its final state.
pub struct CoordinatorHandle {
    bus: Arc<MessageBus>,
    mailbox: Mailbox,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Coordinator>>,
}

impl CoordinatorHandle {
    pub async fn shutdown(mut self) -> Option<Coordinator> {
        self.stop();
        let task = self.task.take()?;
        match task.await {
            Ok(coordinator) => Some(coordinator),
            Err(error) => {
                tracing::error!(error = %error, "coordinator task failed");
                None
            }
        }
    }

    fn stop(&mut self) {
        self.bus.detach_runtime(&self.mailbox);
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimulatedBrowser;
    use vidchat_protocol::{Origin, WindowId};

    const WATCH: &str = "https://www.youtube.com/watch?v=abc123&t=4s";

    fn id(raw: &str) -> VideoId {
        VideoId::new(raw).unwrap()
    }

    fn setup() -> (Arc<SimulatedBrowser>, Arc<MessageBus>, Coordinator) {
        let bus = Arc::new(MessageBus::new());
        let (browser, _events) = SimulatedBrowser::new(bus.clone());
        let coordinator = Coordinator::new(browser.clone(), bus.clone());
        (browser, bus, coordinator)
    }

    #[test]
    fn navigation_records_and_relays_to_page() {
        let (browser, bus, mut coordinator) = setup();
        let tab = browser.open_tab(WindowId::new(1), WATCH);
        let (page, mut page_inbox) = Mailbox::channel();
        bus.attach_tab(tab.id, page);

        coordinator.handle_host_event(HostEvent::NavigationCompleted {
            tab: tab.id,
            url: WATCH.to_string(),
        });

        assert_eq!(coordinator.tab_video_id(tab.id), Some(&id("abc123")));
        assert_eq!(browser.panel_enabled(tab.id), Some(true));
        assert_eq!(
            page_inbox.try_recv().unwrap().envelope,
            Envelope::video_changed(id("abc123"))
        );
    }

    #[test]
    fn navigation_without_page_listener_is_not_an_error() {
        let (browser, _bus, mut coordinator) = setup();
        let tab = browser.open_tab(WindowId::new(1), WATCH);

        coordinator.handle_host_event(HostEvent::NavigationCompleted {
            tab: tab.id,
            url: WATCH.to_string(),
        });

        assert_eq!(coordinator.tab_video_id(tab.id), Some(&id("abc123")));
    }

    #[test]
    fn eligibility_is_recomputed_per_navigation() {
        let (browser, _bus, mut coordinator) = setup();
        let tab = browser.open_tab(WindowId::new(1), WATCH);

        coordinator.handle_host_event(HostEvent::NavigationCompleted {
            tab: tab.id,
            url: WATCH.to_string(),
        });
        assert_eq!(browser.panel_enabled(tab.id), Some(true));

        coordinator.handle_host_event(HostEvent::NavigationCompleted {
            tab: tab.id,
            url: "https://www.youtube.com/feed/library".to_string(),
        });
        assert_eq!(browser.panel_enabled(tab.id), Some(false));
        // The stale mirror entry is kept; it is overwritten on the next video load.
        assert_eq!(coordinator.tab_video_id(tab.id), Some(&id("abc123")));
    }

    #[test]
    fn page_reported_changes_update_the_mirror() {
        let (_browser, _bus, mut coordinator) = setup();
        let origin = Origin::new(TabId::new(5), WindowId::new(1));

        coordinator.handle_inbound(Inbound::new(
            Envelope::video_changed(id("from-page")),
            Some(origin),
        ));
        assert_eq!(coordinator.tab_video_id(origin.tab), Some(&id("from-page")));
    }

    #[test]
    fn icon_opens_panel_only_for_eligible_pages() {
        let (browser, _bus, mut coordinator) = setup();
        let window = WindowId::new(3);
        let tab = browser.open_tab(window, "https://example.com/");
        coordinator.handle_host_event(HostEvent::IconActivated(tab.clone()));
        assert!(browser.opened_panels().is_empty());

        let tab = TabInfo {
            url: WATCH.to_string(),
            ..tab
        };
        coordinator.handle_host_event(HostEvent::IconActivated(tab));
        assert_eq!(browser.opened_panels(), vec![window]);
    }

    #[tokio::test]
    async fn query_reads_the_live_url_not_the_mirror() {
        let (browser, bus, coordinator) = setup();
        let tab = browser.open_tab(WindowId::new(1), WATCH);
        // Navigate in-page without a completion signal; the mirror never sees it.
        browser.push_state(tab.id, "https://youtu.be/fresh?t=2");

        let (browser_events_tx, browser_events_rx) = mpsc::unbounded_channel();
        let handle = coordinator.start(browser_events_rx);

        let reply = bus.request_runtime(Envelope::GetVideoId, None).await;
        assert_eq!(reply, Delivery::Delivered(Reply::video_id(Some(id("fresh")))));

        drop(browser_events_tx);
        let stopped = handle.shutdown().await.unwrap();
        assert_eq!(stopped.tab_video_id(tab.id), None);
    }

    #[tokio::test]
    async fn open_panel_request_uses_sender_window() {
        let (browser, bus, coordinator) = setup();
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = coordinator.start(events_rx);
        let origin = Origin::new(TabId::new(1), WindowId::new(8));

        let reply = bus.request_runtime(Envelope::OpenSidePanel, Some(origin)).await;
        assert_eq!(reply, Delivery::Delivered(Reply::panel_opened(true)));
        assert_eq!(browser.opened_panels(), vec![WindowId::new(8)]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_detaches_from_the_bus() {
        let (_browser, bus, coordinator) = setup();
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = coordinator.start(events_rx);

        assert!(handle.shutdown().await.is_some());
        assert_eq!(
            bus.send_runtime(Envelope::GetVideoId, None),
            Delivery::NoListener
        );
        assert_eq!(
            bus.request_runtime(Envelope::GetVideoId, None).await,
            Delivery::NoListener
        );
    }
}
