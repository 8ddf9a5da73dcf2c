use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use arc_swap::ArcSwapOption;
use tokio::sync::mpsc;
use vidchat_protocol::{Delivery, Envelope, Mailbox, Origin, PageChannel, Reply, TabId, WindowId};

/// A browser tab as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub window: WindowId,
    pub url: String,
}

impl TabInfo {
    pub fn origin(&self) -> Origin {
        Origin::new(self.id, self.window)
    }
}

/// Tab-level signals raised by the host, independent of any page script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A tab finished loading `url`.
    NavigationCompleted { tab: TabId, url: String },
    /// The user clicked the extension icon while `tab` was focused.
    IconActivated(TabInfo),
}

/// Browser operations the coordinator and panel rely on.
pub trait TabHost: Send + Sync {
    /// The focused tab of the current window.
    fn active_tab(&self) -> Option<TabInfo>;
    fn set_panel_enabled(&self, tab: TabId, enabled: bool);
    /// Opens the panel surface in `window`. Returns false if the host refused.
    fn open_panel(&self, window: WindowId) -> bool;
}

/// Host-provided routing between contexts.
///
/// There is one runtime listener slot (the coordinator), one listener slot per tab (that
/// tab's page observer) and one page broadcast space per tab. Every send is best-effort.
#[derive(Debug, Default)]
pub struct MessageBus {
    runtime: ArcSwapOption<Mailbox>,
    tabs: RwLock<HashMap<TabId, Mailbox>>,
    pages: RwLock<HashMap<TabId, PageChannel>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_runtime(&self, mailbox: Mailbox) {
        self.runtime.store(Some(Arc::new(mailbox)));
    }

    /// Clears the runtime slot if it still holds `mailbox`.
    pub fn detach_runtime(&self, mailbox: &Mailbox) {
        let current = self.runtime.load_full();
        if current.is_some_and(|current| current.same_channel(mailbox)) {
            self.runtime.store(None);
        }
    }

    pub fn send_runtime(&self, envelope: Envelope, origin: Option<Origin>) -> Delivery<()> {
        match self.runtime.load_full() {
            Some(mailbox) => mailbox.post(envelope, origin),
            None => Delivery::NoListener,
        }
    }

    pub async fn request_runtime(&self, envelope: Envelope, origin: Option<Origin>) -> Delivery<Reply> {
        match self.runtime.load_full() {
            Some(mailbox) => mailbox.request(envelope, origin).await,
            None => Delivery::NoListener,
        }
    }

    pub fn attach_tab(&self, tab: TabId, mailbox: Mailbox) {
        self.tabs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tab, mailbox);
    }

    /// Clears the tab slot if it still holds `mailbox`; a newer page may have replaced it.
    pub fn detach_tab(&self, tab: TabId, mailbox: &Mailbox) {
        let mut tabs = self.tabs.write().unwrap_or_else(PoisonError::into_inner);
        if tabs.get(&tab).is_some_and(|current| current.same_channel(mailbox)) {
            tabs.remove(&tab);
        }
    }

    fn tab_mailbox(&self, tab: TabId) -> Option<Mailbox> {
        self.tabs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tab)
            .cloned()
    }

    pub fn send_to_tab(&self, tab: TabId, envelope: Envelope) -> Delivery<()> {
        match self.tab_mailbox(tab) {
            Some(mailbox) => mailbox.post(envelope, None),
            None => Delivery::NoListener,
        }
    }

    pub async fn request_tab(&self, tab: TabId, envelope: Envelope) -> Delivery<Reply> {
        match self.tab_mailbox(tab) {
            Some(mailbox) => mailbox.request(envelope, None).await,
            None => Delivery::NoListener,
        }
    }

    /// The broadcast space of `tab`'s page, created on first use.
    pub fn page(&self, tab: TabId) -> PageChannel {
        if let Some(channel) = self
            .pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tab)
        {
            return channel.clone();
        }

        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(tab)
            .or_default()
            .clone()
    }
}

#[derive(Debug, Default)]
struct BrowserState {
    next_tab: u64,
    tabs: BTreeMap<TabId, TabInfo>,
    active: Option<TabId>,
    panel_enabled: HashMap<TabId, bool>,
    opened_panels: Vec<WindowId>,
}

/// In-process browser used by the binary and the tests.
///
/// It owns tab URLs and panel bookkeeping and raises [`HostEvent`]s the way a real host
/// would. Page-side signals (DOM mutation, history navigation) are the page observer's
/// business and are not raised here.
#[derive(Debug)]
pub struct SimulatedBrowser {
    state: Mutex<BrowserState>,
    bus: Arc<MessageBus>,
    host_events: mpsc::UnboundedSender<HostEvent>,
}

impl SimulatedBrowser {
    pub fn new(bus: Arc<MessageBus>) -> (Arc<Self>, mpsc::UnboundedReceiver<HostEvent>) {
        let (host_events, host_events_rx) = mpsc::unbounded_channel();
        let browser = Arc::new(Self {
            state: Mutex::new(BrowserState {
                next_tab: 1,
                ..BrowserState::default()
            }),
            bus,
            host_events,
        });
        (browser, host_events_rx)
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BrowserState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn emit(&self, event: HostEvent) {
        if self.host_events.send(event).is_err() {
            tracing::debug!("host event dropped because the coordinator is not running");
        }
    }

    /// Opens and focuses a new tab, then reports its load as complete.
    pub fn open_tab(&self, window: WindowId, url: impl Into<String>) -> TabInfo {
        let url = url.into();
        let tab = self.with_state(|state| {
            let id = TabId::new(state.next_tab);
            state.next_tab += 1;
            let tab = TabInfo { id, window, url };
            state.tabs.insert(id, tab.clone());
            state.active = Some(id);
            tab
        });

        self.emit(HostEvent::NavigationCompleted {
            tab: tab.id,
            url: tab.url.clone(),
        });
        tab
    }

    /// Full page load of `url` in `tab`.
    pub fn navigate(&self, tab: TabId, url: impl Into<String>) -> Option<TabInfo> {
        let updated = self.set_url(tab, url)?;
        self.emit(HostEvent::NavigationCompleted {
            tab,
            url: updated.url.clone(),
        });
        Some(updated)
    }

    /// In-page URL change that does not reload the document.
    pub fn push_state(&self, tab: TabId, url: impl Into<String>) -> Option<TabInfo> {
        self.set_url(tab, url)
    }

    fn set_url(&self, tab: TabId, url: impl Into<String>) -> Option<TabInfo> {
        let url = url.into();
        self.with_state(|state| {
            let entry = state.tabs.get_mut(&tab)?;
            entry.url = url;
            Some(entry.clone())
        })
    }

    pub fn activate(&self, tab: TabId) -> bool {
        self.with_state(|state| {
            if state.tabs.contains_key(&tab) {
                state.active = Some(tab);
                true
            } else {
                false
            }
        })
    }

    pub fn click_icon(&self) -> Option<TabInfo> {
        let tab = self.active_tab()?;
        self.emit(HostEvent::IconActivated(tab.clone()));
        Some(tab)
    }

    pub fn tab(&self, tab: TabId) -> Option<TabInfo> {
        self.with_state(|state| state.tabs.get(&tab).cloned())
    }

    pub fn panel_enabled(&self, tab: TabId) -> Option<bool> {
        self.with_state(|state| state.panel_enabled.get(&tab).copied())
    }

    pub fn opened_panels(&self) -> Vec<WindowId> {
        self.with_state(|state| state.opened_panels.clone())
    }
}

impl TabHost for SimulatedBrowser {
    fn active_tab(&self) -> Option<TabInfo> {
        self.with_state(|state| {
            state
                .active
                .and_then(|active| state.tabs.get(&active).cloned())
        })
    }

    fn set_panel_enabled(&self, tab: TabId, enabled: bool) {
        self.with_state(|state| {
            state.panel_enabled.insert(tab, enabled);
        });
    }

    fn open_panel(&self, window: WindowId) -> bool {
        self.with_state(|state| {
            state.opened_panels.push(window);
        });
        true
    }
}
