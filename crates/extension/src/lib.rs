#![deny(unsafe_code)]

/// Keeps the chat panel pointed at the video playing in the active tab.
///
/// Three contexts cooperate over a host message bus: a page observer per tab, one
/// coordinator, and the side panel.
pub mod coordinator;
/// Browser host abstractions and the in-process simulated browser.
pub mod host;
pub mod observer;
pub mod panel;
/// Settings persistence.
pub mod settings;

pub use coordinator::{Coordinator, CoordinatorHandle};
pub use host::{HostEvent, MessageBus, SimulatedBrowser, TabHost, TabInfo};
pub use observer::{ObserverHandle, PageEvent, PageObserver};
pub use panel::{PanelController, PanelHandle, PanelRuntime, PanelSnapshot};
pub use settings::{PanelSettings, SettingsError, SettingsStore};
