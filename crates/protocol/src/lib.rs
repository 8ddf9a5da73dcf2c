#![deny(unsafe_code)]

//! Shared vocabulary for the page observer, coordinator and panel contexts.

pub mod envelope;
pub mod error;
pub mod ids;
pub mod transport;
/// Canonical video identifiers and URL extraction.
pub mod video_id;

pub use envelope::{Envelope, Reply};
pub use error::{ProtocolError, ProtocolResult};
pub use ids::{Origin, TabId, WindowId};
pub use transport::{Delivery, Inbound, Inbox, Mailbox, PageChannel};
pub use video_id::{SHORT_LINK_MARKER, VideoId, WATCH_PAGE_MARKER, extract_video_id, is_eligible};
