//! Side panel: conversation state and the task that drives it.

mod controller;
mod model;
mod runtime;

pub use controller::{
    BACKEND_UNREACHABLE_MESSAGE, NO_VIDEO_MESSAGE, PanelController, PanelTexts, SubmitOutcome,
    SubmitRejection, TRANSCRIPT_UNAVAILABLE_MESSAGE, failure_banner,
};
pub use model::{Banner, BannerId, ChatTurn, PanelPhase, PanelSnapshot, Role};
pub use runtime::{PanelHandle, PanelRuntime};
