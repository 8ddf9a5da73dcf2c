use vidchat_answer::{AnswerError, AnswerResult, AnswerService, ChatRequest, FailureCategory};
use vidchat_protocol::VideoId;

use super::model::{Banner, BannerId, ChatTurn, PanelPhase, PanelSnapshot};
use crate::settings::{DEFAULT_APOLOGY, DEFAULT_GREETING};

pub const NO_VIDEO_MESSAGE: &str = "Please navigate to a YouTube video first.";
pub const TRANSCRIPT_UNAVAILABLE_MESSAGE: &str = "Unable to fetch transcript. The video may be private, have transcripts disabled, or be a live stream.";
pub const BACKEND_UNREACHABLE_MESSAGE: &str =
    "Cannot connect to the backend. Make sure the API server is running.";

/// Fixed texts the panel shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelTexts {
    pub greeting: String,
    pub apology: String,
    pub no_video: String,
}

impl Default for PanelTexts {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            apology: DEFAULT_APOLOGY.to_string(),
            no_video: NO_VIDEO_MESSAGE.to_string(),
        }
    }
}

/// Why a submission never reached the answering service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    EmptyInput,
    NoVideo { banner: BannerId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Answered,
    Failed { banner: BannerId },
    Rejected(SubmitRejection),
}

/// User-facing banner text for a failed answer.
pub fn failure_banner(error: &AnswerError) -> String {
    match error.category() {
        FailureCategory::ContentUnavailable => TRANSCRIPT_UNAVAILABLE_MESSAGE.to_string(),
        FailureCategory::BackendUnreachable => BACKEND_UNREACHABLE_MESSAGE.to_string(),
        FailureCategory::Other => format!("Error: {}", error.detail()),
    }
}

/// Panel state machine: phase, conversation, banner.
///
/// Submission is split in two halves so a driver can keep handling events while the
/// answer is outstanding: [`PanelController::begin_submit`] validates input and records
/// the user turn, [`PanelController::finish_submit`] applies the service result.
#[derive(Debug)]
pub struct PanelController {
    texts: PanelTexts,
    phase: PanelPhase,
    turns: Vec<ChatTurn>,
    banner: Option<Banner>,
    next_banner_id: u64,
    in_flight: usize,
    completed_submissions: u64,
}

impl PanelController {
    pub fn new(texts: PanelTexts) -> Self {
        Self {
            texts,
            phase: PanelPhase::Uninitialized,
            turns: Vec::new(),
            banner: None,
            next_banner_id: 1,
            in_flight: 0,
            completed_submissions: 0,
        }
    }

    pub fn phase(&self) -> &PanelPhase {
        &self.phase
    }

    pub fn video_id(&self) -> Option<&VideoId> {
        self.phase.video_id()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// Adopts `video_id`, resetting the conversation to the greeting.
    ///
    /// Returns false (and changes nothing) when it is already the current identifier.
    pub fn accept_video_id(&mut self, video_id: VideoId) -> bool {
        if self.phase.video_id() == Some(&video_id) {
            return false;
        }

        tracing::info!(
            video_id = %video_id,
            previous = ?self.phase.video_id().map(VideoId::as_str),
            "panel switched video"
        );
        self.phase = PanelPhase::Active(video_id);
        self.reseed();
        true
    }

    /// Empties the conversation; an active panel keeps its identifier and greeting.
    pub fn clear_chat(&mut self) {
        if self.phase.is_active() {
            self.reseed();
        } else {
            self.turns.clear();
        }
    }

    fn reseed(&mut self) {
        self.turns.clear();
        self.turns.push(ChatTurn::assistant(self.texts.greeting.clone()));
    }

    pub fn begin_submit(&mut self, input: &str) -> Result<ChatRequest, SubmitRejection> {
        let query = input.trim();
        if query.is_empty() {
            self.completed_submissions += 1;
            return Err(SubmitRejection::EmptyInput);
        }

        let Some(video_id) = self.phase.video_id().cloned() else {
            let banner = self.show_banner(self.texts.no_video.clone());
            self.completed_submissions += 1;
            return Err(SubmitRejection::NoVideo { banner });
        };

        self.banner = None;
        self.turns.push(ChatTurn::user(query));
        self.in_flight += 1;
        tracing::debug!(video_id = %video_id, "submitting question");

        Ok(ChatRequest::new(video_id, query))
    }

    /// Applies the outcome of a request produced by `begin_submit` for `asked_for`.
    ///
    /// Returns the banner shown on failure.
    pub fn finish_submit(
        &mut self,
        asked_for: &VideoId,
        result: AnswerResult<String>,
    ) -> Option<BannerId> {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.completed_submissions += 1;

        if self.phase.video_id() != Some(asked_for) {
            tracing::debug!(
                asked_for = %asked_for,
                current = ?self.phase.video_id().map(VideoId::as_str),
                "applying answer for a previous video"
            );
        }

        match result {
            Ok(answer) => {
                self.turns.push(ChatTurn::assistant(answer));
                None
            }
            Err(error) => {
                tracing::warn!(video_id = %asked_for, error = %error, "question failed");
                let banner = self.show_banner(failure_banner(&error));
                self.turns.push(ChatTurn::assistant(self.texts.apology.clone()));
                Some(banner)
            }
        }
    }

    /// Runs a whole submission inline, waiting for the answer.
    pub async fn submit(&mut self, input: &str, service: &dyn AnswerService) -> SubmitOutcome {
        let request = match self.begin_submit(input) {
            Ok(request) => request,
            Err(rejection) => return SubmitOutcome::Rejected(rejection),
        };

        let asked_for = request.video_id.clone();
        let result = service.ask(request).await;
        match self.finish_submit(&asked_for, result) {
            Some(banner) => SubmitOutcome::Failed { banner },
            None => SubmitOutcome::Answered,
        }
    }

    pub fn show_banner(&mut self, message: impl Into<String>) -> BannerId {
        let id = BannerId::new(self.next_banner_id);
        self.next_banner_id += 1;
        self.banner = Some(Banner {
            id,
            message: message.into(),
        });
        id
    }

    /// Hides the banner if it is still the one identified by `id`.
    pub fn dismiss_banner(&mut self, id: BannerId) -> bool {
        if self.banner.as_ref().is_some_and(|banner| banner.id == id) {
            self.banner = None;
            return true;
        }
        false
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        PanelSnapshot {
            phase: self.phase.clone(),
            turns: self.turns.clone(),
            banner: self.banner.clone(),
            loading: self.is_loading(),
            completed_submissions: self.completed_submissions,
        }
    }
}

impl Default for PanelController {
    fn default() -> Self {
        Self::new(PanelTexts::default())
    }
}
