use vidchat_protocol::VideoId;

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the panel conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    role: Role,
    text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Identifier of one displayed banner.
///
/// A dismissal timer only removes the banner it was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BannerId(pub u64);

impl BannerId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Transient error notice shown above the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub id: BannerId,
    pub message: String,
}

/// Whether the panel knows which video it is about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PanelPhase {
    #[default]
    Uninitialized,
    Active(VideoId),
}

impl PanelPhase {
    pub fn video_id(&self) -> Option<&VideoId> {
        match self {
            Self::Uninitialized => None,
            Self::Active(video_id) => Some(video_id),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Render-ready view of the panel state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelSnapshot {
    pub phase: PanelPhase,
    pub turns: Vec<ChatTurn>,
    pub banner: Option<Banner>,
    /// True while at least one answer is in flight.
    pub loading: bool,
    /// Submissions that reached a final outcome since the panel attached.
    pub completed_submissions: u64,
}
