use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::error::{InvalidHandleSnafu, ProtocolError, ProtocolResult};

// Host handles are plain integers handed out by the browser; wrapping them keeps tabs and
// windows from being mixed up at call sites.
macro_rules! define_host_handle {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub fn parse(raw: &str) -> ProtocolResult<Self> {
                let parsed = raw.trim().parse::<u64>().context(InvalidHandleSnafu {
                    stage: "parse-host-handle",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }

            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(raw: &str) -> ProtocolResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_host_handle!(TabId, "tab-id");
define_host_handle!(WindowId, "window-id");

/// Sender metadata attached by the host to messages that originate in a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Origin {
    pub tab: TabId,
    pub window: WindowId,
}

impl Origin {
    pub const fn new(tab: TabId, window: WindowId) -> Self {
        Self { tab, window }
    }
}
