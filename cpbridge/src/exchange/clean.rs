//! Pipeline cleaning exchange.
//!
//! Request: `[clean-pipeline-request-1][pipeline][json array of module names]`.
//! Reply: `[clean-pipeline-reply-1][cleaned pipeline]`.

use std::ops::{BitOr, BitOrAssign};

use crate::bridge::{Envelope, Exchange, SessionId};
use crate::error::Result;

/// Categories of modules a host cannot run through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CleanFlags(u8);

impl CleanFlags {
    pub const NONE: Self = Self(0);
    pub const EXPORT_TO_DATABASE: Self = Self(1);
    pub const EXPORT_TO_SPREADSHEET: Self = Self(1 << 1);
    pub const EXPORT_MODULES: Self =
        Self(Self::EXPORT_TO_DATABASE.0 | Self::EXPORT_TO_SPREADSHEET.0);
    pub const SAVE_IMAGES: Self = Self(1 << 2);
    pub const ALL: Self = Self(Self::EXPORT_MODULES.0 | Self::SAVE_IMAGES.0);

    const MODULES: [(Self, &'static str); 3] = [
        (Self::EXPORT_TO_DATABASE, "ExportToDatabase"),
        (Self::EXPORT_TO_SPREADSHEET, "ExportToSpreadsheet"),
        (Self::SAVE_IMAGES, "SaveImages"),
    ];

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Module names selected by these flags.
    pub fn module_names(self) -> Vec<String> {
        Self::MODULES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| name.to_string())
            .collect()
    }
}

impl BitOr for CleanFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CleanFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

pub fn request(session: &SessionId, pipeline: &str, modules: &[String]) -> Result<Envelope> {
    let mut env = Envelope::request(session, Exchange::CleanPipeline);
    env.push_text(pipeline).push_text(serde_json::to_string(modules)?);
    Ok(env)
}

pub fn parse_reply(mut reply: Envelope) -> Result<String> {
    reply.next_text("pipeline")
}
