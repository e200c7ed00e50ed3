use std::fmt;

use thiserror::Error;

/// Object classes a handle or registry id can fail to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Player,
    Creature,
    Item,
    Thing,
    Tile,
    House,
    Combat,
    Condition,
    Area,
    Container,
    Variant,
    Depot,
    Guild,
}

impl NotFoundKind {
    pub fn describe(self) -> &'static str {
        match self {
            NotFoundKind::Player => "Player not found",
            NotFoundKind::Creature => "Creature not found",
            NotFoundKind::Item => "Item not found",
            NotFoundKind::Thing => "Thing not found",
            NotFoundKind::Tile => "Tile not found",
            NotFoundKind::House => "House not found",
            NotFoundKind::Combat => "Combat not found",
            NotFoundKind::Condition => "Condition not found",
            NotFoundKind::Area => "Area not found",
            NotFoundKind::Container => "Container not found",
            NotFoundKind::Variant => "Variant not found",
            NotFoundKind::Depot => "Depot not found",
            NotFoundKind::Guild => "Guild not found",
        }
    }
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Failures produced at the script/native boundary.
///
/// `NotFound` and `InvalidArgument` are script-author mistakes and are recovered into a status code.
/// `InterfaceFault` and `LoadFault` point at binding or content defects; they are reported the same
/// way and never stop the host.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("{0}")]
    NotFound(NotFoundKind),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    InterfaceFault(String),

    #[error("{unit}: {message}")]
    LoadFault { unit: String, message: String },

    /// The script itself raised while running an entry point.
    #[error("{0}")]
    Runtime(String),
}

impl ScriptError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ScriptError::InvalidArgument(message.into())
    }

    pub fn interface(message: impl Into<String>) -> Self {
        ScriptError::InterfaceFault(message.into())
    }

    pub fn load(unit: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptError::LoadFault { unit: unit.into(), message: message.into() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(message.into())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, ScriptError::NotFound(_) | ScriptError::InvalidArgument(_))
    }
}

impl From<NotFoundKind> for ScriptError {
    fn from(kind: NotFoundKind) -> Self {
        ScriptError::NotFound(kind)
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;
