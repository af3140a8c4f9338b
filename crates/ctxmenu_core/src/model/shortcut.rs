//! Shortcut domain model.
//!
//! # Responsibility
//! - Define the canonical shortcut record stored in the catalog.
//! - Define the create (`ShortcutDraft`) and update (`ShortcutPatch`) inputs.
//! - Enforce name shape rules that do not depend on configuration.
//!
//! # Invariants
//! - `id` is assigned by the store and never reused for another shortcut.
//! - `applied_state` is only changed by the menu manager.
//! - A name is 1..=255 characters, free of path separators, wildcard and
//!   control characters, and never an OS reserved device name.

use crate::security::rules::is_reserved_device_name;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for one shortcut.
pub type ShortcutId = Uuid;

/// Maximum shortcut name length in characters.
pub const NAME_MAX_CHARS: usize = 255;

const NAME_FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Context-menu surface an entry attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Right-click on any file.
    File,
    /// Right-click on a folder.
    Folder,
    /// Right-click on the empty background of an open folder.
    Background,
    /// Right-click on a drive root.
    Drive,
    /// Right-click on any file-system object.
    All,
}

impl TargetType {
    /// Every target type in declaration order.
    pub const ALL: [TargetType; 5] = [
        TargetType::File,
        TargetType::Folder,
        TargetType::Background,
        TargetType::Drive,
        TargetType::All,
    ];

    /// Stable storage/wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
            Self::Background => "background",
            Self::Drive => "drive",
            Self::All => "all",
        }
    }

    /// Parses a storage/wire value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file" => Some(Self::File),
            "folder" => Some(Self::Folder),
            "background" => Some(Self::Background),
            "drive" => Some(Self::Drive),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl Display for TargetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shell menu generation an entry targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuStyle {
    /// Legacy full context menu.
    #[default]
    Classic,
    /// Compact top-level menu. Requires the capability query to agree.
    Modern,
}

impl MenuStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Modern => "modern",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "classic" => Some(Self::Classic),
            "modern" => Some(Self::Modern),
            _ => None,
        }
    }
}

impl Display for MenuStyle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry sync status, independent from store persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedState {
    /// Stored, never applied (or rolled back before being confirmed).
    Pending,
    /// Registry keys are present and confirmed.
    Applied,
    /// Last apply or removal failed; row kept for retry/inspection.
    Failed,
    /// Registry keys were removed on purpose.
    Removed,
}

impl AppliedState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Removed => "removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "applied" => Some(Self::Applied),
            "failed" => Some(Self::Failed),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

impl Display for AppliedState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical catalog record for one context-menu shortcut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutEntry {
    pub id: ShortcutId,
    /// Menu label shown by the shell.
    pub name: String,
    /// Invocation template, e.g. `notepad.exe "%1"`.
    pub command: String,
    pub icon_path: Option<String>,
    pub target_type: TargetType,
    pub menu_style: MenuStyle,
    pub enabled: bool,
    /// Epoch milliseconds.
    pub created_at_ms: i64,
    /// Epoch milliseconds.
    pub modified_at_ms: i64,
    pub applied_state: AppliedState,
    /// Number of confirmed registry applications.
    pub apply_count: u32,
}

impl ShortcutEntry {
    /// Returns the draft that would recreate this entry's user-editable fields.
    pub fn to_draft(&self) -> ShortcutDraft {
        ShortcutDraft {
            name: self.name.clone(),
            command: self.command.clone(),
            icon_path: self.icon_path.clone(),
            target_type: self.target_type,
            menu_style: self.menu_style,
            enabled: self.enabled,
        }
    }

    /// Merges a patch onto this entry's editable fields.
    pub fn patched(&self, patch: &ShortcutPatch) -> ShortcutDraft {
        let mut draft = self.to_draft();
        if let Some(name) = &patch.name {
            draft.name = name.clone();
        }
        if let Some(command) = &patch.command {
            draft.command = command.clone();
        }
        if let Some(icon_path) = &patch.icon_path {
            draft.icon_path = icon_path.clone();
        }
        if let Some(target_type) = patch.target_type {
            draft.target_type = target_type;
        }
        if let Some(menu_style) = patch.menu_style {
            draft.menu_style = menu_style;
        }
        if let Some(enabled) = patch.enabled {
            draft.enabled = enabled;
        }
        draft
    }

    /// Whether both versions map to the same registry menu key.
    pub fn same_registry_identity(&self, other: &ShortcutEntry) -> bool {
        self.target_type == other.target_type && self.name == other.name
    }
}

/// Input for creating a shortcut. The store assigns id, timestamps and state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutDraft {
    pub name: String,
    pub command: String,
    pub icon_path: Option<String>,
    pub target_type: TargetType,
    pub menu_style: MenuStyle,
    pub enabled: bool,
}

impl ShortcutDraft {
    /// Creates an enabled, classic-style draft without icon.
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        target_type: TargetType,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            icon_path: None,
            target_type,
            menu_style: MenuStyle::Classic,
            enabled: true,
        }
    }

    pub fn with_menu_style(mut self, menu_style: MenuStyle) -> Self {
        self.menu_style = menu_style;
        self
    }

    pub fn with_icon(mut self, icon_path: impl Into<String>) -> Self {
        self.icon_path = Some(icon_path.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Validates configuration-independent shape rules.
    ///
    /// Command safety is judged separately by `SecurityValidator`.
    pub fn validate(&self) -> Result<(), ShortcutValidationError> {
        check_name(&self.name)?;
        if self.command.trim().is_empty() {
            return Err(ShortcutValidationError::EmptyCommand);
        }
        Ok(())
    }
}

/// Partial update. `None` keeps the current value.
///
/// `icon_path: Some(None)` clears the icon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortcutPatch {
    pub name: Option<String>,
    pub command: Option<String>,
    pub icon_path: Option<Option<String>>,
    pub target_type: Option<TargetType>,
    pub menu_style: Option<MenuStyle>,
    pub enabled: Option<bool>,
}

impl ShortcutPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Model-level shape violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutValidationError {
    EmptyName,
    NameTooLong { chars: usize, max: usize },
    ForbiddenNameCharacter(char),
    ControlCharacterInName,
    ReservedName(String),
    EmptyCommand,
}

impl Display for ShortcutValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "name is empty"),
            Self::NameTooLong { chars, max } => {
                write!(f, "name is too long ({chars} characters, max {max})")
            }
            Self::ForbiddenNameCharacter(ch) => {
                write!(f, "name contains a forbidden character: {ch}")
            }
            Self::ControlCharacterInName => write!(f, "name contains a control character"),
            Self::ReservedName(name) => write!(f, "name is a reserved device name: {name}"),
            Self::EmptyCommand => write!(f, "command is empty"),
        }
    }
}

impl Error for ShortcutValidationError {}

/// Checks one shortcut name against shape rules.
pub fn check_name(name: &str) -> Result<(), ShortcutValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ShortcutValidationError::EmptyName);
    }

    let chars = name.chars().count();
    if chars > NAME_MAX_CHARS {
        return Err(ShortcutValidationError::NameTooLong {
            chars,
            max: NAME_MAX_CHARS,
        });
    }

    if let Some(ch) = name.chars().find(|ch| NAME_FORBIDDEN_CHARS.contains(ch)) {
        return Err(ShortcutValidationError::ForbiddenNameCharacter(ch));
    }

    if name.chars().any(char::is_control) {
        return Err(ShortcutValidationError::ControlCharacterInName);
    }

    if is_reserved_device_name(trimmed) {
        return Err(ShortcutValidationError::ReservedName(trimmed.to_string()));
    }

    Ok(())
}
