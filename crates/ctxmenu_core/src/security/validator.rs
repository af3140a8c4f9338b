//! Security validator for shortcut commands, names and icons.
//!
//! # Invariants
//! - Command checks run in a fixed order and the first failure wins:
//!   empty, length, control characters, network path, denylist, reserved
//!   device name, whitelist-or-existence.
//! - A missing executable is a rejection, never an error.
//! - Bare executable names are judged only by the whitelist; paths with a
//!   directory part are judged only by existence, so a trusted basename in
//!   an arbitrary directory is not trusted.

use super::probe::{FsProbe, PathProbe};
use super::rules::{is_reserved_device_name, matching_danger_rule, ICON_EXTENSIONS};
use crate::config::ValidatorConfig;
use crate::model::shortcut::check_name;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;
use std::sync::Arc;

static DRIVE_ABSOLUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]:[\\/]").expect("valid drive path regex"));
static ICON_INDEX_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?),\s*-?\d+$").expect("valid icon index regex"));

const LAUNCHABLE_EXTENSIONS: &[&str] = &[
    "exe", "com", "bat", "cmd", "ps1", "vbs", "js", "msi", "scr", "lnk",
];

/// Which check produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCheck {
    Empty,
    Length,
    ControlCharacter,
    NetworkPath,
    Denylist,
    ReservedName,
    Untrusted,
    Name,
    Icon,
}

/// Outcome of one validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub accepted: bool,
    /// Display-ready reason, present on rejection.
    pub reason: Option<String>,
    pub rejected_by: Option<ValidationCheck>,
}

impl Verdict {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
            rejected_by: None,
        }
    }

    pub fn reject(check: ValidationCheck, reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
            rejected_by: Some(check),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Converts a rejection into its reason string.
    pub fn into_result(self) -> Result<(), String> {
        if self.accepted {
            Ok(())
        } else {
            Err(self
                .reason
                .unwrap_or_else(|| "rejected by security validator".to_string()))
        }
    }
}

/// Raised only when input cannot be represented as a string at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorError {
    NotUtf8 { valid_up_to: usize },
}

impl Display for ValidatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotUtf8 { valid_up_to } => {
                write!(f, "command is not valid UTF-8 (valid up to byte {valid_up_to})")
            }
        }
    }
}

impl Error for ValidatorError {}

/// Stateless command judge with injected configuration.
///
/// Cloning is cheap; clones share configuration and probe.
#[derive(Clone)]
pub struct SecurityValidator {
    config: Arc<ValidatorConfig>,
    trusted: Arc<BTreeSet<String>>,
    probe: Arc<dyn PathProbe>,
}

impl Debug for SecurityValidator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityValidator")
            .field("config", &self.config)
            .field("probe", &self.probe)
            .finish()
    }
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl SecurityValidator {
    /// Creates a validator probing the real file system.
    pub fn new(config: ValidatorConfig) -> Self {
        Self::with_probe(config, Arc::new(FsProbe))
    }

    /// Creates a validator with a custom existence probe.
    pub fn with_probe(config: ValidatorConfig, probe: Arc<dyn PathProbe>) -> Self {
        let trusted = config
            .trusted_executables
            .iter()
            .map(|name| normalize_executable_name(name))
            .filter(|name| !name.is_empty())
            .collect();
        Self {
            config: Arc::new(config),
            trusted: Arc::new(trusted),
            probe,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Judges one command string.
    pub fn validate(&self, command: &str) -> Verdict {
        let verdict = self.judge_command(command);
        if let Some(check) = verdict.rejected_by {
            debug!(
                "event=command_validate module=security status=rejected check={:?} command_chars={}",
                check,
                command.chars().count()
            );
        }
        verdict
    }

    /// Judges raw bytes; errors only when the bytes are not UTF-8.
    pub fn validate_bytes(&self, raw: &[u8]) -> Result<Verdict, ValidatorError> {
        let command = std::str::from_utf8(raw).map_err(|err| ValidatorError::NotUtf8 {
            valid_up_to: err.valid_up_to(),
        })?;
        Ok(self.validate(command))
    }

    /// Judges a shortcut display name.
    pub fn validate_name(&self, name: &str) -> Verdict {
        match check_name(name) {
            Ok(()) => Verdict::accept(),
            Err(err) => Verdict::reject(ValidationCheck::Name, err.to_string()),
        }
    }

    /// Judges an optional icon path. Empty input is accepted.
    ///
    /// Accepts `path` or `path,<index>` pointing at an existing `.ico`,
    /// `.exe` or `.dll` no larger than the configured limit.
    pub fn validate_icon_path(&self, icon_path: &str) -> Verdict {
        let trimmed = icon_path.trim();
        if trimmed.is_empty() {
            return Verdict::accept();
        }

        let path_text = ICON_INDEX_SUFFIX_RE
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map_or(trimmed, |path| path.as_str())
            .trim_matches('"');

        if let Some(reason) = network_path_reason(path_text) {
            return Verdict::reject(ValidationCheck::Icon, reason);
        }

        let extension = extension_of(basename(path_text)).unwrap_or_default();
        if !ICON_EXTENSIONS.contains(&extension.as_str()) {
            return Verdict::reject(
                ValidationCheck::Icon,
                format!("unsupported icon file type: .{extension}"),
            );
        }

        match self.probe.file_len(Path::new(path_text)) {
            None => Verdict::reject(
                ValidationCheck::Icon,
                format!("icon file not found: {path_text}"),
            ),
            Some(len) if len > self.config.max_icon_size_bytes => Verdict::reject(
                ValidationCheck::Icon,
                format!(
                    "icon file is too large ({len} bytes, max {})",
                    self.config.max_icon_size_bytes
                ),
            ),
            Some(_) => Verdict::accept(),
        }
    }

    fn judge_command(&self, command: &str) -> Verdict {
        if command.trim().is_empty() {
            return Verdict::reject(ValidationCheck::Empty, "command is empty");
        }

        let chars = command.chars().count();
        if chars > self.config.max_command_length {
            return Verdict::reject(
                ValidationCheck::Length,
                format!(
                    "command is too long ({chars} characters, max {})",
                    self.config.max_command_length
                ),
            );
        }

        if command.contains('\0') {
            return Verdict::reject(ValidationCheck::ControlCharacter, "command contains a NUL byte");
        }
        if let Some(ch) = command
            .chars()
            .find(|ch| ch.is_control() && !ch.is_whitespace())
        {
            return Verdict::reject(
                ValidationCheck::ControlCharacter,
                format!("command contains control character U+{:04X}", u32::from(ch)),
            );
        }

        let executable = executable_token(command);
        if let Some(reason) = network_path_reason(executable) {
            return Verdict::reject(ValidationCheck::NetworkPath, reason);
        }
        if let Some(reason) = argument_tokens(command)
            .filter(|token| is_launchable(token))
            .find_map(network_path_reason)
        {
            return Verdict::reject(ValidationCheck::NetworkPath, reason);
        }

        if let Some(rule) = matching_danger_rule(command) {
            return Verdict::reject(
                ValidationCheck::Denylist,
                format!("matches destructive pattern: {}", rule.reason),
            );
        }

        let executable_name = basename(executable);
        let stem = stem_of(executable_name);
        if is_reserved_device_name(stem) {
            return Verdict::reject(
                ValidationCheck::ReservedName,
                format!(
                    "executable name is a reserved device name: {}",
                    stem.to_ascii_uppercase()
                ),
            );
        }

        self.judge_trust(executable)
    }

    fn judge_trust(&self, executable: &str) -> Verdict {
        let has_directory = executable.contains(['\\', '/']);
        if !has_directory {
            let normalized = normalize_executable_name(executable);
            if self.trusted.contains(&normalized) {
                return Verdict::accept();
            }
            return Verdict::reject(
                ValidationCheck::Untrusted,
                format!("executable is not in the trusted whitelist: {normalized}"),
            );
        }

        if !is_absolute_path(executable) {
            return Verdict::reject(
                ValidationCheck::Untrusted,
                format!("relative executable paths are not allowed: {executable}"),
            );
        }

        if self.probe.exists(Path::new(executable)) {
            Verdict::accept()
        } else {
            Verdict::reject(
                ValidationCheck::Untrusted,
                format!("executable not found: {executable}"),
            )
        }
    }
}

/// Extracts the executable token: the quoted prefix, or the first word.
fn executable_token(command: &str) -> &str {
    let trimmed = command.trim_start();
    match trimmed.strip_prefix('"') {
        Some(rest) => rest.find('"').map_or(rest, |end| &rest[..end]),
        None => trimmed.split_whitespace().next().unwrap_or(""),
    }
}

/// Tokens after the executable, with surrounding quotes removed.
fn argument_tokens(command: &str) -> impl Iterator<Item = &str> {
    command
        .split_whitespace()
        .skip(1)
        .map(|token| token.trim_matches('"'))
}

fn network_path_reason(path: &str) -> Option<String> {
    let mut chars = path.chars();
    let first_two_are_separators = matches!(
        (chars.next(), chars.next()),
        (Some('\\' | '/'), Some('\\' | '/'))
    );
    if !first_two_are_separators {
        return None;
    }

    let rest = &path[2..];
    let rest_upper = rest.to_ascii_uppercase();
    if rest_upper.starts_with("?\\UNC\\") {
        return Some(format!("network path is not allowed: {path}"));
    }
    if rest.starts_with("?\\") {
        // Extended-length local path, e.g. \\?\C:\tools\app.exe.
        return None;
    }
    if rest.starts_with(".\\") || rest.starts_with("./") {
        return Some(format!("device namespace path is not allowed: {path}"));
    }
    let host = rest.split(['\\', '/']).next().unwrap_or("");
    if host.is_empty() {
        return None;
    }
    Some(format!("network path is not allowed: {path}"))
}

fn is_absolute_path(path: &str) -> bool {
    DRIVE_ABSOLUTE_RE.is_match(path) || path.starts_with("\\\\?\\") || Path::new(path).is_absolute()
}

fn is_launchable(token: &str) -> bool {
    extension_of(basename(token))
        .map(|extension| LAUNCHABLE_EXTENSIONS.contains(&extension.as_str()))
        .unwrap_or(false)
}

fn basename(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

fn stem_of(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(index) if index > 0 => &file_name[..index],
        _ => file_name,
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    match file_name.rfind('.') {
        Some(index) if index > 0 && index + 1 < file_name.len() => {
            Some(file_name[index + 1..].to_ascii_lowercase())
        }
        _ => None,
    }
}

/// Lowercases and appends `.exe` when no extension is present.
fn normalize_executable_name(name: &str) -> String {
    let lowered = basename(name.trim()).to_ascii_lowercase();
    if lowered.is_empty() || extension_of(&lowered).is_some() {
        lowered
    } else {
        format!("{lowered}.exe")
    }
}
