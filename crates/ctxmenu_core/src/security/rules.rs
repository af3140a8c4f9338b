//! Fixed security rule tables.
//!
//! # Invariants
//! - The denylist is a closed table of `{signature, reason}` pairs; adding a
//!   rule never touches validator control flow.
//! - Signatures are matched case-insensitively and `.` spans newlines.

use once_cell::sync::Lazy;
use regex::Regex;

/// One destructive-operation signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DangerRule {
    /// Regex source, compiled with `(?is)`.
    pub signature: &'static str,
    /// Human-readable category used in rejection reasons.
    pub reason: &'static str,
}

pub const DANGER_RULES: &[DangerRule] = &[
    DangerRule {
        signature: r"\b(?:rd|rmdir|del|erase)\b.*\s/s\b",
        reason: "recursive delete",
    },
    DangerRule {
        signature: r"\brm\s+(?:-[a-z]*r[a-z]*|--recursive)\b",
        reason: "recursive delete",
    },
    DangerRule {
        signature: r"\bremove-item\b.*\s-recurse\b",
        reason: "recursive delete",
    },
    DangerRule {
        signature: r#"\b(?:del|erase|rd|rmdir)\s+(?:/[a-z]\s+)*"?[a-z]:[\\/]"#,
        reason: "drive-level delete",
    },
    DangerRule {
        signature: r#"\bformat(?:\.com)?\s+"?[a-z]:"#,
        reason: "filesystem format",
    },
    DangerRule {
        signature: r"\bdiskpart\b",
        reason: "disk partitioning",
    },
    DangerRule {
        signature: r"\bcipher(?:\.exe)?\s+/w",
        reason: "free-space wipe",
    },
    DangerRule {
        signature: r"\b(?:shutdown|restart|stop-computer)\b",
        reason: "shutdown/restart",
    },
    DangerRule {
        signature: r"\breg(?:\.exe)?\s+delete\b",
        reason: "registry deletion",
    },
    DangerRule {
        signature: r"\bremove-item(?:property)?\b.*\bhk(?:lm|cu|cr|u|cc):",
        reason: "registry deletion",
    },
    DangerRule {
        signature: r"\b(?:runas|psexec(?:64)?|gsudo|sudo)(?:\.exe)?\b",
        reason: "privilege escalation shim",
    },
    DangerRule {
        signature: r"\btaskkill(?:\.exe)?\b.*\s/f\b",
        reason: "forced process termination",
    },
    DangerRule {
        signature: r"\b(?:powershell|pwsh)(?:\.exe)?\b.*\s-(?:encodedcommand|enc|ec)\b",
        reason: "encoded PowerShell command",
    },
    DangerRule {
        signature: r"\b(?:powershell|pwsh)(?:\.exe)?\b.*\s-(?:command|c)\b.*\bremove-",
        reason: "PowerShell removal command",
    },
    DangerRule {
        signature: r"\bnet(?:\.exe)?\s+(?:user|localgroup)\b.*\s/delete\b",
        reason: "account deletion",
    },
    DangerRule {
        signature: r"\bwmic(?:\.exe)?\b.*\bdelete\b",
        reason: "WMI deletion",
    },
    DangerRule {
        signature: r"\bbcdedit(?:\.exe)?\b",
        reason: "boot configuration change",
    },
    DangerRule {
        signature: r"\bvssadmin(?:\.exe)?\b.*\bdelete\b",
        reason: "shadow copy deletion",
    },
];

static COMPILED_DANGER_RULES: Lazy<Vec<(Regex, &'static DangerRule)>> = Lazy::new(|| {
    DANGER_RULES
        .iter()
        .map(|rule| {
            let regex = Regex::new(&format!("(?is){}", rule.signature))
                .expect("danger rule signatures are static and valid");
            (regex, rule)
        })
        .collect()
});

/// Returns the first denylist rule matching `command`, in table order.
pub fn matching_danger_rule(command: &str) -> Option<&'static DangerRule> {
    COMPILED_DANGER_RULES
        .iter()
        .find(|(regex, _)| regex.is_match(command))
        .map(|(_, rule)| *rule)
}

/// OS device names that cannot be used as file or executable names.
pub const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Case-insensitive reserved device name check.
pub fn is_reserved_device_name(value: &str) -> bool {
    let upper = value.trim().to_ascii_uppercase();
    RESERVED_DEVICE_NAMES.contains(&upper.as_str())
}

/// Icon container extensions accepted for menu icons.
pub const ICON_EXTENSIONS: &[&str] = &["ico", "exe", "dll"];
