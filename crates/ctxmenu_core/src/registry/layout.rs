//! Where shortcuts live in the registry and how they are written.
//!
//! One entry maps to `Software\Classes\{class}\shell\{name}`:
//!
//! ```text
//! {menu}            (default) = name
//!                   CtxMenuOwner = entry id
//!                   CtxMenuStyle = classic | modern
//!                   Icon = icon path            (optional)
//! {menu}\command    (default) = command
//! ```
//!
//! Writes are staged in exactly that order so a compensating rollback can
//! walk them backwards.

use super::RegistryPath;
use crate::model::shortcut::{MenuStyle, ShortcutEntry, ShortcutId, TargetType};

/// Root of per-user class registrations.
pub const CLASSES_ROOT: &str = "Software\\Classes";
/// Value naming the entry that owns a menu key.
pub const OWNER_VALUE_NAME: &str = "CtxMenuOwner";
pub const STYLE_VALUE_NAME: &str = "CtxMenuStyle";
pub const ICON_VALUE_NAME: &str = "Icon";
pub const COMMAND_SUBKEY: &str = "command";
/// Default value of a key.
pub const DEFAULT_VALUE_NAME: &str = "";

/// Registry class that hosts menus for `target`.
pub fn target_class(target: TargetType) -> &'static str {
    match target {
        TargetType::File => "*",
        TargetType::Folder => "Directory",
        TargetType::Background => "Directory\\Background",
        TargetType::Drive => "Drive",
        TargetType::All => "AllFilesystemObjects",
    }
}

/// `shell` key under which all menus for `target` are listed.
pub fn shell_root(target: TargetType) -> RegistryPath {
    RegistryPath::new(CLASSES_ROOT)
        .join(target_class(target))
        .join("shell")
}

pub fn menu_key(target: TargetType, name: &str) -> RegistryPath {
    shell_root(target).join(name)
}

pub fn entry_menu_key(entry: &ShortcutEntry) -> RegistryPath {
    menu_key(entry.target_type, &entry.name)
}

pub fn command_key(menu: &RegistryPath) -> RegistryPath {
    menu.join(COMMAND_SUBKEY)
}

/// One pending value write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWrite {
    pub path: RegistryPath,
    pub name: &'static str,
    pub value: String,
}

/// Ordered writes that materialize one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    pub menu_key: RegistryPath,
    pub writes: Vec<StagedWrite>,
}

/// Builds the write list for `entry`.
pub fn stage(entry: &ShortcutEntry) -> StagedEntry {
    let menu = entry_menu_key(entry);
    let command = command_key(&menu);
    let mut writes = vec![
        StagedWrite {
            path: menu.clone(),
            name: DEFAULT_VALUE_NAME,
            value: entry.name.clone(),
        },
        StagedWrite {
            path: menu.clone(),
            name: OWNER_VALUE_NAME,
            value: entry.id.to_string(),
        },
        StagedWrite {
            path: menu.clone(),
            name: STYLE_VALUE_NAME,
            value: entry.menu_style.as_str().to_string(),
        },
    ];
    if let Some(icon) = entry.icon_path.as_deref().filter(|icon| !icon.trim().is_empty()) {
        writes.push(StagedWrite {
            path: menu.clone(),
            name: ICON_VALUE_NAME,
            value: icon.to_string(),
        });
    }
    writes.push(StagedWrite {
        path: command,
        name: DEFAULT_VALUE_NAME,
        value: entry.command.clone(),
    });

    StagedEntry {
        menu_key: menu,
        writes,
    }
}

/// Parses an owner marker value.
pub fn parse_owner(value: &str) -> Option<ShortcutId> {
    ShortcutId::parse_str(value.trim()).ok()
}

/// Parses a style marker value, treating unknown values as classic.
pub fn parse_style(value: &str) -> MenuStyle {
    MenuStyle::parse(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shortcut::AppliedState;
    use uuid::Uuid;

    fn entry(target_type: TargetType, icon_path: Option<&str>) -> ShortcutEntry {
        ShortcutEntry {
            id: Uuid::new_v4(),
            name: "Open with Code".to_string(),
            command: "code \"%1\"".to_string(),
            icon_path: icon_path.map(str::to_string),
            target_type,
            menu_style: MenuStyle::Classic,
            enabled: true,
            created_at_ms: 0,
            modified_at_ms: 0,
            applied_state: AppliedState::Pending,
            apply_count: 0,
        }
    }

    #[test]
    fn each_target_maps_to_its_class() {
        assert_eq!(
            shell_root(TargetType::File).as_str(),
            "Software\\Classes\\*\\shell"
        );
        assert_eq!(
            shell_root(TargetType::Background).as_str(),
            "Software\\Classes\\Directory\\Background\\shell"
        );
        assert_eq!(
            shell_root(TargetType::All).as_str(),
            "Software\\Classes\\AllFilesystemObjects\\shell"
        );
    }

    #[test]
    fn stage_writes_label_marker_then_command() {
        let entry = entry(TargetType::Folder, None);
        let staged = stage(&entry);

        let names: Vec<&str> = staged.writes.iter().map(|write| write.name).collect();
        assert_eq!(names, vec!["", OWNER_VALUE_NAME, STYLE_VALUE_NAME, ""]);
        assert_eq!(staged.writes[0].value, "Open with Code");
        assert_eq!(staged.writes[1].value, entry.id.to_string());
        assert_eq!(
            staged.writes[3].path.as_str(),
            "Software\\Classes\\Directory\\shell\\Open with Code\\command"
        );
    }

    #[test]
    fn stage_includes_icon_before_command() {
        let staged = stage(&entry(TargetType::File, Some("C:\\icons\\code.ico")));
        assert_eq!(staged.writes.len(), 5);
        assert_eq!(staged.writes[3].name, ICON_VALUE_NAME);
        assert_eq!(staged.writes[4].path.leaf(), COMMAND_SUBKEY);
    }

    #[test]
    fn parse_owner_rejects_garbage() {
        assert!(parse_owner("not-a-uuid").is_none());
        let id = Uuid::new_v4();
        assert_eq!(parse_owner(&id.to_string()), Some(id));
    }
}
