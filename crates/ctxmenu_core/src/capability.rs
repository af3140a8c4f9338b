//! Host capability query consulted before applying modern-style entries.
//!
//! The answer is a trusted external fact supplied by the embedding
//! application; nothing here probes the OS.

use crate::model::shortcut::MenuStyle;

/// Host shell capabilities.
pub trait MenuCapabilities {
    /// Whether the host shell can show `MenuStyle::Modern` entries.
    fn supports_modern_menu_style(&self) -> bool;

    /// Whether entries of `style` may be applied on this host.
    fn supports(&self, style: MenuStyle) -> bool {
        match style {
            MenuStyle::Classic => true,
            MenuStyle::Modern => self.supports_modern_menu_style(),
        }
    }
}

/// Fixed capability answer, usually taken from `AppConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StaticCapabilities {
    pub modern_menu_style: bool,
}

impl StaticCapabilities {
    pub fn new(modern_menu_style: bool) -> Self {
        Self { modern_menu_style }
    }
}

impl MenuCapabilities for StaticCapabilities {
    fn supports_modern_menu_style(&self) -> bool {
        self.modern_menu_style
    }
}
