//! Platform settings, theme application, and the cached startup sequence.

pub mod bootstrap;
pub mod color;
pub mod document;
pub mod settings;

pub use bootstrap::{RefreshOutcome, SettingsSource, ThemeBootstrap};
pub use color::{ColorError, Hsl, hex_to_hsl};
pub use document::{
    ColorScheme, DocumentSurface, ResolvedStyle, THEME_APPLIED_ATTRIBUTE, apply_to_document, resolve_style,
};
pub use settings::{PlatformSettings, PlatformTheme, ThemePatch, css_length};
