//! Writing a theme onto the document root.

use crate::color::hex_to_hsl;
use crate::settings::PlatformTheme;
use std::collections::BTreeMap;
use std::rc::Rc;
use sv_api_types::ColorMode;
use tracing::warn;

pub const THEME_APPLIED_ATTRIBUTE: &str = "data-theme-applied";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScheme {
    Light,
    Dark,
}

impl ColorScheme {
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

/// Document-level styling state (`<html>` classes, style variables, title).
pub trait DocumentSurface {
    /// Add the scheme's class and remove the other one.
    fn set_color_scheme(&self, scheme: ColorScheme);
    fn set_style_var(&self, name: &str, value: &str);
    fn set_title(&self, title: &str);
    fn mark_theme_applied(&self);
    /// OS-level `prefers-color-scheme: dark`, read at call time.
    fn prefers_dark(&self) -> bool;
    /// Returns `false` when the preference cannot be observed here.
    fn watch_color_scheme(&self, on_change: Rc<dyn Fn()>) -> bool;
    fn unwatch_color_scheme(&self);
}

/// Everything a theme resolves to, independent of where it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStyle {
    pub scheme: ColorScheme,
    pub vars: BTreeMap<&'static str, String>,
}

pub fn resolve_scheme(mode: ColorMode, prefers_dark: bool) -> ColorScheme {
    match mode {
        ColorMode::Dark => ColorScheme::Dark,
        ColorMode::Light => ColorScheme::Light,
        ColorMode::System if prefers_dark => ColorScheme::Dark,
        ColorMode::System => ColorScheme::Light,
    }
}

pub fn resolve_style(theme: &PlatformTheme, prefers_dark: bool) -> ResolvedStyle {
    let mut vars = BTreeMap::new();
    let colors = [
        ("--primary", &theme.primary_color),
        ("--success", &theme.success_color),
        ("--warning", &theme.warning_color),
        ("--danger", &theme.danger_color),
    ];
    for (name, hex) in colors {
        match hex_to_hsl(hex) {
            Ok(hsl) => {
                vars.insert(name, hsl.to_css());
            }
            Err(err) => warn!(var = name, "skipping style variable: {err}"),
        }
    }
    vars.insert("--radius", theme.border_radius.clone());

    ResolvedStyle {
        scheme: resolve_scheme(theme.mode, prefers_dark),
        vars,
    }
}

/// Apply a theme; `title` is only written when given.
pub fn apply_to_document(
    document: &dyn DocumentSurface,
    theme: &PlatformTheme,
    title: Option<&str>,
) -> ResolvedStyle {
    let style = resolve_style(theme, document.prefers_dark());
    document.set_color_scheme(style.scheme);
    for (name, value) in &style.vars {
        document.set_style_var(name, value);
    }
    if let Some(title) = title {
        document.set_title(title);
    }
    document.mark_theme_applied();
    style
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingDocument;
    use super::*;

    #[test]
    fn explicit_modes_ignore_os_preference() {
        assert_eq!(resolve_scheme(ColorMode::Dark, false), ColorScheme::Dark);
        assert_eq!(resolve_scheme(ColorMode::Light, true), ColorScheme::Light);
        assert_eq!(resolve_scheme(ColorMode::System, true), ColorScheme::Dark);
        assert_eq!(resolve_scheme(ColorMode::System, false), ColorScheme::Light);
    }

    #[test]
    fn writes_vars_class_title_and_marker() {
        let doc = RecordingDocument::default();
        let theme = PlatformTheme {
            primary_color: "#ff0000".into(),
            border_radius: "6px".into(),
            ..Default::default()
        };
        apply_to_document(&doc, &theme, Some("Acme - Invest"));

        assert_eq!(doc.scheme.get(), Some(ColorScheme::Light));
        assert_eq!(doc.var("--primary").as_deref(), Some("0 100% 50%"));
        assert_eq!(doc.var("--radius").as_deref(), Some("6px"));
        assert_eq!(doc.title.borrow().as_deref(), Some("Acme - Invest"));
        assert!(doc.applied.get());
    }

    #[test]
    fn invalid_color_leaves_previous_value() {
        let doc = RecordingDocument::default();
        apply_to_document(&doc, &PlatformTheme::default(), None);
        let before = doc.var("--warning");

        let broken = PlatformTheme {
            warning_color: "orange".into(),
            ..Default::default()
        };
        let style = apply_to_document(&doc, &broken, None);
        assert!(!style.vars.contains_key("--warning"));
        assert_eq!(doc.var("--warning"), before);
        assert_eq!(doc.title.borrow().as_deref(), None);
    }

    #[test]
    fn reapplying_is_idempotent() {
        let doc = RecordingDocument::default();
        let theme = PlatformTheme {
            mode: ColorMode::Dark,
            ..Default::default()
        };
        let first = apply_to_document(&doc, &theme, None);
        let vars = doc.vars.borrow().clone();
        let second = apply_to_document(&doc, &theme, None);
        assert_eq!(first, second);
        assert_eq!(*doc.vars.borrow(), vars);
    }
}
