//! Platform settings with hardcoded defaults for every field.

use crate::color::hex_to_hsl;
use serde::{Deserialize, Serialize};
use sv_api_types::{ColorMode, CurrencyPosition, PublicSettings};
use tracing::warn;

pub const DEFAULT_PLATFORM_NAME: &str = "ShareVest";
pub const DEFAULT_TAGLINE: &str = "Invest in shares, track your profits";

/// Theme and currency attributes: exactly what is cached between visits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformTheme {
    pub mode: ColorMode,
    pub primary_color: String,
    pub success_color: String,
    pub warning_color: String,
    pub danger_color: String,
    pub border_radius: String,
    pub currency_code: String,
    pub currency_symbol: String,
    pub currency_position: CurrencyPosition,
}

impl Default for PlatformTheme {
    fn default() -> Self {
        Self {
            mode: ColorMode::Light,
            primary_color: "#2563eb".to_owned(),
            success_color: "#16a34a".to_owned(),
            warning_color: "#f59e0b".to_owned(),
            danger_color: "#dc2626".to_owned(),
            border_radius: "0.5rem".to_owned(),
            currency_code: "NGN".to_owned(),
            currency_symbol: "₦".to_owned(),
            currency_position: CurrencyPosition::Before,
        }
    }
}

impl PlatformTheme {
    /// Format an amount with two decimals, thousands separators, and the
    /// configured symbol placement.
    pub fn format_currency(&self, amount: f64) -> String {
        let negative = amount < 0.0;
        let fixed = format!("{:.2}", amount.abs());
        let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, digit) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(digit);
        }

        let sign = if negative { "-" } else { "" };
        match self.currency_position {
            CurrencyPosition::Before => format!("{sign}{}{grouped}.{cents}", self.currency_symbol),
            CurrencyPosition::After => format!("{sign}{grouped}.{cents} {}", self.currency_symbol),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub platform_name: String,
    pub platform_tagline: Option<String>,
    pub theme: PlatformTheme,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            platform_name: DEFAULT_PLATFORM_NAME.to_owned(),
            platform_tagline: None,
            theme: PlatformTheme::default(),
        }
    }
}

impl PlatformSettings {
    /// Overlay fetched values on the defaults. Colors that do not parse keep
    /// the default.
    pub fn from_public(public: &PublicSettings) -> Self {
        let mut settings = Self::default();
        let theme = &mut settings.theme;

        if let Some(name) = &public.platform_name {
            settings.platform_name = name.clone();
        }
        settings.platform_tagline = public.platform_tagline.clone();

        overlay_color(&mut theme.primary_color, public.primary_color.as_deref(), "primary_color");
        overlay_color(&mut theme.success_color, public.success_color.as_deref(), "success_color");
        overlay_color(&mut theme.warning_color, public.warning_color.as_deref(), "warning_color");
        overlay_color(&mut theme.danger_color, public.danger_color.as_deref(), "danger_color");

        if let Some(radius) = public.border_radius.as_deref() {
            theme.border_radius = css_length(radius);
        }
        if let Some(code) = &public.currency_code {
            theme.currency_code = code.to_ascii_uppercase();
        }
        if let Some(symbol) = &public.currency_symbol {
            theme.currency_symbol = symbol.clone();
        }
        if let Some(position) = public.currency_position.as_deref().and_then(CurrencyPosition::parse) {
            theme.currency_position = position;
        }
        if let Some(mode) = public.theme_mode.as_deref().and_then(ColorMode::parse) {
            theme.mode = mode;
        }
        settings
    }

    pub fn document_title(&self) -> String {
        let tagline = self
            .platform_tagline
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TAGLINE);
        format!("{} - {}", self.platform_name, tagline)
    }

    pub fn apply_patch(&mut self, patch: &ThemePatch) {
        let theme = &mut self.theme;
        if let Some(name) = &patch.platform_name {
            self.platform_name = name.clone();
        }
        if let Some(tagline) = &patch.platform_tagline {
            self.platform_tagline = Some(tagline.clone());
        }
        if let Some(mode) = patch.mode {
            theme.mode = mode;
        }
        overlay_color(&mut theme.primary_color, patch.primary_color.as_deref(), "primary_color");
        overlay_color(&mut theme.success_color, patch.success_color.as_deref(), "success_color");
        overlay_color(&mut theme.warning_color, patch.warning_color.as_deref(), "warning_color");
        overlay_color(&mut theme.danger_color, patch.danger_color.as_deref(), "danger_color");
        if let Some(radius) = patch.border_radius.as_deref() {
            theme.border_radius = css_length(radius);
        }
        if let Some(code) = &patch.currency_code {
            theme.currency_code = code.to_ascii_uppercase();
        }
        if let Some(symbol) = &patch.currency_symbol {
            theme.currency_symbol = symbol.clone();
        }
        if let Some(position) = patch.currency_position {
            theme.currency_position = position;
        }
    }
}

/// Partial update, e.g. from the admin settings form after a save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThemePatch {
    pub platform_name: Option<String>,
    pub platform_tagline: Option<String>,
    #[serde(alias = "theme_mode")]
    pub mode: Option<ColorMode>,
    pub primary_color: Option<String>,
    pub success_color: Option<String>,
    pub warning_color: Option<String>,
    pub danger_color: Option<String>,
    pub border_radius: Option<String>,
    pub currency_code: Option<String>,
    pub currency_symbol: Option<String>,
    pub currency_position: Option<CurrencyPosition>,
}

fn overlay_color(slot: &mut String, candidate: Option<&str>, field: &str) {
    let Some(candidate) = candidate else {
        return;
    };
    match hex_to_hsl(candidate) {
        Ok(_) => *slot = candidate.trim().to_owned(),
        Err(err) => warn!(field, "keeping previous color: {err}"),
    }
}

/// Bare numbers are pixels; anything else is taken as a CSS length as-is.
pub fn css_length(raw: &str) -> String {
    let raw = raw.trim();
    if raw.parse::<f64>().is_ok() {
        format!("{raw}px")
    } else {
        raw.to_owned()
    }
}
