//! Runtime configuration.
//!
//! API base priority: `<meta name="sv-api-base">` in the host page →
//! compile-time `SV_API_BASE` → same-origin `/api`.

use crate::dom;

pub const API_BASE_META: &str = "sv-api-base";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
}

impl ClientConfig {
    pub fn from_page() -> Self {
        Self::resolve(
            dom::meta_content(API_BASE_META).as_deref(),
            option_env!("SV_API_BASE"),
            &dom::origin(),
        )
    }

    /// First non-blank candidate wins; a blank meta tag does not hide the build value.
    pub fn resolve(from_meta: Option<&str>, from_build: Option<&str>, origin: &str) -> Self {
        let present = |base: &&str| !base.trim().is_empty();
        match from_meta.filter(present).or(from_build.filter(present)) {
            Some(base) => Self::new(base),
            None => Self::new(&format!("{origin}/api")),
        }
    }

    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_owned(),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}
