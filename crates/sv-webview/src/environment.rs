//! Runtime classification: Android WebView host, iOS WebView host, or a
//! plain browser.
//!
//! A native host can force the classification with `?source=app|android|ios`;
//! the value sticks for the rest of the tab session.

use crate::deeplink::DeepLink;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;
use sv_storage::{KeyValueStore, session_keys};
use tracing::debug;

static ANDROID_WEBVIEW_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bwv\b").expect("static regex"));
static ANDROID_CHROME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Android.*Chrome/[\d.]+").expect("static regex"));
static MOBILE_SAFARI_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Safari/[\d.]+").expect("static regex"));
static IOS_DEVICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(iPhone|iPod|iPad).*AppleWebKit").expect("static regex"));

const FORCEABLE_SOURCES: [&str; 3] = ["app", "android", "ios"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Android,
    Ios,
    Web,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    pub is_embedded: bool,
    pub is_android_host: bool,
    #[serde(rename = "isIOSHost")]
    pub is_ios_host: bool,
    pub source: Source,
    pub raw_user_agent: String,
}

impl EnvironmentInfo {
    /// What we report when there is no window to inspect.
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// The ambient inputs detection reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeProbe {
    pub user_agent: String,
    /// `location.search`, with or without the leading `?`.
    pub query: String,
}

pub type ProbeFn = Rc<dyn Fn() -> Option<RuntimeProbe>>;

/// Classify a user agent given an optional persisted source override.
pub fn classify(user_agent: &str, persisted: Option<&str>) -> EnvironmentInfo {
    let forced_android = matches!(persisted, Some("android" | "app"));
    let forced_ios = matches!(persisted, Some("ios"));

    let android_ua = ANDROID_WEBVIEW_TOKEN.is_match(user_agent)
        || (ANDROID_CHROME.is_match(user_agent) && !MOBILE_SAFARI_SUFFIX.is_match(user_agent));
    let ios_ua = IOS_DEVICE.is_match(user_agent) && !user_agent.contains("Safari");

    let is_android_host = android_ua || forced_android;
    let is_ios_host = ios_ua || forced_ios;

    let source = if is_android_host {
        Source::Android
    } else if is_ios_host {
        Source::Ios
    } else {
        match persisted {
            Some("web") | None => Source::Web,
            Some(_) => Source::Unknown,
        }
    };

    EnvironmentInfo {
        is_embedded: is_android_host || is_ios_host,
        is_android_host,
        is_ios_host,
        source,
        raw_user_agent: user_agent.to_owned(),
    }
}

/// Memoizing detector. One per page session; `clear_cache` resets it.
pub struct EnvironmentDetector {
    session: Rc<dyn KeyValueStore>,
    probe: ProbeFn,
    cached: RefCell<Option<EnvironmentInfo>>,
}

impl EnvironmentDetector {
    pub fn new(session: Rc<dyn KeyValueStore>, probe: ProbeFn) -> Self {
        Self {
            session,
            probe,
            cached: RefCell::new(None),
        }
    }

    pub fn probe(&self) -> Option<RuntimeProbe> {
        (self.probe)()
    }

    pub fn detect(&self) -> EnvironmentInfo {
        if let Some(info) = self.cached.borrow().as_ref() {
            return info.clone();
        }

        let Some(probe) = self.probe() else {
            return EnvironmentInfo::unknown();
        };

        let info = self.detect_with(&probe);
        debug!(source = ?info.source, embedded = info.is_embedded, "runtime environment detected");
        *self.cached.borrow_mut() = Some(info.clone());
        info
    }

    /// Uncached detection against an explicit probe. Still persists a
    /// forced `source` parameter.
    pub fn detect_with(&self, probe: &RuntimeProbe) -> EnvironmentInfo {
        let store = self.session.as_ref();
        let link = DeepLink::parse(&probe.query);
        if let Some(forced) = link.source.as_deref() {
            if FORCEABLE_SOURCES.contains(&forced) {
                sv_storage::soft_set(store, session_keys::WEBVIEW_SOURCE, forced);
            }
        }

        let persisted = sv_storage::soft_get(store, session_keys::WEBVIEW_SOURCE);
        classify(&probe.user_agent, persisted.as_deref())
    }

    pub fn cached(&self) -> Option<EnvironmentInfo> {
        self.cached.borrow().clone()
    }

    pub fn clear_cache(&self) {
        self.cached.borrow_mut().take();
    }
}
