//! Startup theme sequence: cached snapshot first (synchronously, before any
//! network I/O), then the freshly fetched settings. The document only ever
//! moves default → cached → fresh.
//!
//! Overlapping refreshes are sequenced by an epoch: a response is applied only
//! if no later refresh started while it was in flight.

use crate::document::{self, DocumentSurface, ResolvedStyle};
use crate::settings::{PlatformSettings, PlatformTheme, ThemePatch};
use async_trait::async_trait;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use sv_api_types::{ApiError, ColorMode, PublicSettings};
use sv_storage::{KeyValueStore, keys};
use tracing::{debug, info, warn};

/// `GET {API_BASE}/v1/settings/public` in the browser.
#[async_trait(?Send)]
pub trait SettingsSource {
    async fn fetch_public_settings(&self) -> Result<PublicSettings, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    Failed,
    /// A later refresh started before this one finished.
    Superseded,
}

#[derive(Default)]
struct State {
    settings: PlatformSettings,
    error: Option<ApiError>,
    epoch: u64,
    in_flight: u32,
    watching: bool,
}

pub struct ThemeBootstrap {
    document: Rc<dyn DocumentSurface>,
    durable: Rc<dyn KeyValueStore>,
    source: Rc<dyn SettingsSource>,
    state: Rc<RefCell<State>>,
}

impl ThemeBootstrap {
    pub fn new(
        document: Rc<dyn DocumentSurface>,
        durable: Rc<dyn KeyValueStore>,
        source: Rc<dyn SettingsSource>,
    ) -> Self {
        Self {
            document,
            durable,
            source,
            state: Rc::default(),
        }
    }

    pub fn settings(&self) -> PlatformSettings {
        self.state.borrow().settings.clone()
    }

    pub fn theme(&self) -> PlatformTheme {
        self.state.borrow().settings.theme.clone()
    }

    pub fn error(&self) -> Option<ApiError> {
        self.state.borrow().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().in_flight > 0
    }

    pub fn format_currency(&self, amount: f64) -> String {
        self.state.borrow().settings.theme.format_currency(amount)
    }

    pub fn cached_snapshot(&self) -> Option<PlatformTheme> {
        sv_storage::soft_read_json(self.durable.as_ref(), keys::THEME_CACHE)
    }

    /// Step 1: apply the cached snapshot, or the defaults when there is none.
    /// Returns whether a cache entry was used.
    pub fn apply_cached(&self) -> bool {
        let cached = self.cached_snapshot();
        let found = cached.is_some();
        if let Some(theme) = cached {
            self.state.borrow_mut().settings.theme = theme;
            info!("theme applied from cache");
        }
        let settings = self.settings();
        self.apply(&settings, false);
        found
    }

    /// Full startup sequence. Never fails; see `error()` for fetch problems.
    pub async fn load(&self) -> PlatformSettings {
        self.apply_cached();
        self.refresh().await;
        self.settings()
    }

    /// Re-fetch and apply without touching the cache first.
    pub async fn refresh(&self) -> RefreshOutcome {
        let epoch = {
            let mut state = self.state.borrow_mut();
            state.epoch += 1;
            state.in_flight += 1;
            state.epoch
        };

        let result = self.source.fetch_public_settings().await;

        let latest = {
            let mut state = self.state.borrow_mut();
            state.in_flight -= 1;
            state.epoch == epoch
        };
        if !latest {
            debug!(epoch, "discarding superseded settings response");
            return RefreshOutcome::Superseded;
        }

        match result {
            Ok(public) => {
                let settings = PlatformSettings::from_public(&public);
                {
                    let mut state = self.state.borrow_mut();
                    state.settings = settings.clone();
                    state.error = None;
                }
                self.apply(&settings, true);
                self.write_cache(&settings.theme);
                RefreshOutcome::Applied
            }
            Err(err) => {
                warn!("platform settings fetch failed, keeping current theme: {err}");
                self.state.borrow_mut().error = Some(err);
                RefreshOutcome::Failed
            }
        }
    }

    /// Merge a partial update into the current settings, apply, and cache it.
    pub fn patch(&self, patch: &ThemePatch) -> PlatformSettings {
        let settings = {
            let mut state = self.state.borrow_mut();
            state.settings.apply_patch(patch);
            state.settings.clone()
        };
        self.apply(&settings, true);
        self.write_cache(&settings.theme);
        settings
    }

    /// Apply the given settings to the document (title included).
    pub fn apply_to_document(&self, settings: &PlatformSettings) -> ResolvedStyle {
        self.apply(settings, true)
    }

    fn apply(&self, settings: &PlatformSettings, with_title: bool) -> ResolvedStyle {
        let title = with_title.then(|| settings.document_title());
        let style = document::apply_to_document(self.document.as_ref(), &settings.theme, title.as_deref());
        self.sync_system_watcher(settings.theme.mode);
        style
    }

    fn sync_system_watcher(&self, mode: ColorMode) {
        let wants = mode == ColorMode::System;
        let watching = self.state.borrow().watching;
        if wants == watching {
            return;
        }

        if !wants {
            self.state.borrow_mut().watching = false;
            self.document.unwatch_color_scheme();
            return;
        }

        let state = Rc::downgrade(&self.state);
        let doc = Rc::downgrade(&self.document);
        let registered = self
            .document
            .watch_color_scheme(Rc::new(move || reapply_for_os_change(&state, &doc)));
        if !registered {
            debug!("os color scheme not observable; retrying on next apply");
        }
        self.state.borrow_mut().watching = registered;
    }

    fn write_cache(&self, theme: &PlatformTheme) {
        sv_storage::soft_write_json(self.durable.as_ref(), keys::THEME_CACHE, theme);
    }

    /// Drop the OS watcher; used on teardown and between tests.
    pub fn teardown(&self) {
        let mut state = self.state.borrow_mut();
        if state.watching {
            state.watching = false;
            self.document.unwatch_color_scheme();
        }
    }
}

/// Reads the settings at fire time, so later refreshes and patches are honoured.
fn reapply_for_os_change(state: &Weak<RefCell<State>>, document: &Weak<dyn DocumentSurface>) {
    let (Some(state), Some(document)) = (state.upgrade(), document.upgrade()) else {
        return;
    };
    let theme = state.borrow().settings.theme.clone();
    if theme.mode != ColorMode::System {
        return;
    }
    debug!("os color scheme changed; reapplying theme");
    document::apply_to_document(document.as_ref(), &theme, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ColorScheme;
    use crate::document::testing::RecordingDocument;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use sv_storage::InMemoryStore;

    /// Serves queued responses in order.
    #[derive(Default)]
    struct ScriptedSource {
        responses: RefCell<VecDeque<Result<PublicSettings, ApiError>>>,
        calls: Cell<u32>,
    }

    impl ScriptedSource {
        fn push(&self, response: Result<PublicSettings, ApiError>) {
            self.responses.borrow_mut().push_back(response);
        }
    }

    #[async_trait(?Send)]
    impl SettingsSource for ScriptedSource {
        async fn fetch_public_settings(&self) -> Result<PublicSettings, ApiError> {
            self.calls.set(self.calls.get() + 1);
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Network("no scripted response".into())))
        }
    }

    /// Resolves only after being polled once with `Pending`, letting a test
    /// interleave two refreshes deterministically.
    struct YieldOnce(bool);

    impl Future for YieldOnce {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    struct SlowSource {
        inner: ScriptedSource,
        yields: RefCell<VecDeque<u32>>,
    }

    #[async_trait(?Send)]
    impl SettingsSource for SlowSource {
        async fn fetch_public_settings(&self) -> Result<PublicSettings, ApiError> {
            let response = self.inner.fetch_public_settings().await;
            let yields = self.yields.borrow_mut().pop_front().unwrap_or(0);
            for _ in 0..yields {
                YieldOnce(false).await;
            }
            response
        }
    }

    struct Rig {
        doc: Rc<RecordingDocument>,
        store: Rc<InMemoryStore>,
        source: Rc<ScriptedSource>,
        bootstrap: ThemeBootstrap,
    }

    fn rig() -> Rig {
        let doc = Rc::new(RecordingDocument::default());
        let store = Rc::new(InMemoryStore::new());
        let source = Rc::new(ScriptedSource::default());
        let bootstrap = ThemeBootstrap::new(doc.clone(), store.clone(), source.clone());
        Rig {
            doc,
            store,
            source,
            bootstrap,
        }
    }

    fn public(primary: &str, mode: &str) -> PublicSettings {
        PublicSettings {
            platform_name: Some("Acme".into()),
            platform_tagline: Some("Grow".into()),
            primary_color: Some(primary.into()),
            theme_mode: Some(mode.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fresh_settings_are_applied_and_cached() {
        let rig = rig();
        rig.source.push(Ok(public("#ff0000", "dark")));

        let settings = rig.bootstrap.load().await;
        assert_eq!(settings.platform_name, "Acme");
        assert_eq!(rig.doc.scheme.get(), Some(ColorScheme::Dark));
        assert_eq!(rig.doc.var("--primary").as_deref(), Some("0 100% 50%"));
        assert_eq!(rig.doc.title.borrow().as_deref(), Some("Acme - Grow"));
        assert_eq!(rig.bootstrap.error(), None);

        let cached = rig.bootstrap.cached_snapshot().unwrap();
        assert_eq!(cached.primary_color, "#ff0000");
        assert_eq!(cached.mode, ColorMode::Dark);
        let raw = rig.store.get(keys::THEME_CACHE).unwrap().unwrap();
        assert!(!raw.contains("Acme"), "only theme and currency are cached");
    }

    #[tokio::test]
    async fn failed_fetch_keeps_cached_theme() {
        let rig = rig();
        let cached = PlatformTheme {
            mode: ColorMode::Dark,
            primary_color: "#00ff00".into(),
            ..Default::default()
        };
        sv_storage::write_json(rig.store.as_ref(), keys::THEME_CACHE, &cached).unwrap();
        rig.source.push(Err(ApiError::Network("offline".into())));

        rig.bootstrap.load().await;

        assert_eq!(rig.doc.scheme.get(), Some(ColorScheme::Dark));
        assert_eq!(rig.doc.var("--primary").as_deref(), Some("120 100% 50%"));
        assert!(rig.doc.applied.get());
        assert_eq!(rig.bootstrap.error(), Some(ApiError::Network("offline".into())));
        assert_eq!(rig.bootstrap.theme(), cached);
    }

    #[tokio::test]
    async fn failed_fetch_without_cache_shows_defaults() {
        let rig = rig();
        rig.source.push(Err(ApiError::Status {
            status: 500,
            body: "boom".into(),
        }));
        rig.bootstrap.load().await;
        assert_eq!(rig.bootstrap.theme(), PlatformTheme::default());
        assert_eq!(rig.doc.scheme.get(), Some(ColorScheme::Light));
        assert!(rig.bootstrap.error().is_some());
        assert!(rig.store.is_empty());
    }

    #[test]
    fn cache_is_applied_before_any_fetch() {
        let rig = rig();
        let cached = PlatformTheme {
            border_radius: "3px".into(),
            ..Default::default()
        };
        sv_storage::write_json(rig.store.as_ref(), keys::THEME_CACHE, &cached).unwrap();

        assert!(rig.bootstrap.apply_cached());
        assert_eq!(rig.source.calls.get(), 0);
        assert_eq!(rig.doc.var("--radius").as_deref(), Some("3px"));
        assert_eq!(rig.doc.title.borrow().as_deref(), None);
    }

    #[test]
    fn corrupt_or_unavailable_cache_falls_back_to_defaults() {
        let rig = rig();
        rig.store.set(keys::THEME_CACHE, "][").unwrap();
        assert!(!rig.bootstrap.apply_cached());
        assert_eq!(rig.doc.var("--radius").as_deref(), Some("0.5rem"));

        let doc = Rc::new(RecordingDocument::default());
        let bootstrap = ThemeBootstrap::new(
            doc.clone(),
            Rc::new(InMemoryStore::unavailable()),
            Rc::new(ScriptedSource::default()),
        );
        assert!(!bootstrap.apply_cached());
        assert!(doc.applied.get());
    }

    #[tokio::test]
    async fn success_after_failure_clears_error() {
        let rig = rig();
        rig.source.push(Err(ApiError::Network("offline".into())));
        rig.source.push(Ok(public("#0000ff", "light")));

        assert_eq!(rig.bootstrap.refresh().await, RefreshOutcome::Failed);
        assert!(rig.bootstrap.error().is_some());
        assert_eq!(rig.bootstrap.refresh().await, RefreshOutcome::Applied);
        assert_eq!(rig.bootstrap.error(), None);
        assert!(!rig.bootstrap.is_loading());
    }

    #[tokio::test]
    async fn cached_snapshot_roundtrip_is_idempotent() {
        let rig = rig();
        rig.source.push(Ok(public("#16a34a", "dark")));
        rig.bootstrap.load().await;
        let scheme = rig.doc.scheme.get();
        let vars = rig.doc.vars.borrow().clone();

        let doc = Rc::new(RecordingDocument::default());
        let reload = ThemeBootstrap::new(doc.clone(), rig.store.clone(), Rc::new(ScriptedSource::default()));
        reload.apply_cached();
        assert_eq!(doc.scheme.get(), scheme);
        assert_eq!(*doc.vars.borrow(), vars);
    }

    #[test]
    fn patch_applies_and_caches() {
        let rig = rig();
        let patch = ThemePatch {
            mode: Some(ColorMode::Dark),
            warning_color: Some("#ffff00".into()),
            platform_name: Some("Renamed".into()),
            ..Default::default()
        };
        let settings = rig.bootstrap.patch(&patch);
        assert_eq!(settings.platform_name, "Renamed");
        assert_eq!(rig.doc.scheme.get(), Some(ColorScheme::Dark));
        assert_eq!(rig.doc.var("--warning").as_deref(), Some("60 100% 50%"));
        assert!(rig.doc.title.borrow().as_deref().unwrap().starts_with("Renamed - "));
        assert_eq!(rig.bootstrap.cached_snapshot().unwrap().mode, ColorMode::Dark);
    }

    #[tokio::test]
    async fn system_mode_follows_os_with_latest_settings() {
        let rig = rig();
        rig.source.push(Ok(public("#ff0000", "system")));
        rig.bootstrap.load().await;
        assert_eq!(rig.doc.scheme.get(), Some(ColorScheme::Light));
        assert_eq!(rig.doc.watch_calls.get(), 1);

        rig.doc.flip_os_preference(true);
        assert_eq!(rig.doc.scheme.get(), Some(ColorScheme::Dark));

        // A later patch must be visible to the existing watcher.
        rig.bootstrap.patch(&ThemePatch {
            primary_color: Some("#0000ff".into()),
            ..Default::default()
        });
        assert_eq!(rig.doc.watch_calls.get(), 1);
        rig.doc.vars.borrow_mut().clear();
        rig.doc.flip_os_preference(false);
        assert_eq!(rig.doc.scheme.get(), Some(ColorScheme::Light));
        assert_eq!(rig.doc.var("--primary").as_deref(), Some("240 100% 50%"));

        rig.bootstrap.patch(&ThemePatch {
            mode: Some(ColorMode::Light),
            ..Default::default()
        });
        assert!(rig.doc.watcher.borrow().is_none());
    }

    #[test]
    fn unavailable_watcher_is_retried_on_next_apply() {
        let rig = rig();
        rig.doc.no_media_query.set(true);
        rig.bootstrap.patch(&ThemePatch {
            mode: Some(ColorMode::System),
            ..Default::default()
        });
        assert_eq!(rig.doc.watch_calls.get(), 1);
        assert!(rig.doc.watcher.borrow().is_none());

        rig.doc.no_media_query.set(false);
        rig.bootstrap.patch(&ThemePatch {
            primary_color: Some("#00ff00".into()),
            ..Default::default()
        });
        assert_eq!(rig.doc.watch_calls.get(), 2);
        assert!(rig.doc.watcher.borrow().is_some());

        rig.doc.flip_os_preference(true);
        assert_eq!(rig.doc.scheme.get(), Some(ColorScheme::Dark));
    }

    #[test]
    fn teardown_removes_watcher() {
        let rig = rig();
        rig.bootstrap.patch(&ThemePatch {
            mode: Some(ColorMode::System),
            ..Default::default()
        });
        assert!(rig.doc.watcher.borrow().is_some());
        rig.bootstrap.teardown();
        assert!(rig.doc.watcher.borrow().is_none());
    }

    #[tokio::test]
    async fn overlapping_refreshes_latest_started_wins() {
        let doc = Rc::new(RecordingDocument::default());
        let store = Rc::new(InMemoryStore::new());
        let source = Rc::new(SlowSource {
            inner: ScriptedSource::default(),
            // First request is slow, second is fast.
            yields: RefCell::new(VecDeque::from([3, 0])),
        });
        source.inner.push(Ok(public("#ff0000", "light")));
        source.inner.push(Ok(public("#0000ff", "light")));
        let bootstrap = ThemeBootstrap::new(doc.clone(), store.clone(), source.clone());

        let (first, second) = tokio::join!(bootstrap.refresh(), bootstrap.refresh());
        assert_eq!(first, RefreshOutcome::Superseded);
        assert_eq!(second, RefreshOutcome::Applied);
        assert_eq!(doc.var("--primary").as_deref(), Some("240 100% 50%"));
        assert_eq!(bootstrap.cached_snapshot().unwrap().primary_color, "#0000ff");
        assert!(!bootstrap.is_loading());
    }
}
