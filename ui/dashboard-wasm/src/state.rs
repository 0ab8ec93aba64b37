//! Application context.
//!
//! One explicit `App` value owns every service; it is installed in a
//! `thread_local!` slot (WASM is single-threaded) and can be torn down with
//! [`reset`] for test isolation.

use crate::config::ClientConfig;
use crate::events::WindowListener;
use std::cell::RefCell;
use std::rc::Rc;
use sv_auth::SessionManager;
use sv_storage::{KeyValueStore, StorageError};
use sv_theme::ThemeBootstrap;
use sv_webview::{EnvironmentDetector, InboundHandler, Listener, NativeBridge, SignalBus};
use tracing::info;
use wasm_bindgen::JsValue;

// ── Browser storage ──

#[derive(Debug, Clone, Copy)]
enum StorageArea {
    Local,
    Session,
}

/// `localStorage` / `sessionStorage`, re-resolved on every access because
/// both can throw or vanish (private mode, storage disabled).
#[derive(Debug, Clone, Copy)]
pub struct BrowserStorage {
    area: StorageArea,
}

impl BrowserStorage {
    pub fn local() -> Self {
        Self {
            area: StorageArea::Local,
        }
    }

    pub fn session() -> Self {
        Self {
            area: StorageArea::Session,
        }
    }

    fn raw(&self) -> Result<web_sys::Storage, StorageError> {
        let window = web_sys::window().ok_or_else(|| StorageError::Unavailable("no window".to_owned()))?;
        let storage = match self.area {
            StorageArea::Local => window.local_storage(),
            StorageArea::Session => window.session_storage(),
        };
        storage
            .map_err(js_error)?
            .ok_or_else(|| StorageError::Unavailable(format!("{:?} storage disabled", self.area)))
    }
}

fn js_error(err: JsValue) -> StorageError {
    StorageError::Unavailable(format!("{err:?}"))
}

impl KeyValueStore for BrowserStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.raw()?.get_item(key).map_err(js_error)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.raw()?.set_item(key, value).map_err(js_error)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.raw()?.remove_item(key).map_err(js_error)
    }
}

// ── App context ──

pub struct App {
    pub config: Rc<ClientConfig>,
    pub local: Rc<dyn KeyValueStore>,
    pub session: Rc<dyn KeyValueStore>,
    pub detector: Rc<EnvironmentDetector>,
    pub bridge: Rc<NativeBridge>,
    pub auth: Rc<SessionManager>,
    pub signals: Rc<SignalBus>,
    pub theme: Rc<ThemeBootstrap>,
    pub handler: Rc<InboundHandler>,
    pub listener: RefCell<Option<Listener>>,
    pub window_listeners: RefCell<Vec<WindowListener>>,
}

impl App {
    fn teardown(&self) {
        if let Some(listener) = self.listener.borrow_mut().take() {
            listener.unsubscribe();
        }
        for listener in self.window_listeners.borrow_mut().drain(..) {
            listener.remove();
        }
        self.theme.teardown();
        self.detector.clear_cache();
    }
}

thread_local! {
    static APP: RefCell<Option<Rc<App>>> = const { RefCell::new(None) };
}

pub fn install(app: Rc<App>) {
    let previous = APP.with(|slot| slot.borrow_mut().replace(app));
    if let Some(previous) = previous {
        previous.teardown();
    }
}

pub fn app() -> Option<Rc<App>> {
    APP.with(|slot| slot.borrow().clone())
}

/// Run a closure against the installed app; `None` before `start` ran.
pub fn with_app<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&App) -> R,
{
    app().map(|app| f(&app))
}

/// Tear down listeners and watchers and forget the app.
pub fn reset() {
    let previous = APP.with(|slot| slot.borrow_mut().take());
    if let Some(previous) = previous {
        previous.teardown();
        info!("app context reset");
    }
}
