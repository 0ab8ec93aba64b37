//! ShareVest dashboard WASM core.
//!
//! Boots the platform theme (cached snapshot first, then fresh settings),
//! restores the auth session, detects the WebView host, and wires the native
//! bridge. Page code talks to it through the exported functions below.

pub mod api;
pub mod config;
pub mod dom;
pub mod events;
pub mod platform;
pub mod state;

use gloo_utils::format::JsValueSerdeExt;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use sv_api_types::User;
use sv_auth::SessionManager;
use sv_storage::KeyValueStore;
use sv_theme::{ThemeBootstrap, ThemePatch};
use sv_webview::{
    Delivery, EnvironmentDetector, InboundHandler, NativeBridge, PaymentCallback, PaymentOutcome,
    PendingPurchase, SignalBus,
};
use tracing::{debug, info};
use wasm_bindgen::prelude::*;

/// WASM entry point – called automatically when the module is instantiated.
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();

    init();
    Ok(())
}

fn init() {
    let config = Rc::new(config::ClientConfig::from_page());
    let local: Rc<dyn KeyValueStore> = Rc::new(state::BrowserStorage::local());
    let session: Rc<dyn KeyValueStore> = Rc::new(state::BrowserStorage::session());

    // Theme first and synchronously, before any network I/O.
    let theme = Rc::new(ThemeBootstrap::new(
        Rc::new(dom::BrowserDocument::default()),
        local.clone(),
        Rc::new(api::HttpSettingsSource::new(config.clone())),
    ));
    theme.apply_cached();

    let detector = Rc::new(EnvironmentDetector::new(session.clone(), Rc::new(dom::runtime_probe)));
    let environment = detector.detect();
    info!(source = ?environment.source, embedded = environment.is_embedded, "dashboard starting");

    let bridge = Rc::new(NativeBridge::new(
        detector.clone(),
        session.clone(),
        Rc::new(platform::BrowserHost),
        Rc::new(platform::WindowInbound::default()),
    ));

    let auth = Rc::new(SessionManager::new(local.clone()));
    auth.restore();
    if let Some(token) = bridge.request_token() {
        info!("auth token handed over by deep link or native host");
        auth.set_token(&token, None);
    }

    let signals = Rc::new(SignalBus::new());
    let handler = Rc::new(
        InboundHandler::new(auth.clone(), signals.clone(), Rc::new(platform::BrowserNavigator))
            .with_fallback(|message| debug!(kind = message.kind(), "unhandled native message")),
    );

    let app = Rc::new(state::App {
        config: config.clone(),
        local,
        session,
        detector,
        bridge: bridge.clone(),
        auth: auth.clone(),
        signals,
        theme: theme.clone(),
        handler: handler.clone(),
        listener: Default::default(),
        window_listeners: Default::default(),
    });

    let listener = bridge.listen(move |message| handler.handle(message));
    *app.listener.borrow_mut() = Some(listener);

    events::bind_signals(&app);
    events::bind_network_status(&app);
    state::install(app);

    bridge.send(&auth.auth_state_message());

    wasm_bindgen_futures::spawn_local(async move {
        theme.refresh().await;
        auth.revalidate(&api::HttpProfileApi::new(config)).await;
    });
}

fn not_started() -> JsValue {
    JsValue::from_str("dashboard core not started")
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    JsValue::from_serde(value).map_err(|err| JsValue::from_str(&err.to_string()))
}

fn delivery_name(delivery: Delivery) -> String {
    match delivery {
        Delivery::Android => "android",
        Delivery::Ios => "ios",
        Delivery::Skipped => "skipped",
        Delivery::Dropped => "dropped",
    }
    .to_owned()
}

// ── Native bridge ──

/// Send an arbitrary tagged message to the native host.
#[wasm_bindgen]
pub fn native_send(kind: &str, payload: JsValue) -> String {
    let payload = if payload.is_undefined() || payload.is_null() {
        None
    } else {
        serde_wasm_bindgen::from_value::<serde_json::Value>(payload).ok()
    };
    state::with_app(|app| delivery_name(app.bridge.send_tagged(kind, payload)))
        .unwrap_or_else(|| delivery_name(Delivery::Skipped))
}

#[wasm_bindgen]
pub fn request_token() -> Option<String> {
    state::with_app(|app| app.bridge.request_token()).flatten()
}

#[wasm_bindgen]
pub fn environment() -> Result<JsValue, JsValue> {
    let info = state::with_app(|app| app.detector.detect()).ok_or_else(not_started)?;
    to_js(&info)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum PaymentReport {
    Success {
        reference: String,
        #[serde(default, rename = "newBalance")]
        new_balance: Option<f64>,
    },
    Failed {
        reference: String,
        message: String,
    },
    Error {
        #[serde(default)]
        reference: String,
        message: String,
    },
}

/// Tell the host how a payment callback resolved.
/// `{status: "success"|"failed"|"error", reference, message?, newBalance?}`
#[wasm_bindgen]
pub fn notify_payment(report: JsValue) -> Result<String, JsValue> {
    let report: PaymentReport =
        serde_wasm_bindgen::from_value(report).map_err(|err| JsValue::from_str(&err.to_string()))?;
    let (reference, outcome) = match report {
        PaymentReport::Success { reference, new_balance } => (reference, PaymentOutcome::Verified { new_balance }),
        PaymentReport::Failed { reference, message } => (reference, PaymentOutcome::Failed { message }),
        PaymentReport::Error { reference, message } => (reference, PaymentOutcome::Error { message }),
    };
    let callback = PaymentCallback { reference };
    let delivery = state::with_app(|app| sv_webview::notify_payment_outcome(&app.bridge, &callback, &outcome))
        .ok_or_else(not_started)?;
    Ok(delivery_name(delivery))
}

/// Reference from `?reference=` / `?trxref=` on a payment return page.
#[wasm_bindgen]
pub fn payment_reference() -> Option<String> {
    PaymentCallback::from_query(&dom::query_string()).map(|c| c.reference)
}

#[derive(Serialize)]
struct PendingPurchaseView {
    share_id: String,
    quantity: u32,
    resume_path: String,
}

#[wasm_bindgen]
pub fn pending_purchase() -> Result<JsValue, JsValue> {
    let view = PendingPurchase::from_query(&dom::query_string()).map(|p| PendingPurchaseView {
        resume_path: p.resume_path(),
        share_id: p.share_id,
        quantity: p.quantity,
    });
    to_js(&view)
}

#[wasm_bindgen]
pub fn remember_return_url(path: &str) -> bool {
    state::with_app(|app| sv_webview::remember_return_url(app.session.as_ref(), path)).unwrap_or(false)
}

#[wasm_bindgen]
pub fn take_return_url() -> Option<String> {
    state::with_app(|app| sv_webview::take_return_url(app.session.as_ref())).flatten()
}

// ── Settings / theme ──

#[wasm_bindgen]
pub async fn refresh_settings() -> Result<JsValue, JsValue> {
    let theme = state::with_app(|app| app.theme.clone()).ok_or_else(not_started)?;
    theme.refresh().await;
    match theme.error() {
        Some(err) => Err(JsValue::from_str(&err.to_string())),
        None => to_js(&theme.settings()),
    }
}

#[wasm_bindgen]
pub fn platform_settings() -> Result<JsValue, JsValue> {
    let settings = state::with_app(|app| app.theme.settings()).ok_or_else(not_started)?;
    to_js(&settings)
}

#[wasm_bindgen]
pub fn settings_error() -> Option<String> {
    state::with_app(|app| app.theme.error().map(|e| e.to_string())).flatten()
}

#[wasm_bindgen]
pub fn patch_theme(partial: JsValue) -> Result<JsValue, JsValue> {
    let patch: ThemePatch =
        serde_wasm_bindgen::from_value(partial).map_err(|err| JsValue::from_str(&err.to_string()))?;
    let settings = state::with_app(|app| app.theme.patch(&patch)).ok_or_else(not_started)?;
    to_js(&settings)
}

#[wasm_bindgen]
pub fn format_currency(amount: f64) -> String {
    state::with_app(|app| app.theme.format_currency(amount))
        .unwrap_or_else(|| sv_theme::PlatformTheme::default().format_currency(amount))
}

// ── Auth session ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthStateView {
    is_authenticated: bool,
    is_admin: bool,
    is_email_verified: bool,
    user: Option<User>,
}

#[wasm_bindgen]
pub fn auth_state() -> Result<JsValue, JsValue> {
    let view = state::with_app(|app| AuthStateView {
        is_authenticated: app.auth.is_authenticated(),
        is_admin: app.auth.is_admin(),
        is_email_verified: app.auth.is_email_verified(),
        user: app.auth.user(),
    })
    .ok_or_else(not_started)?;
    to_js(&view)
}

#[wasm_bindgen]
pub fn bearer_token() -> Option<String> {
    state::with_app(|app| app.auth.bearer()).flatten()
}

#[wasm_bindgen]
pub fn login(token: &str, user: JsValue) -> Result<(), JsValue> {
    let user: User = serde_wasm_bindgen::from_value(user).map_err(|err| JsValue::from_str(&err.to_string()))?;
    let app = state::app().ok_or_else(not_started)?;
    app.auth.login(token, user);
    app.bridge.send(&app.auth.auth_state_message());
    Ok(())
}

#[wasm_bindgen]
pub fn logout() {
    if let Some(app) = state::app() {
        app.auth.logout();
        app.bridge.send(&app.auth.auth_state_message());
    }
}

#[wasm_bindgen]
pub fn dismiss_verification_prompt(duration_ms: f64) {
    let now = js_sys::Date::now() as u64;
    state::with_app(|app| app.auth.dismiss_verification_for(now, duration_ms.max(0.0) as u64));
}

#[wasm_bindgen]
pub fn verification_prompt_due() -> bool {
    let now = js_sys::Date::now() as u64;
    state::with_app(|app| app.auth.verification_prompt_due(now)).unwrap_or(false)
}

/// Tear down listeners, watchers and caches; the next `start()` begins clean.
#[wasm_bindgen]
pub fn reset_for_tests() {
    state::reset();
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn start_marks_theme_applied_and_resets() {
        reset_for_tests();
        init();
        let root = dom::document().and_then(|d| d.document_element()).unwrap();
        assert_eq!(root.get_attribute(sv_theme::THEME_APPLIED_ATTRIBUTE).as_deref(), Some("true"));
        assert!(state::app().is_some());
        assert!(!environment().unwrap().is_undefined());

        reset_for_tests();
        assert!(state::app().is_none());
        assert!(request_token().is_none());
    }

    #[wasm_bindgen_test]
    fn network_status_is_sent_once_after_reinit() {
        use sv_storage::session_keys;

        let window = dom::window().unwrap();
        let session = state::BrowserStorage::session();
        session.set(session_keys::WEBVIEW_SOURCE, "android").unwrap();

        let sent = js_sys::Array::new();
        let record = js_sys::Function::new_with_args("m", "this.push(m)").bind(&sent);
        let host = js_sys::Object::new();
        js_sys::Reflect::set(&host, &JsValue::from_str("postMessage"), &record).unwrap();
        js_sys::Reflect::set(&window, &JsValue::from_str(sv_webview::bridge::ANDROID_INTERFACE), &host).unwrap();

        reset_for_tests();
        init();
        reset_for_tests();
        init();

        let online = web_sys::Event::new("online").unwrap();
        window.dispatch_event(&online).unwrap();
        let network_messages = sent
            .iter()
            .filter_map(|m| m.as_string())
            .filter(|m| m.contains("NETWORK_STATUS"))
            .count();
        assert_eq!(network_messages, 1);

        reset_for_tests();
        window.dispatch_event(&online).unwrap();
        let network_messages = sent
            .iter()
            .filter_map(|m| m.as_string())
            .filter(|m| m.contains("NETWORK_STATUS"))
            .count();
        assert_eq!(network_messages, 1);

        session.remove(session_keys::WEBVIEW_SOURCE).unwrap();
        js_sys::Reflect::delete_property(&window, &JsValue::from_str(sv_webview::bridge::ANDROID_INTERFACE)).unwrap();
    }

    #[wasm_bindgen_test]
    fn malformed_direct_message_is_ignored() {
        reset_for_tests();
        init();
        let window = dom::window().unwrap();
        let entry = js_sys::Reflect::get(&window, &JsValue::from_str(sv_webview::bridge::DIRECT_ENTRY_POINT)).unwrap();
        let receive: js_sys::Function = js_sys::Reflect::get(&entry, &JsValue::from_str("receive"))
            .unwrap()
            .into();
        receive.call1(&entry, &JsValue::from_str("not-json")).unwrap();
        reset_for_tests();
        let entry = js_sys::Reflect::get(&window, &JsValue::from_str(sv_webview::bridge::DIRECT_ENTRY_POINT)).unwrap();
        assert!(entry.is_undefined());
    }
}
