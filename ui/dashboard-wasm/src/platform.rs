//! Native host plumbing: the injected Android/iOS objects, the window
//! `message` listener, and the direct entry point `window.ShareVestBridge`.

use crate::dom;
use gloo_utils::format::JsValueSerdeExt;
use js_sys::{Function, Object, Reflect};
use serde_json::Value;
use std::cell::RefCell;
use sv_webview::bridge::{ANDROID_INTERFACE, DIRECT_ENTRY_POINT, IOS_MESSAGE_HANDLER};
use sv_webview::{BridgeError, HostInterface, InboundSink, InboundSource, Navigator, RawInbound};
use tracing::debug;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::MessageEvent;

fn lookup(target: &JsValue, key: &str) -> Option<JsValue> {
    Reflect::get(target, &JsValue::from_str(key))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

fn call_post_message(target: &JsValue, arg: &JsValue, host: &'static str) -> Result<(), BridgeError> {
    let post = lookup(target, "postMessage")
        .and_then(|f| f.dyn_into::<Function>().ok())
        .ok_or(BridgeError::MissingHost(host))?;
    post.call1(target, arg)
        .map(|_| ())
        .map_err(|err| BridgeError::Host(format!("{err:?}")))
}

pub struct BrowserHost;

impl HostInterface for BrowserHost {
    fn post_android(&self, json: &str) -> Result<(), BridgeError> {
        let window = dom::window().ok_or(BridgeError::MissingHost(ANDROID_INTERFACE))?;
        let interface = lookup(&window, ANDROID_INTERFACE).ok_or(BridgeError::MissingHost(ANDROID_INTERFACE))?;
        call_post_message(&interface, &JsValue::from_str(json), ANDROID_INTERFACE)
    }

    fn post_ios(&self, message: &Value) -> Result<(), BridgeError> {
        let window = dom::window().ok_or(BridgeError::MissingHost(IOS_MESSAGE_HANDLER))?;
        let handler = lookup(&window, "webkit")
            .and_then(|webkit| lookup(&webkit, "messageHandlers"))
            .and_then(|handlers| lookup(&handlers, IOS_MESSAGE_HANDLER))
            .ok_or(BridgeError::MissingHost(IOS_MESSAGE_HANDLER))?;
        let message = JsValue::from_serde(message)?;
        call_post_message(&handler, &message, IOS_MESSAGE_HANDLER)
    }
}

/// Event `data` (or a direct-call argument) as the bridge understands it.
fn raw_from_js(data: JsValue) -> Option<RawInbound> {
    if let Some(text) = data.as_string() {
        return Some(RawInbound::Text(text));
    }
    match serde_wasm_bindgen::from_value::<Value>(data) {
        Ok(value) => Some(RawInbound::Json(value)),
        Err(err) => {
            debug!("ignoring non-JSON inbound data: {err}");
            None
        }
    }
}

struct Attached {
    on_message: Closure<dyn FnMut(MessageEvent)>,
    _receive: Closure<dyn FnMut(JsValue)>,
}

#[derive(Default)]
pub struct WindowInbound {
    attached: RefCell<Option<Attached>>,
}

impl InboundSource for WindowInbound {
    fn attach(&self, sink: InboundSink) -> Result<(), BridgeError> {
        self.detach();
        let window = dom::window().ok_or_else(|| BridgeError::Attach("no window".to_owned()))?;

        let message_sink = sink.clone();
        let on_message = Closure::wrap(Box::new(move |event: MessageEvent| {
            if let Some(raw) = raw_from_js(event.data()) {
                message_sink(raw);
            }
        }) as Box<dyn FnMut(_)>);
        window
            .add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())
            .map_err(|err| BridgeError::Attach(format!("{err:?}")))?;

        let receive = Closure::wrap(Box::new(move |data: JsValue| {
            if let Some(raw) = raw_from_js(data) {
                sink(raw);
            }
        }) as Box<dyn FnMut(_)>);
        let entry = Object::new();
        let installed = Reflect::set(&entry, &JsValue::from_str("receive"), receive.as_ref())
            .and_then(|_| Reflect::set(&window, &JsValue::from_str(DIRECT_ENTRY_POINT), &entry));
        if let Err(err) = installed {
            let _ = window.remove_event_listener_with_callback("message", on_message.as_ref().unchecked_ref());
            return Err(BridgeError::Attach(format!("{err:?}")));
        }

        *self.attached.borrow_mut() = Some(Attached {
            on_message,
            _receive: receive,
        });
        Ok(())
    }

    fn detach(&self) {
        let Some(attached) = self.attached.borrow_mut().take() else {
            return;
        };
        if let Some(window) = dom::window() {
            let _ = window
                .remove_event_listener_with_callback("message", attached.on_message.as_ref().unchecked_ref());
            let _ = Reflect::delete_property(&window, &JsValue::from_str(DIRECT_ENTRY_POINT));
        }
    }
}

pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, path: &str) {
        dom::assign_location(path);
    }
}
