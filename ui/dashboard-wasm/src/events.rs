//! Event wiring.
//!
//! Window connectivity events go to the host as `NETWORK_STATUS`; local
//! signals are re-dispatched on `window` as DOM events so page code can
//! observe them, and drive the matching app reactions.

use crate::dom;
use crate::state::App;
use std::rc::Rc;
use sv_webview::LocalSignal;
use tracing::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// A `window` listener owned by the app; removed again on teardown.
pub struct WindowListener {
    event: &'static str,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

impl WindowListener {
    pub fn remove(&self) {
        if let Some(window) = dom::window() {
            let _ = window.remove_event_listener_with_callback(self.event, self.callback.as_ref().unchecked_ref());
        }
    }
}

fn on_window_event(event: &'static str, handler: impl FnMut(web_sys::Event) + 'static) -> Option<WindowListener> {
    let window = dom::window()?;
    let callback = Closure::wrap(Box::new(handler) as Box<dyn FnMut(web_sys::Event)>);
    if let Err(err) = window.add_event_listener_with_callback(event, callback.as_ref().unchecked_ref()) {
        warn!("could not listen for {event}: {err:?}");
        return None;
    }
    Some(WindowListener { event, callback })
}

pub fn bind_network_status(app: &Rc<App>) {
    for (event, online) in [("online", true), ("offline", false)] {
        let bridge = Rc::downgrade(&app.bridge);
        let listener = on_window_event(event, move |_| {
            if let Some(bridge) = bridge.upgrade() {
                bridge.network_status(online);
            }
        });
        app.window_listeners.borrow_mut().extend(listener);
    }
}

fn dispatch_dom_event(name: &str) {
    let Some(window) = dom::window() else { return };
    match web_sys::CustomEvent::new(name) {
        Ok(event) => {
            let _ = window.dispatch_event(&event);
        }
        Err(err) => warn!("could not create {name} event: {err:?}"),
    }
}

pub fn bind_signals(app: &Rc<App>) {
    let weak = Rc::downgrade(app);
    app.signals.subscribe(move |signal| {
        dispatch_dom_event(signal.event_name());
        let Some(app) = weak.upgrade() else { return };
        match signal {
            LocalSignal::AuthTokenUpdated | LocalSignal::LogoutRequested => {
                app.bridge.send(&app.auth.auth_state_message());
            }
            LocalSignal::RefreshRequested => {
                let theme = app.theme.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    theme.refresh().await;
                });
            }
        }
    });
}
