//! DOM helpers and the document-root theme surface.
//!
//! Every helper tolerates a missing `window`/`document` (workers, prerender)
//! by doing nothing.

use std::cell::RefCell;
use std::rc::Rc;
use sv_theme::{ColorScheme, DocumentSurface, THEME_APPLIED_ATTRIBUTE};
use sv_webview::RuntimeProbe;
use tracing::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, HtmlElement, MediaQueryList, Window};

const DARK_SCHEME_QUERY: &str = "(prefers-color-scheme: dark)";

pub fn window() -> Option<Window> {
    web_sys::window()
}

pub fn document() -> Option<Document> {
    window()?.document()
}

fn root() -> Option<Element> {
    document()?.document_element()
}

pub fn origin() -> String {
    window()
        .and_then(|w| w.location().origin().ok())
        .unwrap_or_default()
}

pub fn meta_content(name: &str) -> Option<String> {
    let selector = format!("meta[name=\"{name}\"]");
    document()?
        .query_selector(&selector)
        .ok()??
        .get_attribute("content")
}

/// The inputs environment detection reads; `None` outside a browser window.
pub fn runtime_probe() -> Option<RuntimeProbe> {
    let window = window()?;
    Some(RuntimeProbe {
        user_agent: window.navigator().user_agent().unwrap_or_default(),
        query: window.location().search().unwrap_or_default(),
    })
}

pub fn query_string() -> String {
    window()
        .and_then(|w| w.location().search().ok())
        .unwrap_or_default()
}

/// Full navigation to a same-origin path.
pub fn assign_location(path: &str) {
    if let Some(window) = window() {
        if let Err(err) = window.location().assign(path) {
            warn!("navigation to {path} failed: {err:?}");
        }
    }
}

fn dark_scheme_query() -> Option<MediaQueryList> {
    window()?.match_media(DARK_SCHEME_QUERY).ok()?
}

struct SchemeWatch {
    query: MediaQueryList,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

/// Writes theme state onto `<html>`.
#[derive(Default)]
pub struct BrowserDocument {
    watch: RefCell<Option<SchemeWatch>>,
}

impl DocumentSurface for BrowserDocument {
    fn set_color_scheme(&self, scheme: ColorScheme) {
        let Some(root) = root() else { return };
        let classes = root.class_list();
        let _ = classes.remove_1(scheme.other().class_name());
        let _ = classes.add_1(scheme.class_name());
    }

    fn set_style_var(&self, name: &str, value: &str) {
        let Some(root) = root() else { return };
        let Some(root) = root.dyn_ref::<HtmlElement>() else { return };
        if let Err(err) = root.style().set_property(name, value) {
            warn!("could not set {name}: {err:?}");
        }
    }

    fn set_title(&self, title: &str) {
        if let Some(document) = document() {
            document.set_title(title);
        }
    }

    fn mark_theme_applied(&self) {
        if let Some(root) = root() {
            let _ = root.set_attribute(THEME_APPLIED_ATTRIBUTE, "true");
        }
    }

    fn prefers_dark(&self) -> bool {
        dark_scheme_query().is_some_and(|q| q.matches())
    }

    fn watch_color_scheme(&self, on_change: Rc<dyn Fn()>) -> bool {
        self.unwatch_color_scheme();
        let Some(query) = dark_scheme_query() else { return false };
        let callback = Closure::wrap(Box::new(move |_: web_sys::Event| on_change()) as Box<dyn FnMut(_)>);
        if let Err(err) = query.add_event_listener_with_callback("change", callback.as_ref().unchecked_ref()) {
            warn!("could not watch color scheme: {err:?}");
            return false;
        }
        *self.watch.borrow_mut() = Some(SchemeWatch { query, callback });
        true
    }

    fn unwatch_color_scheme(&self) {
        if let Some(watch) = self.watch.borrow_mut().take() {
            let _ = watch
                .query
                .remove_event_listener_with_callback("change", watch.callback.as_ref().unchecked_ref());
        }
    }
}
