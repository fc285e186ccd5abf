//! Non-fatal diagnostics.
//!
//! Every diagnostic goes out through `tracing` at warn level. A host may also
//! install a per-thread handler to surface the messages elsewhere (a dev
//! overlay, a test assertion).

use std::cell::RefCell;
use std::rc::Rc;

type WarnHandler = Rc<dyn Fn(&str)>;

thread_local! {
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = const { RefCell::new(None) };
}

/// Install (or with `None`, remove) the warn handler for this thread.
///
/// Returns the previously installed handler.
pub fn set_warn_handler(handler: Option<Rc<dyn Fn(&str)>>) -> Option<Rc<dyn Fn(&str)>> {
    WARN_HANDLER.with(|h| h.replace(handler))
}

pub(crate) fn warn(message: &str) {
    tracing::warn!(target: "tether::reactivity", "{message}");
    // Clone out so the handler may itself install a new handler.
    let handler = WARN_HANDLER.with(|h| h.borrow().clone());
    if let Some(handler) = handler {
        handler(message);
    }
}
