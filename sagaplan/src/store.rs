use std::rc::Rc;

use serde_json::Value;

/// Callback notified with every action the store dispatches.
pub type Listener = Rc<dyn Fn(&Value)>;

/// The store a saga runs against.
///
/// `put` effects dispatch through it, `select` effects read its state and
/// `take` effects wait on the actions it notifies subscribers about.
pub trait Store {
    fn dispatch(&self, action: Value);

    fn state(&self) -> Value;

    fn subscribe(&self, listener: Listener);
}
