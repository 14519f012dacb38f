use serde_json::Value;

use crate::runtime::{Channel, Task};

/// The result an effect resolves to, fed back into the saga on resume.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    /// A plain JSON value: taken actions, call results, selected state.
    Value(Value),
    /// The handle of a forked task.
    Task(Task),
    /// A channel created by an `actionChannel` effect.
    Channel(Channel),
    /// Results of a parallel (`all`) effect, in member order.
    List(Vec<Output>),
    /// Result of a race: the winning branch key and its result.
    Race { winner: String, value: Box<Output> },
}

impl Output {
    pub fn null() -> Self {
        Output::Value(Value::Null)
    }

    /// Returns the JSON value if this output is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Output::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Converts into a JSON value.
    ///
    /// Tasks and channels become `null`, lists become arrays and races become
    /// single-key objects.
    pub fn into_value(self) -> Value {
        match self {
            Output::Value(value) => value,
            Output::Task(_) | Output::Channel(_) => Value::Null,
            Output::List(items) => Value::Array(items.into_iter().map(Output::into_value).collect()),
            Output::Race { winner, value } => {
                let mut map = serde_json::Map::new();
                map.insert(winner, value.into_value());
                Value::Object(map)
            }
        }
    }

    pub fn into_task(self) -> Option<Task> {
        match self {
            Output::Task(task) => Some(task),
            _ => None,
        }
    }

    pub fn into_channel(self) -> Option<Channel> {
        match self {
            Output::Channel(channel) => Some(channel),
            _ => None,
        }
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Value(value)
    }
}

impl From<Task> for Output {
    fn from(task: Task) -> Self {
        Output::Task(task)
    }
}
