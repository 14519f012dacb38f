use std::fmt;

/// The kind of an [`Effect`](crate::Effect).
///
/// Harness collections, providers and expectations are all keyed by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum EffectTag {
    Take,
    Put,
    Call,
    Cps,
    Fork,
    Select,
    Race,
    Parallel,
    ActionChannel,
    Promise,
    Cancel,
    Cancelled,
    Join,
    Flush,
    /// Not an effect: a plain value yielded by the saga.
    None,
}

impl EffectTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectTag::Take => "TAKE",
            EffectTag::Put => "PUT",
            EffectTag::Call => "CALL",
            EffectTag::Cps => "CPS",
            EffectTag::Fork => "FORK",
            EffectTag::Select => "SELECT",
            EffectTag::Race => "RACE",
            EffectTag::Parallel => "PARALLEL",
            EffectTag::ActionChannel => "ACTION_CHANNEL",
            EffectTag::Promise => "PROMISE",
            EffectTag::Cancel => "CANCEL",
            EffectTag::Cancelled => "CANCELLED",
            EffectTag::Join => "JOIN",
            EffectTag::Flush => "FLUSH",
            EffectTag::None => "NONE",
        }
    }

    /// Returns `true` for tags the harness keeps a collection for.
    pub fn is_stored(&self) -> bool {
        matches!(
            self,
            EffectTag::Take
                | EffectTag::Put
                | EffectTag::Race
                | EffectTag::Call
                | EffectTag::Cps
                | EffectTag::Fork
                | EffectTag::Select
                | EffectTag::ActionChannel
                | EffectTag::Promise
        )
    }
}

impl fmt::Display for EffectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
