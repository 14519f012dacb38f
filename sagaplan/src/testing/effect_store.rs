use crate::{Effect, EffectTag};

/// An unordered multiset of effects of one tag.
///
/// Each expectation consumes at most one entry, so two identical effects
/// satisfy two identical expectations.
#[derive(Debug, Clone, Default)]
pub struct EffectStore {
    effects: Vec<Effect>,
}

impl EffectStore {
    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Removes one entry equal to `effect`. Returns false if none was found.
    pub fn delete(&mut self, effect: &Effect) -> bool {
        self.delete_by(|candidate| candidate == effect)
    }

    /// Removes the first entry satisfying `predicate`.
    pub fn delete_by(&mut self, predicate: impl Fn(&Effect) -> bool) -> bool {
        match self.effects.iter().position(predicate) {
            Some(index) => {
                self.effects.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> &[Effect] {
        &self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

/// One [`EffectStore`] per effect tag the harness records.
#[derive(Debug, Clone, Default)]
pub struct EffectStores {
    pub take: EffectStore,
    pub put: EffectStore,
    pub race: EffectStore,
    pub call: EffectStore,
    pub cps: EffectStore,
    pub fork: EffectStore,
    pub select: EffectStore,
    pub action_channel: EffectStore,
    pub promise: EffectStore,
}

impl EffectStores {
    /// The store for `tag`, or `None` for tags that are not recorded.
    pub fn get(&self, tag: EffectTag) -> Option<&EffectStore> {
        Some(match tag {
            EffectTag::Take => &self.take,
            EffectTag::Put => &self.put,
            EffectTag::Race => &self.race,
            EffectTag::Call => &self.call,
            EffectTag::Cps => &self.cps,
            EffectTag::Fork => &self.fork,
            EffectTag::Select => &self.select,
            EffectTag::ActionChannel => &self.action_channel,
            EffectTag::Promise => &self.promise,
            _ => return None,
        })
    }

    pub fn get_mut(&mut self, tag: EffectTag) -> Option<&mut EffectStore> {
        Some(match tag {
            EffectTag::Take => &mut self.take,
            EffectTag::Put => &mut self.put,
            EffectTag::Race => &mut self.race,
            EffectTag::Call => &mut self.call,
            EffectTag::Cps => &mut self.cps,
            EffectTag::Fork => &mut self.fork,
            EffectTag::Select => &mut self.select,
            EffectTag::ActionChannel => &mut self.action_channel,
            EffectTag::Promise => &mut self.promise,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::effects;

    #[test]
    fn delete_consumes_one_entry() {
        let mut store = EffectStore::default();
        let put = effects::put(json!({"type": "DONE"}));
        store.add(put.clone());
        store.add(put.clone());

        assert!(store.delete(&put));
        assert_eq!(store.len(), 1);
        assert!(store.delete(&put));
        assert!(!store.delete(&put));
        assert!(store.is_empty());
    }

    #[test]
    fn delete_by_removes_first_match_only() {
        let mut store = EffectStore::default();
        store.add(effects::take("A"));
        store.add(effects::take("B"));
        store.add(effects::take("B"));

        assert!(store.delete_by(|e| *e == effects::take("B")));
        assert_eq!(store.values(), &[effects::take("A"), effects::take("B")]);
    }

    #[test]
    fn unrecorded_tags_have_no_store() {
        let mut stores = EffectStores::default();
        assert!(stores.get(EffectTag::Join).is_none());
        assert!(stores.get_mut(EffectTag::Parallel).is_none());

        if let Some(store) = stores.get_mut(EffectTag::Put) {
            store.add(effects::put(json!({"type": "X"})));
        }
        assert_eq!(stores.put.len(), 1);
    }
}
