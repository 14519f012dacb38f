use crate::{Effect, EffectTag};

use super::{EffectMatcher, EffectStores, report};

/// What an expectation looks for in its tag's store.
#[derive(Debug, Clone)]
pub(crate) enum Expected {
    Exact(Effect),
    Like(EffectMatcher),
}

/// One registered effect assertion, checked after the run.
#[derive(Debug, Clone)]
pub(crate) struct Expectation {
    pub(crate) effect_name: String,
    pub(crate) tag: EffectTag,
    pub(crate) expected: Expected,
    pub(crate) expect_to_have: bool,
}

impl Expectation {
    fn describe(&self) -> String {
        match &self.expected {
            Expected::Exact(effect) => effect.to_string(),
            Expected::Like(matcher) => matcher.to_string(),
        }
    }

    /// Consumes one matching effect from `stores`. Returns the failure
    /// message if the outcome disagrees with the polarity. Tags the harness
    /// does not record fail either way.
    pub(crate) fn check(&self, stores: &mut EffectStores) -> Option<String> {
        let Some(store) = stores.get_mut(self.tag) else {
            return Some(report::unrecorded(&self.effect_name, &self.describe()));
        };
        let deleted = match &self.expected {
            Expected::Exact(effect) => store.delete(effect),
            Expected::Like(matcher) => store.delete_by(|effect| matcher.matches(effect)),
        };

        match (deleted, self.expect_to_have) {
            (true, true) | (false, false) => None,
            (true, false) => Some(format!(
                "\n{} expectation unmet:\n\nNot Expected\n------------\n{}\n",
                self.effect_name,
                self.describe()
            )),
            (false, true) => {
                let mut message = format!(
                    "\n{} expectation unmet:\n\nExpected\n--------\n{}\n",
                    self.effect_name,
                    self.describe()
                );
                message.push_str(&report::actual_effects(store, &self.effect_name));
                if let Expected::Exact(effect) = &self.expected {
                    if let Some(closest) = report::closest_mismatch(store, effect) {
                        message.push_str(&closest);
                    }
                }
                Some(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{effects, testing::Like};

    fn exact(effect: Effect, expect_to_have: bool) -> Expectation {
        Expectation {
            effect_name: effect.tag().as_str().to_lowercase(),
            tag: effect.tag(),
            expected: Expected::Exact(effect),
            expect_to_have,
        }
    }

    #[test]
    fn each_expectation_consumes_one_effect() {
        let put = effects::put(json!({"type": "DONE"}));
        let mut stores = EffectStores::default();
        stores.put.add(put.clone());

        assert_eq!(exact(put.clone(), true).check(&mut stores), None);
        let second = exact(put, true).check(&mut stores);
        assert!(second.is_some_and(|m| m.contains("No put effects were yielded")));
    }

    #[test]
    fn negated_expectation_reports_not_expected() {
        let put = effects::put(json!({"type": "DONE"}));
        let mut stores = EffectStores::default();
        stores.put.add(put.clone());

        let message = exact(put, false).check(&mut stores);
        assert_eq!(
            message.as_deref(),
            Some("\nput expectation unmet:\n\nNot Expected\n------------\nput({\"type\":\"DONE\"})\n")
        );
    }

    #[test]
    fn like_expectation_uses_matcher() {
        let mut stores = EffectStores::default();
        stores.put.add(effects::put(json!({"type": "DONE", "payload": 3})));
        let like = Expectation {
            effect_name: "put".into(),
            tag: EffectTag::Put,
            expected: Expected::Like(Like::action(json!({"type": "DONE"})).into()),
            expect_to_have: true,
        };
        assert_eq!(like.check(&mut stores), None);
        assert!(stores.put.is_empty());
    }

    #[test]
    fn unrecorded_tags_fail_in_both_polarities() {
        let mut stores = EffectStores::default();
        for expect_to_have in [true, false] {
            let message = exact(effects::cancelled(), expect_to_have).check(&mut stores);
            assert_eq!(
                message.as_deref(),
                Some(
                    "\ncancelled expectation unmet:\n\ncancelled effects are not recorded by expect_saga; assert them with test_saga\n------------\ncancelled()\n"
                )
            );
        }
    }
}
