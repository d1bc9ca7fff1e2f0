//! Callback registry: name → condition/action closure, injected by
//! the host before any instance is ticked. Lookups that miss at tick time
//! produce `failure` and an `error` log; they never abort the tick.

use std::collections::HashMap;

use crate::engine::tick::TickContext;
use crate::engine::tree::{LeafArg, Status};

pub type CondFn = Box<dyn for<'a> Fn(&mut TickContext<'a>, &[LeafArg]) -> Result<bool, String> + Send + Sync>;
pub type ActFn = Box<dyn for<'a> Fn(&mut TickContext<'a>, &[LeafArg]) -> Result<Status, String> + Send + Sync>;

#[derive(Default)]
pub struct CallbackRegistry {
    conditions: HashMap<String, CondFn>,
    actions: HashMap<String, ActFn>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_condition(&mut self, name: impl Into<String>, f: CondFn) {
        self.conditions.insert(name.into(), f);
    }

    pub fn register_action(&mut self, name: impl Into<String>, f: ActFn) {
        self.actions.insert(name.into(), f);
    }

    pub fn condition(&self, name: &str) -> Option<&CondFn> {
        self.conditions.get(name)
    }

    pub fn action(&self, name: &str) -> Option<&ActFn> {
        self.actions.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_condition_is_retrievable() {
        let mut reg = CallbackRegistry::new();
        reg.register_condition("always-true", Box::new(|_ctx, _args| Ok(true)));
        assert!(reg.condition("always-true").is_some());
        assert!(reg.condition("missing").is_none());
    }
}
