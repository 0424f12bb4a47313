use crate::builtins;
use crate::function::Function;
use fieldwright_parse::Builtin;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Immutable after first use: the whitelist is closed, so there is nothing
/// to register at runtime.
static REG: Lazy<FxHashMap<Builtin, Arc<dyn Function>>> = Lazy::new(|| {
    builtins::all()
        .into_iter()
        .map(|f| (f.builtin(), f))
        .collect()
});

pub fn get(builtin: Builtin) -> Option<Arc<dyn Function>> {
    REG.get(&builtin).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_has_an_implementation() {
        for b in Builtin::ALL {
            let f = get(b).unwrap_or_else(|| panic!("{b} is not registered"));
            assert_eq!(f.builtin(), b);
        }
    }
}
