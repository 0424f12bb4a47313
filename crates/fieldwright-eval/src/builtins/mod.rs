pub mod context;
pub mod datetime;
pub mod logical;
pub mod math;
pub mod pattern;

use crate::function::Function;
use std::sync::Arc;

/// One implementation per whitelisted builtin.
pub fn all() -> Vec<Arc<dyn Function>> {
    vec![
        Arc::new(math::RoundFn),
        Arc::new(math::MinFn),
        Arc::new(math::MaxFn),
        Arc::new(logical::IfFn),
        Arc::new(logical::AndFn),
        Arc::new(logical::OrFn),
        Arc::new(logical::NotFn),
        Arc::new(logical::InFn),
        Arc::new(pattern::RegexMatchFn),
        Arc::new(datetime::DateFn),
        Arc::new(datetime::HourFn),
        Arc::new(datetime::WeekdayFn),
        Arc::new(datetime::WeekNumFn),
        Arc::new(context::CfFn),
        Arc::new(context::OtFn),
        Arc::new(context::OtLabelFn),
    ]
}
