use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use fieldwright_common::{EvalError, Value};
use fieldwright_parse::Builtin;
use regex::{Regex, RegexBuilder};

pub const MAX_PATTERN_LEN: usize = 100;
pub const MAX_FLAGS_LEN: usize = 10;
pub const MAX_GROUP_DEPTH: usize = 10;

/// Reject patterns that are expensive or that use constructs outside the
/// supported subset. Every violation names the limit it breaks.
pub fn check_pattern(pattern: &str, flags: &str) -> Result<(), EvalError> {
    let len = pattern.chars().count();
    if len > MAX_PATTERN_LEN {
        return Err(EvalError::security(format!(
            "REGEXMATCH pattern length {len} exceeds the limit of {MAX_PATTERN_LEN} characters"
        )));
    }
    let flags_len = flags.chars().count();
    if flags_len > MAX_FLAGS_LEN {
        return Err(EvalError::security(format!(
            "REGEXMATCH flags length {flags_len} exceeds the limit of {MAX_FLAGS_LEN} characters"
        )));
    }
    if pattern.contains("(?") {
        return Err(EvalError::security(
            "REGEXMATCH patterns may not use '(?' constructs (lookaround, conditionals, inline flags)",
        ));
    }
    let depth = pattern.matches('(').count();
    if depth > MAX_GROUP_DEPTH {
        return Err(EvalError::security(format!(
            "REGEXMATCH pattern has {depth} groups, exceeding the nesting limit of {MAX_GROUP_DEPTH}"
        )));
    }
    Ok(())
}

/// `i`, `m` and `s` map onto matcher options; `g`, `u` and `y` have no
/// meaning for a yes/no match and are accepted as no-ops.
pub fn compile(pattern: &str, flags: &str) -> Result<Regex, EvalError> {
    check_pattern(pattern, flags)?;
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'g' | 'u' | 'y' => {}
            other => {
                return Err(EvalError::invalid_value(format!(
                    "unsupported REGEXMATCH flag '{other}'"
                )));
            }
        }
    }
    builder
        .size_limit(1 << 20)
        .build()
        .map_err(|e| EvalError::invalid_value(format!("invalid REGEXMATCH pattern: {e}")))
}

/* ─────────────────── REGEXMATCH(text, pattern, flags?) ─────────────────── */

#[derive(Debug)]
pub struct RegexMatchFn;

impl Function for RegexMatchFn {
    fn builtin(&self) -> Builtin {
        Builtin::RegexMatch
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        let pattern = args[1].text()?;
        let flags = match args.get(2) {
            Some(f) => f.text()?,
            None => String::new(),
        };
        let re = compile(&pattern, &flags)?;
        let text = args[0].text()?;
        Ok(Value::Boolean(re.is_match(&text)))
    }
}
