use std::fmt::{self, Display};
use std::str::FromStr;

/// The closed set of callable functions.
///
/// A call node in the AST can only ever name one of these, so an expression
/// that parses is already known to stay inside the whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Builtin {
    Round,
    Min,
    Max,
    If,
    And,
    Or,
    Not,
    In,
    RegexMatch,
    Date,
    Hour,
    Weekday,
    WeekNum,
    Cf,
    Ot,
    OtLabel,
}

impl Builtin {
    pub const ALL: [Builtin; 16] = [
        Builtin::Round,
        Builtin::Min,
        Builtin::Max,
        Builtin::If,
        Builtin::And,
        Builtin::Or,
        Builtin::Not,
        Builtin::In,
        Builtin::RegexMatch,
        Builtin::Date,
        Builtin::Hour,
        Builtin::Weekday,
        Builtin::WeekNum,
        Builtin::Cf,
        Builtin::Ot,
        Builtin::OtLabel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Round => "ROUND",
            Builtin::Min => "MIN",
            Builtin::Max => "MAX",
            Builtin::If => "IF",
            Builtin::And => "AND",
            Builtin::Or => "OR",
            Builtin::Not => "NOT",
            Builtin::In => "IN",
            Builtin::RegexMatch => "REGEXMATCH",
            Builtin::Date => "DATE",
            Builtin::Hour => "HOUR",
            Builtin::Weekday => "WEEKDAY",
            Builtin::WeekNum => "WEEKNUM",
            Builtin::Cf => "CF",
            Builtin::Ot => "OT",
            Builtin::OtLabel => "OTLABEL",
        }
    }

    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL
            .iter()
            .copied()
            .find(|b| b.name().eq_ignore_ascii_case(name))
    }
}

impl Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Builtin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Builtin::from_name(s).ok_or_else(|| format!("unknown function '{s}'"))
    }
}
