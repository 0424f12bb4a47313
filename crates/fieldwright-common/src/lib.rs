pub mod coercion;
pub mod diagnostic;
pub mod dictionary;
pub mod error;
pub mod formula;
pub mod record;
pub mod time;
pub mod value;

pub use diagnostic::*;
pub use dictionary::*;
pub use error::*;
pub use formula::*;
pub use record::*;
pub use value::*;
