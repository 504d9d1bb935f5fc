mod cents;
mod helpers;

pub mod op;

pub use cents::{Cents, CentsConversionError, CENTS_PER_UNIT, DEFAULT_CURRENCY_CODE};
pub use helpers::parse_boolean_flag;
