pub mod error;
pub mod types;
pub mod value;

pub use error::{ReportError, Result};
pub use types::{CommandAttribute, CommandEntry, CommandId};
pub use value::AttributeValue;
