pub mod error;
pub mod record;

pub use error::RecordError;
pub use record::{load_record, save_record, RECORD_VERSION};
