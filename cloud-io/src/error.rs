use thiserror::Error;

/// Failure while reading or writing a cloud annotation record.
///
/// All of these are fatal to the whole load or save; a failed load leaves
/// the cloud untouched.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("unsupported record version {0}; versions before 20 are not readable")]
    UnsupportedVersion(u16),
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
