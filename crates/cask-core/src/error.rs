use thiserror::Error;

pub type CaskResult<T> = Result<T, CaskError>;

#[derive(Debug, Error)]
pub enum CaskError {
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("chunk size {0} outside the accepted range")]
    ChunkSizeTooLarge(u32),

    #[error("authentication failed: wrong key or tampered data")]
    AuthFailed,

    #[error("sealed stream truncated")]
    Truncated,

    #[error("chunk out of order: expected {expected}, found {found}")]
    OutOfOrder { expected: u32, found: u32 },

    #[error("writer already finished")]
    AlreadyClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaskError {
    /// Recovers a domain error that one of the streaming layers wrapped
    /// into an `io::Error`; anything else becomes [`CaskError::Io`].
    pub fn from_io(err: std::io::Error) -> Self {
        match err.downcast::<CaskError>() {
            Ok(domain) => domain,
            Err(err) => CaskError::Io(err),
        }
    }
}

impl From<CaskError> for std::io::Error {
    fn from(err: CaskError) -> Self {
        use std::io::ErrorKind;
        match err {
            CaskError::Io(inner) => inner,
            other @ CaskError::Truncated => {
                std::io::Error::new(ErrorKind::UnexpectedEof, other)
            }
            other @ CaskError::AlreadyClosed => std::io::Error::other(other),
            other => std::io::Error::new(ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn round_trips_through_io_error() {
        let io_err: io::Error = CaskError::AuthFailed.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        assert!(matches!(
            CaskError::from_io(io_err),
            CaskError::AuthFailed
        ));

        let io_err: io::Error = CaskError::Truncated.into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(matches!(CaskError::from_io(io_err), CaskError::Truncated));
    }

    #[test]
    fn plain_io_error_stays_io() {
        let err = CaskError::from_io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(matches!(err, CaskError::Io(_)));
    }

    #[test]
    fn out_of_order_carries_indices() {
        let err = CaskError::OutOfOrder {
            expected: 3,
            found: 7,
        };
        assert_eq!(err.to_string(), "chunk out of order: expected 3, found 7");
    }
}
