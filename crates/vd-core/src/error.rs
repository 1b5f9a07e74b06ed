use thiserror::Error;

pub type VdResult<T> = Result<T, VdError>;

#[derive(Debug, Error)]
pub enum VdError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let err: VdError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, VdError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: gone");
    }
}
