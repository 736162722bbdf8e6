use crate::{Error, error::StorageError};

/// Extension trait for Result types to simplify database error mapping
///
/// Storage backends use this to fold driver errors into [`StorageError::Database`]
/// without repeating the conversion at every query site.
///
/// # Example
///
/// ```rust,ignore
/// use portcullis_core::error::utilities::DatabaseResultExt;
///
/// query.execute(&pool).await.map_db_err_with_context("Failed to clear attempts")?;
/// ```
pub trait DatabaseResultExt<T> {
    /// Convert a database error to a storage error
    fn map_db_err(self) -> Result<T, Error>;

    /// Convert a database error to a storage error with additional context
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> DatabaseResultExt<T> for Result<T, E> {
    fn map_db_err(self) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(e.to_string())))
    }

    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{context}");
            Error::Storage(StorageError::Database(format!("{context}: {e}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_result_ext() {
        let error_result: Result<i32, &str> = Err("database is locked");

        match error_result.map_db_err().unwrap_err() {
            Error::Storage(StorageError::Database(msg)) => {
                assert_eq!(msg, "database is locked");
            }
            _ => panic!("Expected storage database error"),
        }
    }

    #[test]
    fn test_database_result_ext_with_context() {
        let error_result: Result<i32, &str> = Err("timeout");

        match error_result
            .map_db_err_with_context("Failed to record failed login attempt")
            .unwrap_err()
        {
            Error::Storage(StorageError::Database(msg)) => {
                assert_eq!(msg, "Failed to record failed login attempt: timeout");
            }
            _ => panic!("Expected storage database error"),
        }
    }

    #[test]
    fn test_database_result_ext_passes_ok_through() {
        let ok: Result<i32, &str> = Ok(7);
        assert_eq!(ok.map_db_err().unwrap(), 7);
    }
}
