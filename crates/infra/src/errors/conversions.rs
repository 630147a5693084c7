//! Conversions from external infrastructure errors into domain errors.

use caresync_common::KeychainError;
use caresync_domain::CareSyncError;
use keyring::Error as KeyringError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CareSyncError);

impl From<InfraError> for CareSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CareSyncError> for InfraError {
    fn from(value: CareSyncError) -> Self {
        InfraError(value)
    }
}

trait IntoCareSyncError {
    fn into_caresync(self) -> CareSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CareSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCareSyncError for SqlError {
    fn into_caresync(self) -> CareSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        CareSyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        CareSyncError::Database("database is locked".into())
                    }
                    // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        CareSyncError::InvalidInput("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        CareSyncError::Database("foreign key constraint violation".into())
                    }
                    (ErrorCode::NotADatabase, _) => {
                        CareSyncError::Database("file is not a database".into())
                    }
                    _ => CareSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => CareSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CareSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                CareSyncError::Database(format!("invalid column type for {name}: {ty}"))
            }
            RE::Utf8Error(_) => CareSyncError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidPath(path) => CareSyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => CareSyncError::Database("invalid SQL query".into()),
            other => CareSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_caresync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → CareSyncError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(CareSyncError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* keyring::Error / KeychainError → CareSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCareSyncError for KeyringError {
    fn into_caresync(self) -> CareSyncError {
        use KeyringError::*;

        let description = self.to_string();

        match self {
            NoEntry => CareSyncError::NotFound("keychain entry not found".into()),
            BadEncoding(_) => {
                CareSyncError::Security("credential in keychain is not valid UTF-8".into())
            }
            TooLong(name, limit) => CareSyncError::Security(format!(
                "keychain attribute '{name}' exceeds platform limit ({limit})"
            )),
            Invalid(attr, reason) => {
                CareSyncError::Security(format!("keychain attribute '{attr}' is invalid: {reason}"))
            }
            Ambiguous(entries) => CareSyncError::Security(format!(
                "multiple keychain entries matched request ({} results)",
                entries.len()
            )),
            PlatformFailure(err) => {
                CareSyncError::Security(format!("keychain platform error: {err}"))
            }
            NoStorageAccess(err) => {
                CareSyncError::Security(format!("unable to access secure storage: {err}"))
            }
            _ => CareSyncError::Security(description),
        }
    }
}

impl From<KeyringError> for InfraError {
    fn from(value: KeyringError) -> Self {
        InfraError(value.into_caresync())
    }
}

impl From<KeychainError> for InfraError {
    fn from(value: KeychainError) -> Self {
        InfraError(match value {
            KeychainError::NotFound => CareSyncError::NotFound("keychain entry not found".into()),
            KeychainError::AccessFailed(message) => CareSyncError::Security(message),
        })
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → CareSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCareSyncError for HttpError {
    fn into_caresync(self) -> CareSyncError {
        if self.is_timeout() {
            return CareSyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return CareSyncError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => CareSyncError::Auth(message),
                404 => CareSyncError::NotFound(message),
                429 => CareSyncError::Network(message),
                400..=499 => CareSyncError::InvalidInput(message),
                _ => CareSyncError::Network(message),
            };
        }

        if self.is_decode() {
            return CareSyncError::InvalidInput("malformed HTTP response body".into());
        }

        CareSyncError::Network(self.without_url().to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_caresync())
    }
}
