//! Exit codes for the ax-core CLI.
//!
//! Exit codes communicate operation outcome without requiring output
//! parsing. These are a stable contract for automation; changes
//! require a major version bump.

/// Exit codes for ax-core operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Ok = 0,

    /// Configuration invalid or unreadable.
    ConfigError = 2,

    /// Runtime failure inside the scheduler or an engine.
    RuntimeError = 3,

    /// Persistence failure (save/load).
    PersistenceError = 4,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<&ax_common::Error> for ExitCode {
    fn from(err: &ax_common::Error) -> Self {
        use ax_common::ErrorCategory;
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Persistence | ErrorCategory::Io => ExitCode::PersistenceError,
            _ => ExitCode::RuntimeError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_common::Error;

    #[test]
    fn codes_are_the_documented_contract() {
        assert_eq!(ExitCode::Ok.code(), 0);
        assert_eq!(ExitCode::ConfigError.code(), 2);
        assert_eq!(ExitCode::RuntimeError.code(), 3);
        assert_eq!(ExitCode::PersistenceError.code(), 4);
    }

    #[test]
    fn categories_map_to_codes() {
        assert_eq!(
            ExitCode::from(&Error::Config("x".into())),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::from(&Error::Persistence("x".into())),
            ExitCode::PersistenceError
        );
        assert_eq!(
            ExitCode::from(&Error::NoCandidatePolicies),
            ExitCode::RuntimeError
        );
    }
}
