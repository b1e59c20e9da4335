use thiserror::Error;

/// Classified failures reported by a remote `hg` query.
///
/// The set is open-ended; the poller only cares which variants are
/// permanent for the current remote configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HgError {
    #[error("authentication failed for remote '{remote}'")]
    AuthenticationFailed { remote: String },

    #[error("repository is unrelated to remote '{remote}'")]
    RepositoryIsUnrelated { remote: String },

    #[error("no default remote path configured")]
    RepositoryDefaultNotFound,

    #[error("remote repository not found at '{remote}'")]
    RepositoryNotFound { remote: String },

    #[error("cannot access remote: {message}")]
    CantAccessRemote { message: String },

    #[error("bad config file: {path}")]
    BadConfigFile { path: String },

    #[error("hg exited with code {exit_code}: {message}")]
    CommandFailed { exit_code: i32, message: String },
}

impl HgError {
    /// True for conditions tied to the remote configuration itself, where
    /// repeating the same query cannot succeed until the user changes
    /// something.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            HgError::AuthenticationFailed { .. }
                | HgError::RepositoryIsUnrelated { .. }
                | HgError::RepositoryDefaultNotFound
        )
    }
}
