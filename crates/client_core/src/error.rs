use thiserror::Error;

use crate::config::ConfigError;

/// Rejections raised before any request leaves the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("You can only select 2 environments")]
    EnvironmentLimit,
    #[error("Please select exactly 2 environments")]
    IncompleteSelection,
    #[error("You have already voted for environments")]
    AlreadyVotedEnvironments,
    #[error("You have already voted for this idea")]
    AlreadyVotedScript,
    #[error("Please enter a script idea")]
    EmptyScriptIdea,
    #[error("Script idea must be 500 characters or less")]
    ScriptIdeaTooLong,
    #[error("Unknown environment {0}")]
    UnknownEnvironment(String),
    #[error("A submission is already in progress")]
    SubmissionInFlight,
}

#[derive(Debug, Error)]
pub enum WorkshopError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{context}: {source}")]
    Gateway {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WorkshopError {
    pub fn gateway(context: &'static str, source: anyhow::Error) -> Self {
        Self::Gateway { context, source }
    }

    pub fn storage(context: &'static str, source: anyhow::Error) -> Self {
        Self::Storage { context, source }
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}
