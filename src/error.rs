use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider rate limited: {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Tool execution error: tool={tool_name}, {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid tool input: tool={tool_name}, {message}")]
    InvalidToolInput { tool_name: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("No backend config saved")]
    NoConfig,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type SeedResult<T> = Result<T, SeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let err = SeedError::Provider("connection refused".into());
        assert_eq!(err.to_string(), "Provider error: connection refused");

        let err = SeedError::RateLimited {
            provider: "anthropic".into(),
            retry_after_ms: 5000,
        };
        assert!(err.to_string().contains("5000ms"));

        let err = SeedError::ToolExecution {
            tool_name: "web_fetch".into(),
            message: "timed out".into(),
        };
        assert!(err.to_string().contains("web_fetch"));

        let err = SeedError::UnknownTool("teleport".into());
        assert_eq!(err.to_string(), "Unknown tool: teleport");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SeedError>();
    }

    #[test]
    fn sqlite_error_converts() {
        let err: SeedError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, SeedError::Storage(_)));
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: SeedError = json_err.into();
        assert!(matches!(err, SeedError::Serialization(_)));
    }
}
