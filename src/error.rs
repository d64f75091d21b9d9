// Error types for the policy route simulator

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("failed to parse route line: {0}")]
    RouteParse(String),

    #[error("failed to parse rule line: {0}")]
    RuleParse(String),

    #[error("failed to execute command: {0}")]
    CommandExecution(String),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Convert error to user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::RouteParse(line) => {
                format!("Could not understand route line: {}", line)
            }
            AppError::RuleParse(line) => {
                format!("Could not understand rule line: {}", line)
            }
            AppError::CommandExecution(cmd) => {
                format!(
                    "Failed to execute command: {}. Make sure iproute2 is installed.",
                    cmd
                )
            }
            AppError::InvalidPacket(msg) => {
                format!("Invalid packet description: {}", msg)
            }
            AppError::Config(_) => {
                "Configuration error. Check your config file or command-line arguments."
                    .to_string()
            }
            AppError::Io(_) => "File system error. Check permissions and paths.".to_string(),
            AppError::Serialization(_) => {
                "Data format error. This might be a bug, please report it.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_names_the_line() {
        let err = AppError::RouteParse("192.25.25.0/24 dev".to_string());
        assert!(err.user_message().contains("192.25.25.0/24 dev"));
    }
}
