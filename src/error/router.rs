use thiserror::Error;

use super::TransportError;

/// Ошибки маршрутизатора каналов.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("failed to decode JSON payload on channel '{channel}': {reason}")]
    Decode { channel: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_error_display() {
        let err = RouterError::InvalidPattern {
            pattern: "[".into(),
            reason: "unclosed character class".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid glob pattern '[': unclosed character class"
        );

        let err = RouterError::Decode {
            channel: "news".into(),
            reason: "EOF".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to decode JSON payload on channel 'news': EOF"
        );
    }

    #[test]
    fn test_transport_conversion() {
        let err: RouterError = TransportError::NotReady.into();
        assert!(matches!(err, RouterError::Transport(TransportError::NotReady)));
        assert_eq!(err.to_string(), "transport error: transport is not ready");
    }
}
