use thiserror::Error;

/// Ошибки транспорта pub/sub.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is not ready")]
    NotReady,

    #[error("transport is closed")]
    Closed,

    #[error("{command} rejected: {reason}")]
    Rejected { command: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        assert_eq!(TransportError::Closed.to_string(), "transport is closed");
        let err = TransportError::Rejected {
            command: "PSUBSCRIBE".into(),
            reason: "no patterns".into(),
        };
        assert_eq!(err.to_string(), "PSUBSCRIBE rejected: no patterns");
    }
}
