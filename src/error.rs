//! Error types for the dictation gateway.

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A required lexicon/config key is absent from the loaded documents.
    #[error("missing configuration key: {0}")]
    ConfigMissing(String),

    /// The pairing code does not exist.
    #[error("invalid pairing code")]
    InvalidCode,

    /// The pairing code has passed its expiry time.
    #[error("pairing code expired")]
    CodeExpired,

    /// The channel already holds a device of the requested type.
    #[error("channel full")]
    ChannelFull,

    /// The channel has no backing pairing record.
    #[error("invalid channel")]
    InvalidChannel,

    /// The pairing code was already claimed by another mobile device.
    #[error("code already paired")]
    AlreadyPaired,

    /// Admission token failed signature or structural checks.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Admission token is past its expiry.
    #[error("token expired")]
    TokenExpired,

    /// A message or request does not satisfy the protocol schema.
    #[error("validation error: {0}")]
    Validation(String),

    /// Per-connection rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// Audio exceeds the upload cap or a control frame exceeds its cap.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// The audio container format is not accepted.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The ASR collaborator did not answer within its deadline.
    #[error("upstream timeout")]
    UpstreamTimeout,

    /// The ASR collaborator rejected the request.
    #[error("upstream rejected request: {0}")]
    UpstreamRejected(String),

    /// The ASR collaborator could not be reached.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Lexicon store read or decode error.
    #[error("lexicon store error: {0}")]
    Store(String),

    /// Unexpected invariant violation.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Stable wire code for error frames and REST envelopes.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::ConfigMissing(_) => "CONFIG_MISSING",
            Self::InvalidCode => "INVALID_CODE",
            Self::CodeExpired => "CODE_EXPIRED",
            Self::ChannelFull => "CHANNEL_FULL",
            Self::InvalidChannel => "INVALID_CHANNEL",
            Self::AlreadyPaired => "ALREADY_PAIRED",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            Self::UpstreamRejected(_) => "UPSTREAM_REJECTED",
            Self::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::Store(_) => "UPSTREAM_UNAVAILABLE",
            Self::Internal(_) | Self::Io(_) => "INTERNAL",
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(GatewayError::InvalidCode.wire_code(), "INVALID_CODE");
        assert_eq!(GatewayError::RateLimited.wire_code(), "RATE_LIMITED");
        assert_eq!(
            GatewayError::ConfigMissing("element_separators".into()).wire_code(),
            "CONFIG_MISSING"
        );
        assert_eq!(
            GatewayError::Internal("invariant".into()).wire_code(),
            "INTERNAL"
        );
    }
}
