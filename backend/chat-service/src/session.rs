use crate::error::AppError;
use serde::Serialize;

/// Opaque bearer credential, wire form `<identifier>:<signature>`.
///
/// The token string is derived state; the cache entry written by
/// `SessionService` is the source of truth. A token is only valid while the
/// cache still maps its identifier to the exact same signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionToken {
    pub identifier: i64,
    pub signature: String,
}

impl SessionToken {
    pub fn new(identifier: i64, signature: impl Into<String>) -> Self {
        Self {
            identifier,
            signature: signature.into(),
        }
    }

    /// Wire form of the token.
    pub fn token(&self) -> String {
        format!("{}:{}", self.identifier, self.signature)
    }

    /// Parse the wire form. Splits on the first `:`; the identifier segment
    /// must be a non-negative integer and the signature must be non-empty.
    pub fn parse(token: &str) -> Result<Self, AppError> {
        let (identifier, signature) = token.split_once(':').ok_or(AppError::MalformedToken)?;
        let identifier: i64 = identifier.parse().map_err(|_| AppError::MalformedToken)?;

        if identifier < 0 || signature.is_empty() {
            return Err(AppError::MalformedToken);
        }

        Ok(Self::new(identifier, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_identifier_and_signature() {
        let token = SessionToken::parse("7:abc").unwrap();
        assert_eq!(token.identifier, 7);
        assert_eq!(token.signature, "abc");
    }

    #[test]
    fn round_trips_through_wire_form() {
        let token = SessionToken::new(42, "deadbeef");
        assert_eq!(SessionToken::parse(&token.token()).unwrap(), token);
    }

    #[test]
    fn signature_may_contain_colons() {
        let token = SessionToken::parse("1:a:b").unwrap();
        assert_eq!(token.signature, "a:b");
    }

    #[test]
    fn rejects_non_numeric_identifier() {
        assert!(matches!(
            SessionToken::parse("abc:abc"),
            Err(AppError::MalformedToken)
        ));
    }

    #[test]
    fn rejects_missing_signature() {
        assert!(matches!(SessionToken::parse("7"), Err(AppError::MalformedToken)));
        assert!(matches!(SessionToken::parse("7:"), Err(AppError::MalformedToken)));
    }

    #[test]
    fn rejects_negative_identifier() {
        assert!(matches!(
            SessionToken::parse("-3:abc"),
            Err(AppError::MalformedToken)
        ));
    }
}
