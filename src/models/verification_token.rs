//! One-time verification tokens for email-driven flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Model;

/// What a verification token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    ResetPassword,
    VerifyEmail,
    TeamInvite,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::ResetPassword => "reset_password",
            TokenType::VerifyEmail => "verify_email",
            TokenType::TeamInvite => "team_invite",
        }
    }
}

impl std::str::FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reset_password" => Ok(TokenType::ResetPassword),
            "verify_email" => Ok(TokenType::VerifyEmail),
            "team_invite" => Ok(TokenType::TeamInvite),
            _ => Err(format!("Invalid token type: {}", s)),
        }
    }
}

/// A single-use token mailed to a user.
///
/// `signature` is produced and checked by an external signer; the store
/// keeps the bytes exactly as supplied. For `ResetPassword` and
/// `VerifyEmail` tokens `resource_id` names the affected user, for
/// `TeamInvite` the inviting resource; the store records but does not
/// enforce that mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationToken {
    #[serde(flatten)]
    pub base: Model<Uuid>,
    pub token_type: TokenType,
    pub resource_id: Option<Uuid>,
    pub email: String,
    pub expiration: DateTime<Utc>,
    pub signature: Vec<u8>,
    pub sent_on: Option<DateTime<Utc>>,
}

impl VerificationToken {
    /// Create a new, unsaved token.
    pub fn new(
        token_type: TokenType,
        email: impl Into<String>,
        expiration: DateTime<Utc>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            base: Model::default(),
            token_type,
            resource_id: None,
            email: email.into(),
            expiration,
            signature,
            sent_on: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_type_round_trips_through_strings() {
        for ty in [
            TokenType::ResetPassword,
            TokenType::VerifyEmail,
            TokenType::TeamInvite,
        ] {
            assert_eq!(ty.as_str().parse::<TokenType>().unwrap(), ty);
        }
        assert!("bogus".parse::<TokenType>().is_err());
    }

    #[test]
    fn expiration_is_exclusive() {
        let now = Utc::now();
        let token = VerificationToken::new(TokenType::VerifyEmail, "a@b.example", now, vec![1]);
        assert!(!token.is_expired_at(now));
        assert!(token.is_expired_at(now + chrono::Duration::seconds(1)));
    }
}
