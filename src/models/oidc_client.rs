//! Registered OIDC relying parties.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;
use validator::{ValidateEmail, ValidationError, ValidationErrors};

use crate::error::Error;
use crate::models::{Model, User};

/// How strictly redirect URIs are checked.
///
/// `Production` requires https and rejects loopback hosts; `Debug` allows
/// plain-http loopback redirects for local development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    Production,
    Debug,
}

/// A registered OIDC client application.
///
/// `redirect_uris` and `contacts` keep their caller-supplied order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcClient {
    #[serde(flatten)]
    pub base: Model<Uuid>,
    pub client_name: String,
    pub client_uri: Option<String>,
    pub logo_uri: Option<String>,
    pub policy_uri: Option<String>,
    pub tos_uri: Option<String>,
    pub contacts: Vec<String>,
    pub client_id: String,
    pub secret: String,
    pub redirect_uris: Vec<String>,
    pub created_by: Uuid,
    pub revoked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    creator: Option<User>,
}

impl OidcClient {
    /// Create a new, unsaved client registration.
    pub fn new(
        client_name: impl Into<String>,
        client_id: impl Into<String>,
        secret: impl Into<String>,
        created_by: Uuid,
    ) -> Self {
        Self {
            base: Model::default(),
            client_name: client_name.into(),
            client_uri: None,
            logo_uri: None,
            policy_uri: None,
            tos_uri: None,
            contacts: Vec::new(),
            client_id: client_id.into(),
            secret: secret.into(),
            redirect_uris: Vec::new(),
            created_by,
            revoked: None,
            creator: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.is_some()
    }

    /// The user that registered this client.
    ///
    /// Fails with [`Error::MissingAssociation`] when the association was
    /// not loaded.
    pub fn creator(&self) -> Result<&User, Error> {
        self.creator.as_ref().ok_or(Error::MissingAssociation("creator"))
    }

    /// Attach the creator and keep the denormalized `created_by` id in sync.
    pub fn set_creator(&mut self, user: User) {
        self.created_by = user.base.id;
        self.creator = Some(user);
    }

    /// Check the registration, collecting every violation instead of
    /// stopping at the first.
    pub fn validate(&self, mode: ValidationMode) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.client_id.is_empty() {
            errors.add("client_id", violation("required", "client_id must not be empty"));
        }
        if self.secret.is_empty() {
            errors.add("secret", violation("required", "secret must not be empty"));
        }
        if self.created_by.is_nil() {
            errors.add("created_by", violation("required", "created_by must be set"));
        }

        if self.redirect_uris.is_empty() {
            errors.add(
                "redirect_uris",
                violation("required", "at least one redirect URI is required"),
            );
        }
        for uri in &self.redirect_uris {
            match Url::parse(uri) {
                Err(_) => errors.add(
                    "redirect_uris",
                    violation("url", format!("{uri}: not an absolute URL")),
                ),
                Ok(parsed) => {
                    let host = parsed.host_str().unwrap_or("");
                    if host.is_empty() {
                        errors.add(
                            "redirect_uris",
                            violation("url", format!("{uri}: missing host")),
                        );
                        continue;
                    }
                    if mode == ValidationMode::Production {
                        if parsed.scheme() != "https" {
                            errors.add(
                                "redirect_uris",
                                violation("scheme", format!("{uri}: must use https")),
                            );
                        }
                        if is_loopback_host(host) {
                            errors.add(
                                "redirect_uris",
                                violation("loopback", format!("{uri}: loopback host not allowed")),
                            );
                        }
                    }
                }
            }
        }

        let metadata = [
            ("client_uri", &self.client_uri),
            ("logo_uri", &self.logo_uri),
            ("policy_uri", &self.policy_uri),
            ("tos_uri", &self.tos_uri),
        ];
        for (field, value) in metadata {
            if let Some(uri) = value {
                if Url::parse(uri).is_err() {
                    errors.add(field, violation("url", format!("{uri}: not an absolute URL")));
                }
            }
        }

        for contact in &self.contacts {
            if !contact.validate_email() {
                errors.add(
                    "contacts",
                    violation("email", format!("{contact}: not a valid email address")),
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn violation(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<std::net::IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}
