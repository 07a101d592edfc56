//! Named auth services backing per-tool authorization.
//!
//! Each service pairs a name with a bearer token and an optional set of
//! claims. An HTTP request proves a service by sending its token in the
//! `<name>_token` header; a stdio peer is a local process and is trusted
//! for every configured service. Tools consume the result through
//! [`is_authorized`] and claim-sourced parameters.

use axum::http::HeaderMap;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::ConfigError;
use crate::tools::ClaimMap;

/// True when `required` is empty or every required service name appears
/// in `verified`.
pub fn is_authorized(required: &[String], verified: &[String]) -> bool {
    required
        .iter()
        .all(|name| verified.iter().any(|v| v == name))
}

/// One configured auth service.
#[derive(Debug, Clone)]
pub struct AuthService {
    name: String,
    token: String,
    claims: HashMap<String, JsonValue>,
}

impl AuthService {
    pub fn new(name: impl Into<String>, token: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let token: String = token.into();
        let token = token.trim().to_string();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ConfigError::invalid_auth_service(
                &name,
                "service names must be lowercase ascii letters, digits, or '-'",
            ));
        }
        if token.is_empty() {
            return Err(ConfigError::invalid_auth_service(&name, "empty token value"));
        }
        Ok(Self {
            name,
            token,
            claims: HashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request header carrying this service's token.
    pub fn header_name(&self) -> String {
        format!("{}_token", self.name)
    }
}

/// Authorization outcome for one peer: which services it proved and the
/// claims those services contribute.
#[derive(Debug, Clone, Default)]
pub struct VerifiedAuth {
    pub services: Vec<String>,
    pub claims: ClaimMap,
}

/// All configured auth services. Built once at startup.
#[derive(Debug, Clone, Default)]
pub struct AuthRegistry {
    services: Vec<AuthService>,
}

impl AuthRegistry {
    pub fn new(services: Vec<AuthService>) -> Result<Self, ConfigError> {
        for (i, service) in services.iter().enumerate() {
            if services[..i].iter().any(|s| s.name == service.name) {
                return Err(ConfigError::invalid_auth_service(
                    &service.name,
                    "duplicate service name",
                ));
            }
        }
        Ok(Self { services })
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Attach a claim to a configured service.
    pub fn add_claim(
        &mut self,
        service: &str,
        claim: impl Into<String>,
        value: JsonValue,
    ) -> Result<(), ConfigError> {
        match self.services.iter_mut().find(|s| s.name == service) {
            Some(s) => {
                s.claims.insert(claim.into(), value);
                Ok(())
            }
            None => Err(ConfigError::invalid_auth_service(
                service,
                "claim references a service that is not configured",
            )),
        }
    }

    /// Verify the per-service token headers of an HTTP request. Services
    /// with no matching header are simply absent from the result; a
    /// present but wrong token is logged and absent as well.
    pub fn verify_headers(&self, headers: &HeaderMap) -> VerifiedAuth {
        let mut verified = VerifiedAuth::default();
        for service in &self.services {
            let header = service.header_name();
            let Some(value) = headers.get(header.as_str()) else {
                continue;
            };
            let Ok(presented) = value.to_str() else {
                warn!(service = %service.name, "Auth token header contains invalid characters");
                continue;
            };
            if constant_time_eq(presented.as_bytes(), service.token.as_bytes()) {
                verified.services.push(service.name.clone());
                verified
                    .claims
                    .insert(service.name.clone(), service.claims.clone());
            } else {
                warn!(
                    service = %service.name,
                    token_prefix = %mask_token(presented),
                    "Auth token rejected"
                );
            }
        }
        verified
    }

    /// Trust a local peer for every configured service. Used for stdio,
    /// where there are no headers to check.
    pub fn local_trust(&self) -> VerifiedAuth {
        let mut verified = VerifiedAuth::default();
        for service in &self.services {
            verified.services.push(service.name.clone());
            verified
                .claims
                .insert(service.name.clone(), service.claims.clone());
        }
        verified
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn mask_token(token: &str) -> String {
    if token.len() <= 3 {
        "***".to_string()
    } else {
        format!("{}***", &token[..3])
    }
}
