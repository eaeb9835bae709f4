use crate::acl::{Actor, Role};
use crate::errors::FolioError;
use crate::settings::Jwt;
use base64ct::Encoding;
use josekit::jwk::Jwk;
use josekit::jws::{JwsHeader, RS256};
use josekit::jwt::{self, JwtPayload, JwtPayloadValidator};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const TOKEN_USE_CLAIM: &str = "token_use";
const ACCESS: &str = "access";
const REFRESH: &str = "refresh";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and verifies RS256 access and refresh tokens.
#[derive(Clone)]
pub struct TokenManager {
    private_jwk: Arc<Jwk>,
    public_jwk: Arc<Jwk>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenManager {
    pub fn new(cfg: &Jwt) -> Result<Self, FolioError> {
        if let Some(parent) = cfg.private_key_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // If private key exists, load it; otherwise generate and persist it
        let private_jwk = if cfg.private_key_path.exists() {
            let s = fs::read_to_string(&cfg.private_key_path)?;
            serde_json::from_str::<Jwk>(&s)?
        } else {
            let mut jwk = Jwk::generate_rsa_key(2048)?;
            let kid = cfg.key_id.clone().unwrap_or_else(random_kid);
            jwk.set_key_id(&kid);
            jwk.set_algorithm("RS256");
            jwk.set_key_use("sig");
            fs::write(&cfg.private_key_path, serde_json::to_string_pretty(&jwk)?)?;
            tracing::info!(path = %cfg.private_key_path.display(), "Generated new JWT signing key");
            jwk
        };
        let mut public_jwk = private_jwk.to_public_key()?;
        // to_public_key() keeps only the key material
        if let Some(kid) = private_jwk.key_id() {
            public_jwk.set_key_id(kid);
        }
        if let Some(alg) = private_jwk.algorithm() {
            public_jwk.set_algorithm(alg);
        }
        if let Some(key_use) = private_jwk.key_use() {
            public_jwk.set_key_use(key_use);
        }

        Ok(Self {
            private_jwk: Arc::new(private_jwk),
            public_jwk: Arc::new(public_jwk),
            access_ttl: Duration::from_secs(cfg.access_token_ttl_secs.max(1) as u64),
            refresh_ttl: Duration::from_secs(cfg.refresh_token_ttl_secs.max(1) as u64),
        })
    }

    pub fn jwks_json(&self) -> Value {
        json!({ "keys": [serde_json::to_value(&*self.public_jwk).unwrap_or(Value::Null)] })
    }

    /// Issue an access/refresh pair for `actor`.
    pub fn issue(&self, actor: &Actor) -> Result<AuthTokens, FolioError> {
        let mut access = self.base_payload(actor.id, ACCESS, self.access_ttl)?;
        access.set_claim("username", Some(json!(actor.username)))?;
        access.set_claim("roles", Some(serde_json::to_value(&actor.roles)?))?;

        let refresh = self.base_payload(actor.id, REFRESH, self.refresh_ttl)?;

        Ok(AuthTokens {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        })
    }

    /// Verify an access token and rebuild the actor from its claims.
    pub fn verify_access(&self, token: &str) -> Result<Actor, FolioError> {
        let payload = self.verify(token, ACCESS)?;
        let id = subject_id(&payload)?;
        let username = payload
            .claim("username")
            .and_then(|v| v.as_str())
            .ok_or_else(invalid_token)?
            .to_string();
        let roles: Vec<Role> = payload
            .claim("roles")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|_| invalid_token())?
            .ok_or_else(invalid_token)?;

        Ok(Actor::new(id, username, roles))
    }

    /// Verify a refresh token and return the user id it was issued for.
    pub fn verify_refresh(&self, token: &str) -> Result<i32, FolioError> {
        let payload = self.verify(token, REFRESH)?;
        subject_id(&payload)
    }

    fn base_payload(
        &self,
        user_id: i32,
        token_use: &str,
        ttl: Duration,
    ) -> Result<JwtPayload, FolioError> {
        let now = SystemTime::now();
        let mut payload = JwtPayload::new();
        payload.set_subject(user_id.to_string());
        payload.set_issued_at(&now);
        payload.set_expires_at(&(now + ttl));
        payload.set_claim(TOKEN_USE_CLAIM, Some(json!(token_use)))?;
        Ok(payload)
    }

    fn sign(&self, payload: &JwtPayload) -> Result<String, FolioError> {
        let signer = RS256.signer_from_jwk(&self.private_jwk)?;
        let mut header = JwsHeader::new();
        if let Some(kid) = self.private_jwk.key_id() {
            header.set_key_id(kid);
        }
        header.set_token_type("JWT");
        Ok(jwt::encode_with_signer(payload, &header, &signer)?)
    }

    fn verify(&self, token: &str, expected_use: &str) -> Result<JwtPayload, FolioError> {
        let verifier = RS256.verifier_from_jwk(&self.public_jwk)?;
        let (payload, _header) = jwt::decode_with_verifier(token, &verifier).map_err(|e| {
            tracing::debug!(error = %e, "Rejected token");
            invalid_token()
        })?;

        let mut validator = JwtPayloadValidator::new();
        validator.set_base_time(SystemTime::now());
        validator.validate(&payload).map_err(|e| {
            tracing::debug!(error = %e, "Rejected token claims");
            invalid_token()
        })?;

        match payload.claim(TOKEN_USE_CLAIM).and_then(|v| v.as_str()) {
            Some(u) if u == expected_use => Ok(payload),
            _ => Err(invalid_token()),
        }
    }
}

fn subject_id(payload: &JwtPayload) -> Result<i32, FolioError> {
    payload
        .subject()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid_token)
}

fn invalid_token() -> FolioError {
    FolioError::unauthorized()
}

fn random_kid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, access_ttl: i64) -> TokenManager {
        let cfg = Jwt {
            private_key_path: dir.path().join("jwt_key.json"),
            key_id: Some("test-kid".to_string()),
            access_token_ttl_secs: access_ttl,
            refresh_token_ttl_secs: 600,
        };
        TokenManager::new(&cfg).expect("Failed to create token manager")
    }

    fn actor() -> Actor {
        Actor::new(6, "jhon", vec![Role::User])
    }

    #[test]
    fn test_access_token_roundtrip() {
        let dir = TempDir::new().unwrap();
        let tokens = manager(&dir, 60).issue(&actor()).unwrap();
        let verified = manager(&dir, 60).verify_access(&tokens.access_token).unwrap();
        assert_eq!(verified, actor());
    }

    #[test]
    fn test_refresh_token_carries_subject() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, 60);
        let tokens = mgr.issue(&actor()).unwrap();
        assert_eq!(mgr.verify_refresh(&tokens.refresh_token).unwrap(), 6);
    }

    #[test]
    fn test_token_use_is_enforced() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, 60);
        let tokens = mgr.issue(&actor()).unwrap();
        assert!(matches!(
            mgr.verify_access(&tokens.refresh_token),
            Err(FolioError::Unauthorized(_))
        ));
        assert!(mgr.verify_refresh(&tokens.access_token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, 60);
        assert!(matches!(
            mgr.verify_access("abcd"),
            Err(FolioError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_token_from_other_key_rejected() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let tokens = manager(&dir_a, 60).issue(&actor()).unwrap();
        assert!(manager(&dir_b, 60).verify_access(&tokens.access_token).is_err());
    }

    #[test]
    fn test_key_is_persisted() {
        let dir = TempDir::new().unwrap();
        let _ = manager(&dir, 60);
        assert!(dir.path().join("jwt_key.json").exists());
        let jwks = manager(&dir, 60).jwks_json();
        assert_eq!(jwks["keys"][0]["kid"], "test-kid");
        assert!(jwks["keys"][0].get("d").is_none());
    }

    #[test]
    fn test_published_key_matches_token_header() {
        use josekit::JoseHeader;

        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir, 60);
        let tokens = mgr.issue(&actor()).unwrap();

        let header = josekit::jwt::decode_header(&tokens.access_token).unwrap();
        let jwks = mgr.jwks_json();
        let key = &jwks["keys"][0];
        assert_eq!(header.claim("kid").and_then(|v| v.as_str()), key["kid"].as_str());
        assert_eq!(key["alg"], "RS256");
        assert_eq!(key["use"], "sig");

        // reloaded from disk, same published key
        assert_eq!(manager(&dir, 60).jwks_json(), jwks);
    }
}
