use std::collections::HashSet;

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::core::client::ClientInfo;
use crate::core::config::{FingerprintPolicy, Settings};

const ARGON2_MEMORY_KIB: u32 = 19_456;
const ARGON2_TIME: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;

#[derive(Debug, Error)]
pub(crate) enum PasswordError {
    #[error("password hashing failed")]
    Hashing,
    #[error("password verification failed")]
    Verification,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub(crate) enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature is invalid")]
    SignatureInvalid,
    #[error("token has expired")]
    Expired,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("invalid access token: {0}")]
    InvalidAccessToken(Box<TokenError>),
    #[error("exam token belongs to a different user")]
    UserMismatch,
    #[error("client fingerprint changed")]
    FingerprintMismatch,
    #[error("token encoding failed")]
    Encoding,
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AccessClaims {
    #[serde(rename = "uid")]
    pub(crate) user_id: String,
    #[serde(rename = "uname")]
    pub(crate) username: String,
    pub(crate) role: String,
    #[serde(rename = "iat")]
    pub(crate) issued_at: i64,
    #[serde(rename = "exp")]
    pub(crate) expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ExamSessionClaims {
    #[serde(rename = "sid")]
    pub(crate) session_id: String,
    #[serde(rename = "aid")]
    pub(crate) association_id: String,
    #[serde(rename = "uid")]
    pub(crate) user_id: String,
    #[serde(rename = "cfp")]
    pub(crate) client_fingerprint: String,
    #[serde(rename = "iat")]
    pub(crate) issued_at: i64,
    #[serde(rename = "nbf")]
    pub(crate) not_before: i64,
    #[serde(rename = "exp")]
    pub(crate) expires_at: i64,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and verifies access tokens and fingerprint-bound exam tokens.
///
/// The two token kinds are signed with independent secrets, so a token of one
/// kind never verifies as the other. Read-only after construction.
pub(crate) struct TokenService {
    access: SigningKeys,
    exam: SigningKeys,
    algorithm: Algorithm,
    access_expiry: Duration,
    exam_default_expiry: Duration,
    fingerprint_policy: FingerprintPolicy,
}

impl TokenService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self, TokenError> {
        let security = settings.security();
        Ok(Self {
            access: SigningKeys::from_secret(&security.access_secret),
            exam: SigningKeys::from_secret(&security.exam_secret),
            algorithm: parse_algorithm(&security.algorithm)?,
            access_expiry: Duration::minutes(security.access_token_expire_minutes as i64),
            exam_default_expiry: Duration::minutes(security.exam_token_default_minutes as i64),
            fingerprint_policy: security.fingerprint_policy,
        })
    }

    pub(crate) fn issue_access_token(
        &self,
        user_id: &str,
        username: &str,
        role: &str,
    ) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let claims = AccessClaims {
            user_id: user_id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            issued_at: now.unix_timestamp(),
            expires_at: (now + self.access_expiry).unix_timestamp(),
        };
        self.sign(&claims, &self.access)
    }

    pub(crate) fn verify_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, &self.access, false)
    }

    /// Mints an exam token for `association_id`, valid for `duration` (or the
    /// configured default when `duration` is zero).
    ///
    /// Fails before minting anything when the access token does not verify.
    pub(crate) fn issue_exam_token(
        &self,
        access_token: &str,
        association_id: &str,
        duration: Duration,
        client: &ClientInfo,
    ) -> Result<(String, ExamSessionClaims), TokenError> {
        let access = self
            .verify_access_token(access_token)
            .map_err(|err| TokenError::InvalidAccessToken(Box::new(err)))?;

        let expiry = if duration.is_zero() { self.exam_default_expiry } else { duration };
        let now = OffsetDateTime::now_utc();
        let claims = ExamSessionClaims {
            session_id: Uuid::new_v4().to_string(),
            association_id: association_id.to_string(),
            user_id: access.user_id,
            client_fingerprint: client.fingerprint(),
            issued_at: now.unix_timestamp(),
            not_before: now.unix_timestamp(),
            expires_at: (now + expiry).unix_timestamp(),
        };

        let token = self.sign(&claims, &self.exam)?;
        Ok((token, claims))
    }

    pub(crate) fn verify_exam_token(
        &self,
        access_token: &str,
        exam_token: &str,
        client: &ClientInfo,
    ) -> Result<ExamSessionClaims, TokenError> {
        let access = self
            .verify_access_token(access_token)
            .map_err(|err| TokenError::InvalidAccessToken(Box::new(err)))?;
        let exam: ExamSessionClaims = self.verify(exam_token, &self.exam, true)?;

        if exam.user_id != access.user_id {
            return Err(TokenError::UserMismatch);
        }

        if self.fingerprint_policy == FingerprintPolicy::Strict
            && exam.client_fingerprint != client.fingerprint()
        {
            return Err(TokenError::FingerprintMismatch);
        }

        Ok(exam)
    }

    fn sign<T: Serialize>(&self, claims: &T, keys: &SigningKeys) -> Result<String, TokenError> {
        let mut header = Header::new(self.algorithm);
        header.typ = Some("JWT".to_string());
        encode(&header, claims, &keys.encoding).map_err(|_| TokenError::Encoding)
    }

    // jsonwebtoken compares HMAC signatures in constant time.
    fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        keys: &SigningKeys,
        check_not_before: bool,
    ) -> Result<T, TokenError> {
        if token.split('.').count() != 3 {
            return Err(TokenError::Malformed);
        }

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = check_not_before;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        decode::<T>(token, &keys.decoding, &validation).map(|data| data.claims).map_err(|err| {
            match err.kind() {
                ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                _ => TokenError::Malformed,
            }
        })
    }
}

fn parse_algorithm(value: &str) -> Result<Algorithm, TokenError> {
    match value {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(TokenError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn argon2() -> Result<Argon2<'static>, argon2::Error> {
    let params = argon2::Params::new(ARGON2_MEMORY_KIB, ARGON2_TIME, ARGON2_PARALLELISM, None)?;
    Ok(Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params))
}

pub(crate) fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = argon2().map_err(|_| PasswordError::Hashing)?;

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| PasswordError::Hashing)?
        .to_string();

    Ok(hash)
}

pub(crate) fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::Verification)?;
    let argon2 = argon2().map_err(|_| PasswordError::Verification)?;

    match argon2.verify_password(password.as_bytes(), &parsed) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(_) => Err(PasswordError::Verification),
    }
}

#[cfg(test)]
pub(crate) fn test_token_service(policy: FingerprintPolicy) -> TokenService {
    TokenService {
        access: SigningKeys::from_secret("access-test-secret"),
        exam: SigningKeys::from_secret("exam-test-secret"),
        algorithm: Algorithm::HS256,
        access_expiry: Duration::hours(24),
        exam_default_expiry: Duration::hours(2),
        fingerprint_policy: policy,
    }
}
