// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token encoding and verification.
//!
//! Tokens use JWT compact serialization: `base64url(header).base64url(claims).signature`,
//! where the header carries `alg` and `kid`. Only the HMAC family
//! (HS256/HS384/HS512) is accepted; any other header algorithm, `none`
//! included, is rejected before a key is looked up.
//!
//! Expiry is checked against the caller's clock instead of the system clock
//! so that the authenticator's notion of "now" is the only one in play.

use std::future::Future;
use std::str::FromStr;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;

use super::{claims::TokenClaims, AuthError};

/// Symmetric algorithms accepted in token headers.
pub const ALLOWED_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Unverified token header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: Algorithm,
    pub kid: String,
}

/// Raw header as it appears on the wire, before any checks.
#[derive(Deserialize)]
struct RawHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Only the expiry is read from unverified claims.
#[derive(Deserialize)]
struct ExpiryOnly {
    #[serde(default)]
    exp: Option<i64>,
}

/// Parse an algorithm name, accepting only the HMAC family.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, AuthError> {
    match Algorithm::from_str(name) {
        Ok(alg) if ALLOWED_ALGORITHMS.contains(&alg) => Ok(alg),
        _ => Err(AuthError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Stateless signer/verifier for a single issuer.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    issuer: String,
    leeway: i64,
}

impl TokenCodec {
    /// Create a codec signing with `algorithm` on behalf of `issuer`.
    pub fn new(algorithm: Algorithm, issuer: impl Into<String>) -> Result<Self, AuthError> {
        if !ALLOWED_ALGORITHMS.contains(&algorithm) {
            return Err(AuthError::UnsupportedAlgorithm(format!("{algorithm:?}")));
        }
        Ok(Self {
            algorithm,
            issuer: issuer.into(),
            leeway: 0,
        })
    }

    /// Tolerate this many seconds of clock skew on `exp`/`nbf`.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway = i64::try_from(leeway_secs).unwrap_or(i64::MAX);
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn leeway(&self) -> i64 {
        self.leeway
    }

    /// Sign `claims` with `secret_key`, embedding `kid` in the header.
    pub fn encode(
        &self,
        secret_key: &str,
        kid: &str,
        claims: &TokenClaims,
    ) -> Result<String, AuthError> {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(kid.to_string());

        encode(&header, claims, &EncodingKey::from_secret(secret_key.as_bytes()))
            .map_err(|e| AuthError::SigningFailed(e.to_string()))
    }

    /// Read `alg` and `kid` from the header without verifying anything.
    pub fn decode_header(&self, token: &str) -> Result<TokenHeader, AuthError> {
        let mut segments = token.split('.');
        let (Some(header), Some(_claims), Some(_signature), None) =
            (segments.next(), segments.next(), segments.next(), segments.next())
        else {
            return Err(AuthError::MalformedToken);
        };

        let bytes =
            Base64UrlUnpadded::decode_vec(header).map_err(|_| AuthError::MalformedToken)?;
        let raw: RawHeader =
            serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)?;

        let alg = parse_algorithm(&raw.alg)?;
        let kid = raw
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(AuthError::MalformedToken)?;

        Ok(TokenHeader { alg, kid })
    }

    /// Verify the signature of `token` with `secret_key` and decode its claims.
    ///
    /// `alg` must be the algorithm read from the token's own header.
    pub fn verify_and_decode(
        &self,
        token: &str,
        secret_key: &str,
        alg: Algorithm,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, AuthError> {
        if !ALLOWED_ALGORITHMS.contains(&alg) {
            return Err(AuthError::UnsupportedAlgorithm(format!("{alg:?}")));
        }

        let mut validation = Validation::new(alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(secret_key.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature if self.unverified_expired(token, now) => {
                AuthError::TokenExpired
            }
            ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::UnsupportedAlgorithm(format!("{alg:?}"))
            }
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            _ => AuthError::MalformedToken,
        })?;

        self.check_time(&data.claims, now)?;
        Ok(data.claims)
    }

    /// Verify a token whose key is found by `resolve` from its header.
    ///
    /// `resolve` is only called once the header parsed and named an allowed
    /// algorithm.
    pub async fn verify_with<F, Fut>(
        &self,
        token: &str,
        now: DateTime<Utc>,
        resolve: F,
    ) -> Result<TokenClaims, AuthError>
    where
        F: FnOnce(TokenHeader) -> Fut,
        Fut: Future<Output = Result<String, AuthError>>,
    {
        let header = self.decode_header(token)?;
        let alg = header.alg;
        let secret_key = resolve(header).await?;
        self.verify_and_decode(token, &secret_key, alg, now)
    }

    /// Expiry read from the unverified claims, if present.
    ///
    /// Only suitable for bookkeeping such as revocation TTLs.
    pub fn peek_expiry(&self, token: &str) -> Option<DateTime<Utc>> {
        let payload = token.split('.').nth(1)?;
        let bytes = Base64UrlUnpadded::decode_vec(payload).ok()?;
        let claims: ExpiryOnly = serde_json::from_slice(&bytes).ok()?;
        DateTime::from_timestamp(claims.exp?, 0)
    }

    fn unverified_expired(&self, token: &str, now: DateTime<Utc>) -> bool {
        self.peek_expiry(token)
            .is_some_and(|exp| exp.timestamp().saturating_add(self.leeway) <= now.timestamp())
    }

    fn check_time(&self, claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), AuthError> {
        let now = now.timestamp();
        if claims.exp.saturating_add(self.leeway) <= now {
            return Err(AuthError::TokenExpired);
        }
        if claims.nbf.is_some_and(|nbf| nbf.saturating_sub(self.leeway) > now) {
            return Err(AuthError::TokenExpired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use chrono::Duration;

    const KEY: &str = "test-signing-key-material";

    fn codec() -> TokenCodec {
        TokenCodec::new(Algorithm::HS512, "authn-server").unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn claims(ttl: Duration) -> TokenClaims {
        TokenClaims::new("user-42", "authn-server", now(), now() + ttl)
    }

    /// Build a token with an arbitrary header and a fake signature.
    fn forge(header: &str, claims: &str) -> String {
        format!(
            "{}.{}.c2lnbmF0dXJl",
            URL_SAFE_NO_PAD.encode(header.as_bytes()),
            URL_SAFE_NO_PAD.encode(claims.as_bytes())
        )
    }

    #[test]
    fn encode_embeds_kid_and_roundtrips() {
        let codec = codec();
        let token = codec.encode(KEY, "kid-1", &claims(Duration::minutes(5))).unwrap();

        assert_eq!(token.split('.').count(), 3);
        let header = codec.decode_header(&token).unwrap();
        assert_eq!(header, TokenHeader { alg: Algorithm::HS512, kid: "kid-1".to_string() });

        let decoded = codec.verify_and_decode(&token, KEY, header.alg, now()).unwrap();
        assert_eq!(decoded.sub, "user-42");
        assert_eq!(decoded.iss, "authn-server");
    }

    #[test]
    fn wrong_key_is_signature_invalid() {
        let codec = codec();
        let token = codec.encode(KEY, "kid-1", &claims(Duration::minutes(5))).unwrap();
        let result = codec.verify_and_decode(&token, "other-key", Algorithm::HS512, now());
        assert_eq!(result, Err(AuthError::SignatureInvalid));
    }

    #[test]
    fn tampered_signature_is_signature_invalid() {
        let codec = codec();
        let token = codec.encode(KEY, "kid-1", &claims(Duration::minutes(5))).unwrap();
        let mut bytes = token.into_bytes();
        let last = bytes.len() - 2;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        let result = codec.verify_and_decode(&tampered, KEY, Algorithm::HS512, now());
        assert_eq!(result, Err(AuthError::SignatureInvalid));
    }

    #[test]
    fn expired_claims_are_token_expired() {
        let codec = codec();
        let token = codec.encode(KEY, "kid-1", &claims(Duration::minutes(5))).unwrap();
        let later = now() + Duration::minutes(5);

        assert_eq!(
            codec.verify_and_decode(&token, KEY, Algorithm::HS512, later),
            Err(AuthError::TokenExpired)
        );
        // Expiry wins over a bad signature
        assert_eq!(
            codec.verify_and_decode(&token, "other-key", Algorithm::HS512, later),
            Err(AuthError::TokenExpired)
        );
    }

    #[test]
    fn leeway_extends_validity() {
        let codec = codec().with_leeway(60);
        let token = codec.encode(KEY, "kid-1", &claims(Duration::minutes(5))).unwrap();
        let just_after = now() + Duration::minutes(5) + Duration::seconds(30);
        assert!(codec.verify_and_decode(&token, KEY, Algorithm::HS512, just_after).is_ok());
    }

    #[test]
    fn not_yet_valid_is_token_expired() {
        let codec = codec();
        let mut c = claims(Duration::minutes(5));
        c.nbf = Some(now().timestamp() + 60);
        let token = codec.encode(KEY, "kid-1", &c).unwrap();
        assert_eq!(
            codec.verify_and_decode(&token, KEY, Algorithm::HS512, now()),
            Err(AuthError::TokenExpired)
        );
    }

    #[test]
    fn foreign_issuer_rejected() {
        let codec = codec();
        let other = TokenCodec::new(Algorithm::HS512, "someone-else").unwrap();
        let token = other.encode(KEY, "kid-1", &claims(Duration::minutes(5))).unwrap();
        assert_eq!(
            codec.verify_and_decode(&token, KEY, Algorithm::HS512, now()),
            Err(AuthError::InvalidIssuer)
        );
    }

    #[test]
    fn none_and_asymmetric_headers_rejected() {
        let codec = codec();
        let body = r#"{"sub":"user-42","iss":"authn-server","exp":9999999999,"iat":0}"#;

        let none = forge(r#"{"alg":"none","kid":"kid-1"}"#, body);
        assert_eq!(
            codec.decode_header(&none),
            Err(AuthError::UnsupportedAlgorithm("none".to_string()))
        );

        let rsa = forge(r#"{"alg":"RS256","kid":"kid-1"}"#, body);
        assert_eq!(
            codec.decode_header(&rsa),
            Err(AuthError::UnsupportedAlgorithm("RS256".to_string()))
        );
    }

    #[test]
    fn missing_kid_is_malformed() {
        let codec = codec();
        let token = forge(r#"{"alg":"HS256"}"#, r#"{"sub":"u"}"#);
        assert_eq!(codec.decode_header(&token), Err(AuthError::MalformedToken));

        let empty = forge(r#"{"alg":"HS256","kid":""}"#, r#"{"sub":"u"}"#);
        assert_eq!(codec.decode_header(&empty), Err(AuthError::MalformedToken));
    }

    #[test]
    fn structural_garbage_is_malformed() {
        let codec = codec();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.e30.sig"] {
            assert_eq!(codec.decode_header(token), Err(AuthError::MalformedToken), "{token}");
        }
    }

    #[test]
    fn codec_refuses_asymmetric_signing() {
        assert!(matches!(
            TokenCodec::new(Algorithm::RS256, "authn-server"),
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
        assert_eq!(parse_algorithm("HS384"), Ok(Algorithm::HS384));
        assert!(parse_algorithm("ES256").is_err());
    }

    #[tokio::test]
    async fn verify_with_resolves_by_kid() {
        let codec = codec();
        let token = codec.encode(KEY, "kid-7", &claims(Duration::minutes(5))).unwrap();

        let claims = codec
            .verify_with(&token, now(), |header| async move {
                assert_eq!(header.kid, "kid-7");
                Ok(KEY.to_string())
            })
            .await
            .unwrap();
        assert_eq!(claims.sub, "user-42");
    }

    #[tokio::test]
    async fn verify_with_skips_resolver_for_bad_alg() {
        let codec = codec();
        let token = forge(r#"{"alg":"none","kid":"kid-1"}"#, r#"{"sub":"u"}"#);
        let result = codec
            .verify_with(&token, now(), |_| async {
                Err(AuthError::Store("resolver must not run".to_string()))
            })
            .await;
        assert!(matches!(result, Err(AuthError::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn peek_expiry_reads_exp() {
        let codec = codec();
        let token = codec.encode(KEY, "kid-1", &claims(Duration::minutes(5))).unwrap();
        assert_eq!(codec.peek_expiry(&token), Some(now() + Duration::minutes(5)));
        assert_eq!(codec.peek_expiry("garbage"), None);
    }
}
