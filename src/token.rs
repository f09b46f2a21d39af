use crate::{
    cryptography::{KeySet, SigningKeys},
    error::{Base64DecodeError, SerdeError, SignatureError, TokenError},
    r#trait::{Expired, Pending},
    user::User,
};
use axum::http::Uri;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use email_address::EmailAddress;
use rsa::pkcs1v15::Signature;
use serde::{Deserialize, Serialize};
use signature::{SignatureEncoding, Signer, Verifier};
use std::str::FromStr;
use uuid::Uuid;

pub const ALGORITHM: &str = "RS256";
pub const INVITATION_PURPOSE: &str = "invitation";

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Header {
    alg: String,
    typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

impl Header {
    fn for_key(kid: &str) -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
            kid: Some(kid.to_string()),
        }
    }
}

/// Raw claims as carried on the wire.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InvitationClaims {
    pub iss: String,
    pub sub: Uuid,
    pub email: String,
    /// Fingerprint of the account password at issuance, see [`User::password_fingerprint`].
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    pub purpose: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    pub exp: i64,
}

impl InvitationClaims {
    pub fn for_user(issuer: &str, user: &User, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            iss: issuer.to_string(),
            sub: *user.get_id(),
            email: user.get_email().to_string(),
            password: user.password_fingerprint(),
            callback: None,
            purpose: INVITATION_PURPOSE.to_string(),
            iat: now.timestamp(),
            nbf: None,
            exp: (now + lifetime).timestamp(),
        }
    }

    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    pub fn with_not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.nbf = Some(not_before.timestamp());
        self
    }
}

/// Claims of a token that passed signature, issuer, purpose and validity
/// window checks. Only obtainable through [`parse_and_verify_invitation_token`].
#[derive(Clone, Debug)]
pub struct Invitation {
    user_id: Uuid,
    email: EmailAddress,
    password_fingerprint: String,
    callback: Option<String>,
    expiry: DateTime<Utc>,
}

impl Invitation {
    pub fn get_user_id(&self) -> &Uuid {
        &self.user_id
    }
    pub fn get_email(&self) -> &EmailAddress {
        &self.email
    }
    pub fn get_password_fingerprint(&self) -> &str {
        &self.password_fingerprint
    }
    pub fn get_callback(&self) -> Option<&String> {
        self.callback.as_ref()
    }
    pub fn get_expiry(&self) -> &DateTime<Utc> {
        &self.expiry
    }
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, TokenError> {
    match Utc.timestamp_opt(seconds, 0).single() {
        Some(datetime) => Ok(datetime),
        None => Err(TokenError::InvalidFormatForDecoding),
    }
}

pub fn create_invitation_token(
    claims: &InvitationClaims,
    signing_keys: &SigningKeys,
) -> Result<String, TokenError> {
    let header_base64 = match serde_json::to_vec(&Header::for_key(signing_keys.get_id())) {
        Ok(header) => URL_SAFE_NO_PAD.encode(header),
        Err(err) => return Err(TokenError::ClaimsSerialisation(SerdeError(err))),
    };
    let claims_base64 = match serde_json::to_vec(claims) {
        Ok(claims) => URL_SAFE_NO_PAD.encode(claims),
        Err(err) => return Err(TokenError::ClaimsSerialisation(SerdeError(err))),
    };
    let signing_input = format!("{}.{}", header_base64, claims_base64);
    let signature: Signature = signing_keys.get_signing_key().sign(signing_input.as_bytes());
    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

fn verify_signature(parts: &[&str], keys: &KeySet) -> Result<(), TokenError> {
    let header_bytes = match URL_SAFE_NO_PAD.decode(parts[0]) {
        Ok(header_bytes) => header_bytes,
        Err(err) => return Err(TokenError::HeaderBase64Decode(Base64DecodeError(err))),
    };
    let header: Header = match serde_json::from_slice(&header_bytes) {
        Ok(header) => header,
        Err(err) => return Err(TokenError::HeaderDeserialisation(SerdeError(err))),
    };
    if header.alg != ALGORITHM {
        return Err(TokenError::HeaderUnexpectedAlgorithm(header.alg));
    }

    let signature_bytes = match URL_SAFE_NO_PAD.decode(parts[2]) {
        Ok(signature_bytes) => signature_bytes,
        Err(err) => return Err(TokenError::SignatureBase64Decode(Base64DecodeError(err))),
    };
    let signature = match Signature::try_from(signature_bytes.as_slice()) {
        Ok(signature) => signature,
        Err(err) => return Err(TokenError::SignatureFormat(SignatureError(err))),
    };

    let signing_input = format!("{}.{}", parts[0], parts[1]);
    // The kid is a hint only; every trusted key is tried so a rotated-in key
    // without a matching id still verifies.
    let verified = keys
        .iter()
        .any(|(_, key)| key.verify(signing_input.as_bytes(), &signature).is_ok());
    if !verified {
        return Err(TokenError::SignatureVerificationFailed);
    }
    Ok(())
}

/// Validates `token` against `keys` and `issuer`. Nothing is cached, every
/// call re-checks signature and validity window.
pub fn parse_and_verify_invitation_token(
    token: &str,
    issuer: &str,
    keys: &KeySet,
) -> Result<Invitation, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
        return Err(TokenError::InvalidFormatForDecoding);
    }

    verify_signature(&parts, keys)?;

    let claims_bytes = match URL_SAFE_NO_PAD.decode(parts[1]) {
        Ok(claims_bytes) => claims_bytes,
        Err(err) => return Err(TokenError::PayloadBase64Decode(Base64DecodeError(err))),
    };
    let claims: InvitationClaims = match serde_json::from_slice(&claims_bytes) {
        Ok(claims) => claims,
        Err(err) => return Err(TokenError::ClaimsDeserialisation(SerdeError(err))),
    };

    if claims.iss != issuer {
        return Err(TokenError::IssuerMismatch {
            expected: issuer.to_string(),
            found: claims.iss,
        });
    }
    if claims.purpose != INVITATION_PURPOSE {
        return Err(TokenError::UnexpectedPurpose(claims.purpose));
    }

    let expiry = timestamp(claims.exp)?;
    if expiry.expired() {
        return Err(TokenError::Expired);
    }
    if let Some(nbf) = claims.nbf {
        if timestamp(nbf)?.pending() {
            return Err(TokenError::NotYetValid);
        }
    }
    timestamp(claims.iat)?;

    let email = match EmailAddress::from_str(&claims.email) {
        Ok(email) => email,
        Err(_) => return Err(TokenError::InvalidEmail(claims.email)),
    };
    if let Some(callback) = claims.callback.as_ref() {
        match Uri::from_str(callback) {
            Ok(uri) if uri.scheme().is_some() && uri.host().is_some() => {}
            _ => return Err(TokenError::InvalidCallback(callback.to_owned())),
        }
    }

    Ok(Invitation {
        user_id: claims.sub,
        email,
        password_fingerprint: claims.password,
        callback: claims.callback,
        expiry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cryptography::tests::{other_signing_keys, test_signing_keys};

    const ISSUER: &str = "https://auth.example.com";

    fn user() -> User {
        User::invited(Uuid::new_v4(), EmailAddress::from_str("ada@example.com").unwrap())
    }

    fn trusted() -> KeySet {
        KeySet::from_signing_keys([test_signing_keys()])
    }

    #[test]
    fn valid_token_yields_invitation() {
        let user = user();
        let claims = InvitationClaims::for_user(ISSUER, &user, Duration::hours(1))
            .with_callback("https://app.example.com/welcome");
        let token = create_invitation_token(&claims, test_signing_keys()).unwrap();

        let invitation = parse_and_verify_invitation_token(&token, ISSUER, &trusted()).unwrap();
        assert_eq!(invitation.get_user_id(), user.get_id());
        assert_eq!(invitation.get_email(), user.get_email());
        assert_eq!(invitation.get_password_fingerprint(), user.password_fingerprint());
        assert_eq!(
            invitation.get_callback().map(String::as_str),
            Some("https://app.example.com/welcome")
        );
        assert_eq!(invitation.get_expiry().timestamp(), claims.exp);
    }

    #[test]
    fn any_trusted_key_verifies() {
        let claims = InvitationClaims::for_user(ISSUER, &user(), Duration::hours(1));
        let token = create_invitation_token(&claims, other_signing_keys()).unwrap();
        let keys = KeySet::from_signing_keys([test_signing_keys(), other_signing_keys()]);
        assert!(parse_and_verify_invitation_token(&token, ISSUER, &keys).is_ok());
    }

    #[test]
    fn untrusted_key_is_rejected() {
        let claims = InvitationClaims::for_user(ISSUER, &user(), Duration::hours(1));
        let token = create_invitation_token(&claims, other_signing_keys()).unwrap();
        assert!(matches!(
            parse_and_verify_invitation_token(&token, ISSUER, &trusted()),
            Err(TokenError::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn tampered_claims_fail_signature() {
        let claims = InvitationClaims::for_user(ISSUER, &user(), Duration::hours(1));
        let token = create_invitation_token(&claims, test_signing_keys()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let mut forged = claims.clone();
        forged.email = "mallory@example.com".to_string();
        let forged_claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let forged_token = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert!(matches!(
            parse_and_verify_invitation_token(&forged_token, ISSUER, &trusted()),
            Err(TokenError::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = InvitationClaims::for_user(ISSUER, &user(), Duration::hours(-1));
        let token = create_invitation_token(&claims, test_signing_keys()).unwrap();
        assert!(matches!(
            parse_and_verify_invitation_token(&token, ISSUER, &trusted()),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn token_before_not_before_is_rejected() {
        let claims = InvitationClaims::for_user(ISSUER, &user(), Duration::hours(2))
            .with_not_before(Utc::now() + Duration::hours(1));
        let token = create_invitation_token(&claims, test_signing_keys()).unwrap();
        assert!(matches!(
            parse_and_verify_invitation_token(&token, ISSUER, &trusted()),
            Err(TokenError::NotYetValid)
        ));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let claims = InvitationClaims::for_user("https://elsewhere.example.com", &user(), Duration::hours(1));
        let token = create_invitation_token(&claims, test_signing_keys()).unwrap();
        assert!(matches!(
            parse_and_verify_invitation_token(&token, ISSUER, &trusted()),
            Err(TokenError::IssuerMismatch { .. })
        ));
    }

    #[test]
    fn wrong_purpose_is_rejected() {
        let mut claims = InvitationClaims::for_user(ISSUER, &user(), Duration::hours(1));
        claims.purpose = "password-reset".to_string();
        let token = create_invitation_token(&claims, test_signing_keys()).unwrap();
        assert!(matches!(
            parse_and_verify_invitation_token(&token, ISSUER, &trusted()),
            Err(TokenError::UnexpectedPurpose(_))
        ));
    }

    #[test]
    fn relative_callback_is_rejected() {
        let claims = InvitationClaims::for_user(ISSUER, &user(), Duration::hours(1))
            .with_callback("/welcome");
        let token = create_invitation_token(&claims, test_signing_keys()).unwrap();
        assert!(matches!(
            parse_and_verify_invitation_token(&token, ISSUER, &trusted()),
            Err(TokenError::InvalidCallback(_))
        ));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["", "abc", "a.b", "a..c", "a.b.c.d", "!!!.???.***"] {
            assert!(
                parse_and_verify_invitation_token(token, ISSUER, &trusted()).is_err(),
                "{token} should not verify"
            );
        }
    }
}
