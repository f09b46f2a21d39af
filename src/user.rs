use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{Argon2Error, ChangePasswordError},
    hash_string,
    serde_implementations::option_datetime_utc,
};

pub const SALT_LENGTH: usize = 32;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    id: Uuid,
    email: EmailAddress,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    hashed_and_salted_password: String,
    #[serde(
        default,
        with = "option_datetime_utc",
        skip_serializing_if = "Option::is_none"
    )]
    password_changed_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        id: Uuid,
        email: EmailAddress,
        email_verified: bool,
        hashed_and_salted_password: String,
        password_changed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            email,
            email_verified,
            hashed_and_salted_password,
            password_changed_at,
        }
    }

    /// An account created ahead of its owner: unverified and without a password.
    pub fn invited(id: Uuid, email: EmailAddress) -> Self {
        Self::new(id, email, false, String::new(), None)
    }

    /// Identifies the current password without revealing its hash. Invitation
    /// tokens carry the fingerprint from when they were issued, so setting a
    /// password retires every outstanding invitation for this account.
    pub fn password_fingerprint(&self) -> String {
        hash_string(&self.hashed_and_salted_password)
    }

    pub fn verify_email(&mut self) {
        self.email_verified = true;
    }

    pub fn set_hashed_and_salted_password(&mut self, hashed_and_salted_password: String) {
        self.hashed_and_salted_password = hashed_and_salted_password;
        self.password_changed_at = Some(Utc::now());
    }

    pub fn verify_password(&self, plaintext: &str) -> bool {
        if self.hashed_and_salted_password.is_empty() {
            return false;
        }
        argon2::verify_encoded(&self.hashed_and_salted_password, plaintext.as_bytes())
            .unwrap_or(false)
    }

    pub fn get_id(&self) -> &Uuid {
        &self.id
    }
    pub fn get_email(&self) -> &EmailAddress {
        &self.email
    }
    pub fn is_email_verified(&self) -> bool {
        self.email_verified
    }
    pub fn get_password_changed_at(&self) -> Option<&DateTime<Utc>> {
        self.password_changed_at.as_ref()
    }
}

pub fn generate_salt(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub fn validate_password(plaintext: &str, min_length: usize) -> Result<(), ChangePasswordError> {
    if plaintext.chars().count() < min_length {
        return Err(ChangePasswordError::InvalidPassword);
    }
    Ok(())
}

pub fn hash_password(plaintext: &str) -> Result<String, ChangePasswordError> {
    let salt = generate_salt(SALT_LENGTH);
    match argon2::hash_encoded(
        plaintext.as_bytes(),
        salt.as_bytes(),
        &argon2::Config::default(),
    ) {
        Ok(hashed_and_salted_password) => Ok(hashed_and_salted_password),
        Err(err) => Err(ChangePasswordError::Hashing(Argon2Error(err))),
    }
}
