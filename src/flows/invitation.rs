//! The invitation state machine: one bearer token authorizes one email
//! verification and one password set for one account.
//!
//! `Issued -> EmailUnverified/PasswordUnset -> EmailVerified/PasswordUnset
//! -> EmailVerified/PasswordSet`. Verification is idempotent, the password
//! set is terminal. No state is kept between requests; the token is verified
//! from scratch on every call and the account store owns the transitions.

use super::{FlowOutcome, StatusClass};
use crate::{
    cryptography::KeySource,
    error::{ChangePasswordError, VerifyEmailError},
    token::{parse_and_verify_invitation_token, Invitation},
    user_manager::AccountStore,
};
use std::sync::Arc;
use tracing::{debug, error};

pub const TITLE_KEYS_UNAVAILABLE: &str = "There's been an error processing your request.";
pub const TITLE_BAD_TOKEN: &str = "Bad Invitation Token";
pub const TITLE_INVALID_LINK: &str = "Invalid Invitation Link";
pub const TITLE_LINK_EXPIRED: &str = "Link Expired";
pub const TITLE_INVALID_PASSWORD: &str = "Invalid Password";
pub const TITLE_PROCESSING_ERROR: &str = "Error Processing Request";

const MESSAGE_TRY_AGAIN: &str = "Please try again later.";
const MESSAGE_BAD_TOKEN: &str = "Your invitation could not be verified";
const MESSAGE_EMAIL_MISMATCH: &str = "Your email does not match the email address on file.";
const MESSAGE_VIEW_EXPIRED: &str = "Your invitation link is no longer valid. Please request a new one";
const MESSAGE_SUBMIT_EXPIRED: &str = "The invitation is no longer valid. If you need to change your password, generate a new password change email.";

pub struct InvitationFlow<K, S> {
    issuer: String,
    key_source: Arc<K>,
    store: Arc<S>,
}

impl<K: KeySource, S: AccountStore> InvitationFlow<K, S> {
    pub fn new(issuer: impl Into<String>, key_source: Arc<K>, store: Arc<S>) -> Self {
        Self {
            issuer: issuer.into(),
            key_source,
            store,
        }
    }

    pub fn get_issuer(&self) -> &str {
        &self.issuer
    }

    pub fn get_store(&self) -> &Arc<S> {
        &self.store
    }

    /// Shared first step of both operations.
    fn validate(&self, token: &str) -> Result<Invitation, FlowOutcome> {
        let keys = match self.key_source.trusted_keys() {
            Ok(keys) => keys,
            Err(err) => {
                error!("internal error getting public keys: {}", err);
                return Err(FlowOutcome::terminal(
                    TITLE_KEYS_UNAVAILABLE,
                    MESSAGE_TRY_AGAIN,
                    StatusClass::InternalError,
                ));
            }
        };
        match parse_and_verify_invitation_token(token, &self.issuer, &keys) {
            Ok(invitation) => {
                #[cfg(feature = "debug-logging")]
                debug!("Verified invitation {:?}", invitation);
                debug!(
                    "invitation for user {} valid until {}",
                    invitation.get_user_id(),
                    invitation.get_expiry()
                );
                Ok(invitation)
            }
            Err(err) => {
                debug!("invalid invitation token: {}", err);
                Err(FlowOutcome::terminal(
                    TITLE_BAD_TOKEN,
                    MESSAGE_BAD_TOKEN,
                    StatusClass::BadRequest,
                ))
            }
        }
    }

    /// Verifies the invited email and, unless the invitation is spent, asks
    /// for a password.
    pub async fn view(&self, token: &str) -> FlowOutcome {
        let invitation = match self.validate(token) {
            Ok(invitation) => invitation,
            Err(outcome) => return outcome,
        };

        match self.store.verify_email(&invitation).await {
            Ok(_) => {}
            // Someone who re-opens the link, or whose earlier request failed
            // after verification, must still reach the password form.
            Err(VerifyEmailError::AlreadyVerified) => {
                debug!(
                    "email already verified for user {}",
                    invitation.get_user_id()
                );
            }
            Err(VerifyEmailError::EmailDoesntMatch) => {
                debug!("error attempting to verify email: EmailDoesntMatch");
                return FlowOutcome::terminal(
                    TITLE_INVALID_LINK,
                    MESSAGE_EMAIL_MISMATCH,
                    StatusClass::BadRequest,
                );
            }
            // There is no way to request a new invitation from here.
            Err(VerifyEmailError::PasswordAlreadyChanged) => {
                debug!("error attempting to verify email: PasswordAlreadyChanged");
                return FlowOutcome::terminal(
                    TITLE_LINK_EXPIRED,
                    MESSAGE_VIEW_EXPIRED,
                    StatusClass::BadRequest,
                );
            }
            Err(err @ (VerifyEmailError::UserNotFound(_) | VerifyEmailError::Storage(_))) => {
                error!("internal error verifying email: {}", err);
                return FlowOutcome::terminal(
                    TITLE_PROCESSING_ERROR,
                    MESSAGE_TRY_AGAIN,
                    StatusClass::InternalError,
                );
            }
        }

        FlowOutcome::ShowForm {
            token: token.to_string(),
        }
    }

    /// Sets the password once. A weak password keeps the token usable.
    pub async fn submit(&self, token: &str, password: &str) -> FlowOutcome {
        let invitation = match self.validate(token) {
            Ok(invitation) => invitation,
            Err(outcome) => return outcome,
        };

        match self.store.change_password(&invitation, password).await {
            Ok(redirect) => FlowOutcome::Success { redirect },
            Err(ChangePasswordError::PasswordAlreadyChanged) => {
                debug!("error attempting to change password: PasswordAlreadyChanged");
                FlowOutcome::terminal(
                    TITLE_LINK_EXPIRED,
                    MESSAGE_SUBMIT_EXPIRED,
                    StatusClass::BadRequest,
                )
            }
            Err(ChangePasswordError::InvalidPassword) => {
                debug!("error attempting to change password: InvalidPassword");
                FlowOutcome::RecoverableError {
                    title: TITLE_INVALID_PASSWORD.to_string(),
                    message: format!(
                        "Please choose a password which is at least {} characters.",
                        self.store.min_password_length()
                    ),
                    token: token.to_string(),
                }
            }
            Err(
                err @ (ChangePasswordError::UserNotFound(_)
                | ChangePasswordError::Hashing(_)
                | ChangePasswordError::HashingTask(_)
                | ChangePasswordError::Storage(_)),
            ) => {
                error!("internal error changing password: {}", err);
                FlowOutcome::terminal(
                    TITLE_PROCESSING_ERROR,
                    "Please try again later",
                    StatusClass::InternalError,
                )
            }
        }
    }
}
