use crate::{
    error::{ChangePasswordError, StdIoError, StorageError, TomlDeError, TomlSerError, VerifyEmailError},
    token::Invitation,
    user::{hash_password, validate_password, User},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    future::Future,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 6;

/// The account transitions an invitation can authorize. Implementations must
/// apply each transition atomically per account: concurrent verifications
/// all observe either success or `AlreadyVerified`, and of two concurrent
/// password changes exactly one succeeds.
pub trait AccountStore: Send + Sync + 'static {
    /// Marks the invited email as verified and returns the account id.
    fn verify_email(
        &self,
        invitation: &Invitation,
    ) -> impl Future<Output = Result<Uuid, VerifyEmailError>> + Send;

    /// Sets the password and returns the invitation's callback, if any.
    fn change_password(
        &self,
        invitation: &Invitation,
        plaintext: &str,
    ) -> impl Future<Output = Result<Option<String>, ChangePasswordError>> + Send;

    fn min_password_length(&self) -> usize;
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct UsersModel {
    #[serde(default)]
    users: Vec<User>,
}

pub struct UserManager {
    users: RwLock<HashMap<Uuid, User>>,
    min_password_length: usize,
    users_path: Option<PathBuf>,
}

impl UserManager {
    pub fn new(users: Vec<User>, min_password_length: usize) -> Result<Self, StorageError> {
        let mut map: HashMap<Uuid, User> = HashMap::with_capacity(users.len());
        for user in users.into_iter() {
            let id = *user.get_id();
            if map.insert(id, user).is_some() {
                return Err(StorageError::DuplicateUser(id));
            }
        }
        Ok(Self {
            users: RwLock::new(map),
            min_password_length,
            users_path: None,
        })
    }

    /// Loads accounts from a TOML users file; every successful transition is
    /// written back to the same file. A missing file starts an empty store.
    pub fn from_file(path: &Path, min_password_length: usize) -> Result<Self, StorageError> {
        let users = if path.exists() {
            let toml_string = match fs::read_to_string(path) {
                Ok(toml_string) => toml_string,
                Err(err) => return Err(StorageError::ReadUsersFile(path.to_owned(), StdIoError(err))),
            };
            match toml::from_str::<UsersModel>(&toml_string) {
                Ok(model) => model.users,
                Err(err) => {
                    return Err(StorageError::ParseUsersFile(
                        path.to_owned(),
                        TomlDeError(err),
                    ))
                }
            }
        } else {
            Vec::new()
        };
        info!("Loaded {} users from {}", users.len(), path.display());
        let mut user_manager = Self::new(users, min_password_length)?;
        user_manager.users_path = Some(path.to_owned());
        Ok(user_manager)
    }

    pub async fn get_user(&self, user_id: &Uuid) -> Option<User> {
        self.users.read().await.get(user_id).cloned()
    }

    /// Writes the accounts with `updated` in place of its stored version.
    /// Called with the write lock held and before the map is changed, so a
    /// failed write leaves memory and disk both on the old state.
    fn persist(&self, users: &HashMap<Uuid, User>, updated: &User) -> Result<(), StorageError> {
        let path = match self.users_path.as_ref() {
            Some(path) => path,
            None => return Ok(()),
        };
        let mut users: Vec<User> = users
            .values()
            .filter(|user| user.get_id() != updated.get_id())
            .cloned()
            .chain(std::iter::once(updated.to_owned()))
            .collect();
        users.sort_by_key(|user| *user.get_id());
        let toml_string = match toml::to_string(&UsersModel { users }) {
            Ok(toml_string) => toml_string,
            Err(err) => return Err(StorageError::ConvertUsersToTOML(TomlSerError(err))),
        };
        if let Err(err) = fs::write(path, toml_string) {
            return Err(StorageError::WriteUsersFile(path.to_owned(), StdIoError(err)));
        }
        Ok(())
    }
}

impl AccountStore for UserManager {
    async fn verify_email(&self, invitation: &Invitation) -> Result<Uuid, VerifyEmailError> {
        let user_id = *invitation.get_user_id();
        let mut users = self.users.write().await;
        let user = match users.get(&user_id) {
            Some(user) => user,
            None => return Err(VerifyEmailError::UserNotFound(user_id)),
        };
        if user.get_email() != invitation.get_email() {
            return Err(VerifyEmailError::EmailDoesntMatch);
        }
        if user.password_fingerprint() != invitation.get_password_fingerprint() {
            return Err(VerifyEmailError::PasswordAlreadyChanged);
        }
        if user.is_email_verified() {
            return Err(VerifyEmailError::AlreadyVerified);
        }
        let mut verified = user.to_owned();
        verified.verify_email();
        self.persist(&users, &verified)?;
        let _ = users.insert(user_id, verified);
        info!("Email verified for user {}", user_id);
        Ok(user_id)
    }

    async fn change_password(
        &self,
        invitation: &Invitation,
        plaintext: &str,
    ) -> Result<Option<String>, ChangePasswordError> {
        let user_id = *invitation.get_user_id();
        {
            let users = self.users.read().await;
            let user = match users.get(&user_id) {
                Some(user) => user,
                None => return Err(ChangePasswordError::UserNotFound(user_id)),
            };
            if user.password_fingerprint() != invitation.get_password_fingerprint() {
                return Err(ChangePasswordError::PasswordAlreadyChanged);
            }
        }
        validate_password(plaintext, self.min_password_length)?;

        // Hashing is slow, so it runs on the blocking pool outside the lock
        // and the fingerprint is checked again before the swap.
        let plaintext = plaintext.to_owned();
        let hashed_and_salted_password =
            match tokio::task::spawn_blocking(move || hash_password(&plaintext)).await {
                Ok(result) => result?,
                Err(err) => return Err(ChangePasswordError::HashingTask(err.to_string())),
            };

        let mut users = self.users.write().await;
        let user = match users.get(&user_id) {
            Some(user) => user,
            None => return Err(ChangePasswordError::UserNotFound(user_id)),
        };
        if user.password_fingerprint() != invitation.get_password_fingerprint() {
            return Err(ChangePasswordError::PasswordAlreadyChanged);
        }
        let mut updated = user.to_owned();
        updated.set_hashed_and_salted_password(hashed_and_salted_password);
        self.persist(&users, &updated)?;
        let _ = users.insert(user_id, updated);
        info!("Password set for user {}", user_id);
        Ok(invitation.get_callback().cloned())
    }

    fn min_password_length(&self) -> usize {
        self.min_password_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cryptography::{tests::test_signing_keys, KeySet},
        token::{create_invitation_token, parse_and_verify_invitation_token, InvitationClaims},
    };
    use chrono::Duration;
    use email_address::EmailAddress;
    use std::{str::FromStr, sync::Arc};

    const ISSUER: &str = "https://auth.example.com";

    fn invitation_for(user: &User, callback: Option<&str>) -> Invitation {
        let mut claims = InvitationClaims::for_user(ISSUER, user, Duration::hours(1));
        if let Some(callback) = callback {
            claims = claims.with_callback(callback);
        }
        let token = create_invitation_token(&claims, test_signing_keys()).unwrap();
        parse_and_verify_invitation_token(&token, ISSUER, &KeySet::from_signing_keys([test_signing_keys()]))
            .unwrap()
    }

    fn invited(email: &str) -> User {
        User::invited(Uuid::new_v4(), EmailAddress::from_str(email).unwrap())
    }

    #[tokio::test]
    async fn verify_email_is_idempotent() {
        let user = invited("linus@example.com");
        let invitation = invitation_for(&user, None);
        let manager = UserManager::new(vec![user.clone()], DEFAULT_MIN_PASSWORD_LENGTH).unwrap();

        assert_eq!(manager.verify_email(&invitation).await.unwrap(), *user.get_id());
        assert!(matches!(
            manager.verify_email(&invitation).await,
            Err(VerifyEmailError::AlreadyVerified)
        ));
        assert!(manager.get_user(user.get_id()).await.unwrap().is_email_verified());
    }

    #[tokio::test]
    async fn verify_email_rejects_other_address_without_mutation() {
        let user = invited("linus@example.com");
        let imposter = User::new(
            *user.get_id(),
            EmailAddress::from_str("not-linus@example.com").unwrap(),
            false,
            String::new(),
            None,
        );
        let invitation = invitation_for(&imposter, None);
        let manager = UserManager::new(vec![user.clone()], DEFAULT_MIN_PASSWORD_LENGTH).unwrap();

        assert!(matches!(
            manager.verify_email(&invitation).await,
            Err(VerifyEmailError::EmailDoesntMatch)
        ));
        assert!(!manager.get_user(user.get_id()).await.unwrap().is_email_verified());
    }

    #[tokio::test]
    async fn unknown_subject_is_not_found() {
        let invitation = invitation_for(&invited("ghost@example.com"), None);
        let manager = UserManager::new(Vec::new(), DEFAULT_MIN_PASSWORD_LENGTH).unwrap();
        assert!(matches!(
            manager.verify_email(&invitation).await,
            Err(VerifyEmailError::UserNotFound(_))
        ));
        assert!(matches!(
            manager.change_password(&invitation, "long enough").await,
            Err(ChangePasswordError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn change_password_is_single_use() {
        let user = invited("margaret@example.com");
        let invitation = invitation_for(&user, Some("https://app.example.com/done"));
        let manager = UserManager::new(vec![user.clone()], DEFAULT_MIN_PASSWORD_LENGTH).unwrap();

        assert_eq!(
            manager.change_password(&invitation, "apollo11").await.unwrap(),
            Some("https://app.example.com/done".to_string())
        );
        assert!(matches!(
            manager.change_password(&invitation, "apollo12").await,
            Err(ChangePasswordError::PasswordAlreadyChanged)
        ));
        assert!(matches!(
            manager.verify_email(&invitation).await,
            Err(VerifyEmailError::PasswordAlreadyChanged)
        ));
        let stored = manager.get_user(user.get_id()).await.unwrap();
        assert!(stored.verify_password("apollo11"));
    }

    #[tokio::test]
    async fn consumed_invitation_reports_expiry_before_policy() {
        let user = invited("margaret@example.com");
        let invitation = invitation_for(&user, None);
        let manager = UserManager::new(vec![user], DEFAULT_MIN_PASSWORD_LENGTH).unwrap();
        manager.change_password(&invitation, "apollo11").await.unwrap();
        assert!(matches!(
            manager.change_password(&invitation, "x").await,
            Err(ChangePasswordError::PasswordAlreadyChanged)
        ));
    }

    #[tokio::test]
    async fn weak_password_does_not_consume_invitation() {
        let user = invited("barbara@example.com");
        let invitation = invitation_for(&user, None);
        let manager = UserManager::new(vec![user], DEFAULT_MIN_PASSWORD_LENGTH).unwrap();

        assert!(matches!(
            manager.change_password(&invitation, "short").await,
            Err(ChangePasswordError::InvalidPassword)
        ));
        assert_eq!(manager.change_password(&invitation, "long enough").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_password_changes_have_one_winner() {
        let user = invited("dennis@example.com");
        let invitation = invitation_for(&user, None);
        let manager = Arc::new(UserManager::new(vec![user], DEFAULT_MIN_PASSWORD_LENGTH).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let manager = manager.to_owned();
                let invitation = invitation.to_owned();
                tokio::spawn(async move {
                    manager
                        .change_password(&invitation, &format!("password-{i}"))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(ChangePasswordError::PasswordAlreadyChanged) => {}
                Err(err) => panic!("unexpected error {err}"),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_verifications_have_one_fresh_success() {
        let user = invited("frances@example.com");
        let invitation = invitation_for(&user, None);
        let manager = Arc::new(UserManager::new(vec![user], DEFAULT_MIN_PASSWORD_LENGTH).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.to_owned();
                let invitation = invitation.to_owned();
                tokio::spawn(async move { manager.verify_email(&invitation).await })
            })
            .collect();

        let mut fresh = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => fresh += 1,
                Err(VerifyEmailError::AlreadyVerified) => {}
                Err(err) => panic!("unexpected error {err}"),
            }
        }
        assert_eq!(fresh, 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_account_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let users_dir = dir.path().join("accounts");
        fs::create_dir(&users_dir).unwrap();
        let path = users_dir.join("users.toml");
        let user = invited("alan@example.com");
        let invitation = invitation_for(&user, None);
        fs::write(
            &path,
            toml::to_string(&UsersModel { users: vec![user.clone()] }).unwrap(),
        )
        .unwrap();
        let manager = UserManager::from_file(&path, DEFAULT_MIN_PASSWORD_LENGTH).unwrap();
        fs::remove_dir_all(&users_dir).unwrap();

        for _ in 0..2 {
            assert!(matches!(
                manager.verify_email(&invitation).await,
                Err(VerifyEmailError::Storage(StorageError::WriteUsersFile(..)))
            ));
            assert!(matches!(
                manager.change_password(&invitation, "enigma1939").await,
                Err(ChangePasswordError::Storage(StorageError::WriteUsersFile(..)))
            ));
        }

        let stored = manager.get_user(user.get_id()).await.unwrap();
        assert!(!stored.is_email_verified());
        assert!(!stored.verify_password("enigma1939"));
        assert_eq!(stored.password_fingerprint(), user.password_fingerprint());
        assert!(stored.get_password_changed_at().is_none());
    }

    #[tokio::test]
    async fn transitions_are_written_back_to_the_users_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        let user = invited("ken@example.com");
        let invitation = invitation_for(&user, None);
        fs::write(
            &path,
            toml::to_string(&UsersModel { users: vec![user.clone()] }).unwrap(),
        )
        .unwrap();

        let manager = UserManager::from_file(&path, DEFAULT_MIN_PASSWORD_LENGTH).unwrap();
        manager.verify_email(&invitation).await.unwrap();
        manager.change_password(&invitation, "unix1969").await.unwrap();

        let reloaded = UserManager::from_file(&path, DEFAULT_MIN_PASSWORD_LENGTH).unwrap();
        let stored = reloaded.get_user(user.get_id()).await.unwrap();
        assert!(stored.is_email_verified());
        assert!(stored.verify_password("unix1969"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let user = invited("ken@example.com");
        assert!(matches!(
            UserManager::new(vec![user.clone(), user], DEFAULT_MIN_PASSWORD_LENGTH),
            Err(StorageError::DuplicateUser(_))
        ));
    }
}
