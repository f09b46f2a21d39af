use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct Base64DecodeError(pub base64::DecodeError);

#[derive(Error, Debug)]
#[error("{0}")]
pub struct SerdeError(pub serde_json::Error);

#[derive(Error, Debug)]
#[error("{0}")]
pub struct PKCS1Error(pub pkcs1::Error);

#[derive(Error, Debug)]
#[error("{0}")]
pub struct RSAError(pub rsa::Error);

#[derive(Error, Debug)]
#[error("{0}")]
pub struct SignatureError(pub signature::Error);

#[derive(Error, Debug)]
#[error("{0}")]
pub struct StdIoError(pub std::io::Error);

#[derive(Error, Debug)]
#[error("{0}")]
pub struct TomlDeError(pub toml::de::Error);

#[derive(Error, Debug)]
#[error("{0}")]
pub struct TomlSerError(pub toml::ser::Error);

#[derive(Error, Debug)]
#[error("{0}")]
pub struct Argon2Error(pub argon2::Error);

/// Failure to produce the current set of trusted verification keys.
#[derive(Error, Debug)]
pub enum KeySourceError {
    #[error("ReadKeyFile({0}, {1})")]
    ReadKeyFile(PathBuf, StdIoError),
    #[error("ParseKeyFile({0}, {1})")]
    ParseKeyFile(PathBuf, TomlDeError),
    #[error("PublicKeyFromPEMPKCS1({0}, {1})")]
    PublicKeyFromPEMPKCS1(String, PKCS1Error),
    #[error("NoTrustedKeys")]
    NoTrustedKeys,
}

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("GeneratingRSAPrivate({0})")]
    GeneratingRSAPrivate(RSAError),
    #[error("ConvertPublicKeyToPEMPKCS1({0})")]
    ConvertPublicKeyToPEMPKCS1(PKCS1Error),
    #[error("ConvertModelToTOML({0})")]
    ConvertModelToTOML(TomlSerError),
    #[error("WriteTOMLToFile({0})")]
    WriteTOMLToFile(StdIoError),
}

/// Every reason an invitation token can be rejected. The flow engine does not
/// distinguish between these; they exist for the debug log.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("InvalidFormatForDecoding")]
    InvalidFormatForDecoding,
    #[error("HeaderBase64Decode({0})")]
    HeaderBase64Decode(Base64DecodeError),
    #[error("HeaderDeserialisation({0})")]
    HeaderDeserialisation(SerdeError),
    #[error("HeaderUnexpectedAlgorithm({0})")]
    HeaderUnexpectedAlgorithm(String),
    #[error("SignatureBase64Decode({0})")]
    SignatureBase64Decode(Base64DecodeError),
    #[error("SignatureFormat({0})")]
    SignatureFormat(SignatureError),
    #[error("SignatureVerificationFailed")]
    SignatureVerificationFailed,
    #[error("PayloadBase64Decode({0})")]
    PayloadBase64Decode(Base64DecodeError),
    #[error("ClaimsDeserialisation({0})")]
    ClaimsDeserialisation(SerdeError),
    #[error("ClaimsSerialisation({0})")]
    ClaimsSerialisation(SerdeError),
    #[error("IssuerMismatch(expected: {expected}, found: {found})")]
    IssuerMismatch { expected: String, found: String },
    #[error("UnexpectedPurpose({0})")]
    UnexpectedPurpose(String),
    #[error("InvalidEmail({0})")]
    InvalidEmail(String),
    #[error("InvalidCallback({0})")]
    InvalidCallback(String),
    #[error("Expired")]
    Expired,
    #[error("NotYetValid")]
    NotYetValid,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("ReadUsersFile({0}, {1})")]
    ReadUsersFile(PathBuf, StdIoError),
    #[error("ParseUsersFile({0}, {1})")]
    ParseUsersFile(PathBuf, TomlDeError),
    #[error("ConvertUsersToTOML({0})")]
    ConvertUsersToTOML(TomlSerError),
    #[error("WriteUsersFile({0}, {1})")]
    WriteUsersFile(PathBuf, StdIoError),
    #[error("DuplicateUser({0})")]
    DuplicateUser(Uuid),
}

/// Outcomes of the email-verification transition other than a fresh success.
#[derive(Error, Debug)]
pub enum VerifyEmailError {
    #[error("EmailAlreadyVerified")]
    AlreadyVerified,
    #[error("EmailDoesntMatch")]
    EmailDoesntMatch,
    #[error("PasswordAlreadyChanged")]
    PasswordAlreadyChanged,
    #[error("UserNotFound({0})")]
    UserNotFound(Uuid),
    #[error("Storage({0})")]
    Storage(#[from] StorageError),
}

/// Outcomes of the password-set transition other than success.
#[derive(Error, Debug)]
pub enum ChangePasswordError {
    #[error("PasswordAlreadyChanged")]
    PasswordAlreadyChanged,
    #[error("InvalidPassword")]
    InvalidPassword,
    #[error("UserNotFound({0})")]
    UserNotFound(Uuid),
    #[error("Hashing({0})")]
    Hashing(Argon2Error),
    #[error("HashingTask({0})")]
    HashingTask(String),
    #[error("Storage({0})")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("NoConfigDirectory")]
    NoConfigDirectory,
    #[error("ReadConfigFile({0}, {1})")]
    ReadConfigFile(PathBuf, StdIoError),
    #[error("ParseConfigFile({0}, {1})")]
    ParseConfigFile(PathBuf, TomlDeError),
    #[error("InvalidIssuerUrl({0})")]
    InvalidIssuerUrl(String),
    #[error("InvalidInvitationPath({0})")]
    InvalidInvitationPath(String),
    #[error("InvalidLogLevel({0})")]
    InvalidLogLevel(String),
    #[error("MinPasswordLengthIsZero")]
    MinPasswordLengthIsZero,
}

#[derive(Error, Debug)]
pub enum AuthServerBuildError {
    #[error("MissingProperties({0})")]
    MissingProperties(String),
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("BindListener({0})")]
    BindListener(StdIoError),
    #[error("Serve({0})")]
    Serve(StdIoError),
    #[error("ServeTask({0})")]
    ServeTask(String),
    #[error("Logging({0})")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("KeySource({0})")]
    KeySource(#[from] KeySourceError),
    #[error("Encryption({0})")]
    Encryption(#[from] EncryptionError),
    #[error("Token({0})")]
    Token(#[from] TokenError),
    #[error("Storage({0})")]
    Storage(#[from] StorageError),
    #[error("Config({0})")]
    Config(#[from] ConfigError),
    #[error("AuthServerBuild({0})")]
    AuthServerBuild(#[from] AuthServerBuildError),
    #[error("Startup({0})")]
    Startup(#[from] StartupError),
}
