use crate::error::{EncryptionError, KeySourceError, PKCS1Error, RSAError, StdIoError, TomlDeError, TomlSerError};
use pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey, LineEnding};
use rand::rngs::OsRng;
use rsa::{
    pkcs1v15::{SigningKey, VerifyingKey},
    sha2::Sha256,
    signature::Keypair,
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_KEY_BITS: usize = 2048;

/// Signing half of an invitation key pair. Only the issuing side holds one of
/// these; the service itself only ever sees a [`KeySet`].
pub struct SigningKeys {
    id: String,
    public_key: RsaPublicKey,
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
}

impl SigningKeys {
    pub fn new(id: impl Into<String>) -> Result<Self, EncryptionError> {
        Self::with_bits(id, DEFAULT_KEY_BITS)
    }

    pub fn with_bits(id: impl Into<String>, bits: usize) -> Result<Self, EncryptionError> {
        let mut rng: OsRng = OsRng;
        let private_key: RsaPrivateKey = match RsaPrivateKey::new(&mut rng, bits) {
            Ok(private_key) => private_key,
            Err(err) => return Err(EncryptionError::GeneratingRSAPrivate(RSAError(err))),
        };
        let public_key: RsaPublicKey = private_key.to_public_key();
        let signing_key = SigningKey::<Sha256>::new(private_key);
        let verifying_key = signing_key.verifying_key();
        Ok(Self {
            id: id.into(),
            public_key,
            signing_key,
            verifying_key,
        })
    }

    pub fn get_id(&self) -> &str {
        &self.id
    }

    pub fn get_signing_key(&self) -> &SigningKey<Sha256> {
        &self.signing_key
    }

    pub fn get_verifying_key(&self) -> VerifyingKey<Sha256> {
        self.verifying_key.to_owned()
    }

    pub fn public_key_pem(&self) -> Result<String, EncryptionError> {
        match self.public_key.to_pkcs1_pem(LineEnding::LF) {
            Ok(pem) => Ok(pem),
            Err(err) => Err(EncryptionError::ConvertPublicKeyToPEMPKCS1(PKCS1Error(err))),
        }
    }

    pub fn to_trusted_key(&self) -> Result<TrustedKeyModel, EncryptionError> {
        Ok(TrustedKeyModel {
            id: self.id.to_owned(),
            public_key: self.public_key_pem()?,
        })
    }
}

/// The public keys currently allowed to sign invitations.
#[derive(Clone, Debug, Default)]
pub struct KeySet {
    keys: Vec<(String, VerifyingKey<Sha256>)>,
}

impl KeySet {
    pub fn new(keys: Vec<(String, VerifyingKey<Sha256>)>) -> Self {
        Self { keys }
    }

    pub fn from_signing_keys<'a>(signing_keys: impl IntoIterator<Item = &'a SigningKeys>) -> Self {
        Self {
            keys: signing_keys
                .into_iter()
                .map(|keys| (keys.get_id().to_owned(), keys.get_verifying_key()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, VerifyingKey<Sha256>)> {
        self.keys.iter()
    }
}

/// Produces the set of keys to verify invitation tokens against. Called once
/// per request, so rotated keys take effect without a restart.
pub trait KeySource: Send + Sync + 'static {
    fn trusted_keys(&self) -> Result<KeySet, KeySourceError>;
}

impl KeySource for KeySet {
    fn trusted_keys(&self) -> Result<KeySet, KeySourceError> {
        if self.is_empty() {
            return Err(KeySourceError::NoTrustedKeys);
        }
        Ok(self.to_owned())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrustedKeyModel {
    pub id: String,
    pub public_key: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct TrustedKeysModel {
    #[serde(default)]
    pub keys: Vec<TrustedKeyModel>,
}

impl TrustedKeysModel {
    pub fn save_to_file(&self, path: &Path) -> Result<(), EncryptionError> {
        let toml_string = match toml::to_string(self) {
            Ok(toml) => toml,
            Err(err) => return Err(EncryptionError::ConvertModelToTOML(TomlSerError(err))),
        };
        if let Err(err) = fs::write(path, toml_string) {
            return Err(EncryptionError::WriteTOMLToFile(StdIoError(err)));
        }
        Ok(())
    }

    fn to_key_set(&self) -> Result<KeySet, KeySourceError> {
        let mut keys = Vec::with_capacity(self.keys.len());
        for key in self.keys.iter() {
            let public_key = match RsaPublicKey::from_pkcs1_pem(&key.public_key) {
                Ok(public_key) => public_key,
                Err(err) => {
                    return Err(KeySourceError::PublicKeyFromPEMPKCS1(
                        key.id.to_owned(),
                        PKCS1Error(err),
                    ))
                }
            };
            keys.push((key.id.to_owned(), VerifyingKey::<Sha256>::new(public_key)));
        }
        if keys.is_empty() {
            return Err(KeySourceError::NoTrustedKeys);
        }
        Ok(KeySet::new(keys))
    }
}

/// Reads the trusted keys from a TOML file on every call.
pub struct FileKeySource {
    path: PathBuf,
}

impl FileKeySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }
}

impl KeySource for FileKeySource {
    fn trusted_keys(&self) -> Result<KeySet, KeySourceError> {
        let toml_string = match fs::read_to_string(&self.path) {
            Ok(toml_string) => toml_string,
            Err(err) => return Err(KeySourceError::ReadKeyFile(self.path.to_owned(), StdIoError(err))),
        };
        let model = match toml::from_str::<TrustedKeysModel>(&toml_string) {
            Ok(model) => model,
            Err(err) => {
                return Err(KeySourceError::ParseKeyFile(
                    self.path.to_owned(),
                    TomlDeError(err),
                ))
            }
        };
        model.to_key_set()
    }
}
