use blake3::Hasher;

pub mod auth_server;
pub mod config;
pub mod cryptography;
pub mod error;
pub mod flows;
pub mod response;
pub mod routes;
pub mod serde_implementations;
pub mod token;
pub mod r#trait;
pub mod user;
pub mod user_manager;

///hashes with blake3
pub fn hash_string(data: &str) -> String {
    let mut hasher = Hasher::new();
    let _ = hasher.update(data.as_bytes());
    hasher.finalize().to_string()
}
