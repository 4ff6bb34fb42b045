//! REST client of the Ksema managed HSM.
//!
//! ```ignore
//! let client = HsmClient::new("hsm.example.com:8443", api_key, pin).await?;
//! let ciphertext = client.encrypt(b"secret", "aes-key").await?;
//! let plaintext = client.decrypt(&ciphertext, "aes-key").await?;
//! ```

pub use config::{ClientConf, KSEMA_CLI_CONF_ENV};
pub use error::{
    ClientError,
    result::{ClientResult, ClientResultHelper},
};
pub use file_utils::{read_bytes_from_file, write_bytes_to_file};
pub use hsm_rest_client::{DEFAULT_SIGNATURE_FILE, HsmClient, IV_LENGTH, Session};
pub use user_type::UserType;

mod certificate_verifier;
mod config;
mod error;
mod file_utils;
mod hsm_rest_client;
pub mod messages;
mod user_type;
