//! JSON payloads exchanged with the HSM REST API.
//!
//! Byte fields travel as standard (padded) base64 strings.

use serde::{Deserialize, Serialize};

use crate::UserType;

pub const AUTH_ENDPOINT: &str = "/api/hsm/auth";
pub const PING_ENDPOINT: &str = "/api/hsm/ping";
pub const ENCRYPT_ENDPOINT: &str = "/api/hsm/encrypt";
pub const DECRYPT_ENDPOINT: &str = "/api/hsm/decrypt";
pub const SIGN_ENDPOINT: &str = "/api/hsm/sign";
pub const VERIFY_ENDPOINT: &str = "/api/hsm/verify";
pub const RANDOM_ENDPOINT: &str = "/api/hsm/rng";
pub const BACKUP_ENDPOINT: &str = "/api/hsm/backup";
pub const RESTORE_ENDPOINT: &str = "/api/hsm/restore";
pub const DELETE_ENDPOINT: &str = "/api/hsm/delete";
pub const GENKEY_SYM_ENDPOINT: &str = "/api/hsm/genkey/sym";
pub const GENKEY_ASYM_ENDPOINT: &str = "/api/hsm/genkey/asym";
pub const SET_IV_ENDPOINT: &str = "/api/hsm/setiv";

pub(crate) mod base64_serde {
    use base64::{Engine as _, engine::general_purpose::STANDARD as b64};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub(crate) fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&b64.encode(bytes.as_ref()))
    }

    pub(crate) fn serialize_option<S, T>(
        bytes: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        match bytes {
            Some(bytes) => serialize(bytes, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        b64.decode(encoded).map_err(D::Error::custom)
    }
}

/// Bytes carried as a base64 string
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Base64Bytes(#[serde(with = "base64_serde")] pub Vec<u8>);

impl From<Base64Bytes> for Vec<u8> {
    fn from(bytes: Base64Bytes) -> Self {
        bytes.0
    }
}

/// The envelope of every HSM response
#[derive(Deserialize, Debug)]
pub struct HsmResponse<T> {
    pub success: bool,
    pub data: Option<T>,
}

#[derive(Serialize)]
pub struct AuthRequest<'a> {
    pub api_key: &'a str,
    pub pin: &'a str,
}

/// `data` field of a successful authentication
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_type: UserType,
}

/// A request carrying only the session
#[derive(Serialize, Debug)]
pub struct SessionRequest<'a> {
    pub session_id: &'a str,
}

/// Encrypt, decrypt and sign requests
#[derive(Serialize, Debug)]
pub struct DataRequest<'a> {
    pub session_id: &'a str,
    #[serde(serialize_with = "base64_serde::serialize")]
    pub data: &'a [u8],
    pub key_label: &'a str,
}

#[derive(Serialize, Debug)]
pub struct VerifyRequest<'a> {
    pub session_id: &'a str,
    #[serde(serialize_with = "base64_serde::serialize")]
    pub data: &'a [u8],
    #[serde(serialize_with = "base64_serde::serialize")]
    pub signature: &'a [u8],
    pub key_label: &'a str,
}

/// `data`, when present, is the big endian encoding of the requested length
#[derive(Serialize, Debug)]
pub struct RandomRequest<'a> {
    pub session_id: &'a str,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "base64_serde::serialize_option"
    )]
    pub data: Option<[u8; 2]>,
}

impl<'a> RandomRequest<'a> {
    #[must_use]
    pub fn new(session_id: &'a str, length: u16) -> Self {
        Self {
            session_id,
            data: (length > 0).then(|| length.to_be_bytes()),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct BackupRequest<'a> {
    pub session_id: &'a str,
    pub user_type: UserType,
    #[serde(serialize_with = "base64_serde::serialize")]
    pub data: &'a [u8],
    pub key_label: &'a str,
}

/// Restore and IV override requests
#[derive(Serialize, Debug)]
pub struct SessionDataRequest<'a> {
    pub session_id: &'a str,
    #[serde(serialize_with = "base64_serde::serialize")]
    pub data: &'a [u8],
}

/// Delete and symmetric key generation requests
#[derive(Serialize, Debug)]
pub struct KeyLabelRequest<'a> {
    pub session_id: &'a str,
    pub key_label: &'a str,
}

#[derive(Serialize, Debug)]
pub struct KeyPairRequest<'a> {
    pub session_id: &'a str,
    pub public_key_label: &'a str,
    pub private_key_label: &'a str,
}
