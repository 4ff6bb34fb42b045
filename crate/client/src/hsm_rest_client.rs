use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use base64::{Engine as _, engine::general_purpose::STANDARD as b64};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use rustls::Certificate;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, trace, warn};
use url::Url;
use zeroize::Zeroizing;

use crate::{
    UserType,
    certificate_verifier::build_pinned_tls_client,
    error::{
        ClientError,
        result::{ClientResult, ClientResultHelper},
    },
    file_utils::{read_bytes_from_file, write_bytes_to_file},
    messages::{
        AUTH_ENDPOINT, AuthRequest, BACKUP_ENDPOINT, BackupRequest, Base64Bytes, DECRYPT_ENDPOINT,
        DELETE_ENDPOINT, DataRequest, ENCRYPT_ENDPOINT, GENKEY_ASYM_ENDPOINT,
        GENKEY_SYM_ENDPOINT, HsmResponse, KeyLabelRequest, KeyPairRequest, PING_ENDPOINT,
        RANDOM_ENDPOINT, RESTORE_ENDPOINT, RandomRequest, SET_IV_ENDPOINT, SIGN_ENDPOINT,
        SessionDataRequest, SessionInfo, SessionRequest, VERIFY_ENDPOINT, VerifyRequest,
    },
};

/// The file `sign` writes the signature to, in the current directory
pub const DEFAULT_SIGNATURE_FILE: &str = "signature.file";

/// Length, in bytes, of an IV override
pub const IV_LENGTH: usize = 16;

struct Credentials {
    api_key: Zeroizing<String>,
    pin: Zeroizing<String>,
}

/// The server issued authorization context of a client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    session_id: String,
    user_type: UserType,
}

impl Session {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub const fn user_type(&self) -> UserType {
        self.user_type
    }
}

impl From<SessionInfo> for Session {
    fn from(info: SessionInfo) -> Self {
        Self {
            session_id: info.session_id,
            user_type: info.user_type,
        }
    }
}

/// A client of the Ksema managed HSM REST API.
///
/// The client authenticates once, when it is instantiated, and keeps the
/// session for its whole lifetime. It never re-authenticates by itself: when the
/// server reports an expired session ([`ClientError::SessionExpired`]), call
/// [`HsmClient::reconnect`].
#[derive(Clone)]
pub struct HsmClient {
    pub server_url: String,
    client: Client,
    credentials: Arc<Credentials>,
    session: Session,
    /// will output the JSON requests and responses
    print_json: bool,
}

impl HsmClient {
    /// Authenticate to the HSM at `server_address` with certificate verification on.
    ///
    /// `server_address` is either `host:port`, reached over HTTPS, or a full URL.
    pub async fn new(server_address: &str, api_key: &str, pin: &str) -> ClientResult<Self> {
        Self::instantiate(server_address, api_key, pin, false, None, false).await
    }

    /// Instantiate a new HSM REST Client and authenticate it
    pub async fn instantiate(
        server_address: &str,
        api_key: &str,
        pin: &str,
        accept_invalid_certs: bool,
        verified_cert: Option<Certificate>,
        print_json: bool,
    ) -> ClientResult<Self> {
        let server_url = normalize_server_url(server_address)?;

        if accept_invalid_certs {
            warn!("TLS certificate verification of the HSM server at {server_url} is disabled");
        }

        // We deal with 3 scenarios:
        // 1. a pinned leaf certificate: only this certificate is accepted
        // 2. self-signed or untrusted certificates: verifications are removed on request
        // 3. classic TLS verification based on the root CAs (default)
        let builder = if let Some(certificate) = verified_cert {
            build_pinned_tls_client(certificate, accept_invalid_certs)
        } else {
            ClientBuilder::new().danger_accept_invalid_certs(accept_invalid_certs)
        };

        let client = builder
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Reqwest client builder")?;

        let credentials = Arc::new(Credentials {
            api_key: Zeroizing::new(api_key.to_owned()),
            pin: Zeroizing::new(pin.to_owned()),
        });

        let session = authenticate(&client, &server_url, &credentials, print_json).await?;
        debug!(
            "authenticated to the HSM at {server_url} as {}",
            session.user_type
        );

        Ok(Self {
            server_url,
            client,
            credentials,
            session,
            print_json,
        })
    }

    /// Authenticate again with the same credentials and transport, returning a
    /// client bound to the new session.
    ///
    /// A new session drops any IV override set with [`HsmClient::set_iv`].
    pub async fn reconnect(&self) -> ClientResult<Self> {
        let session = authenticate(
            &self.client,
            &self.server_url,
            &self.credentials,
            self.print_json,
        )
        .await?;
        debug!("re-authenticated to the HSM at {}", self.server_url);
        Ok(Self {
            session,
            ..self.clone()
        })
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn user_type(&self) -> UserType {
        self.session.user_type
    }

    /// Check that the server is up and the session is valid
    pub async fn ping(&self) -> ClientResult<()> {
        self.post_unit(
            PING_ENDPOINT,
            &SessionRequest {
                session_id: &self.session.session_id,
            },
        )
        .await
    }

    /// Encrypt `data` with the key `key_label` and return the base64 ciphertext.
    ///
    /// User objects may leave `key_label` empty to use their own key.
    pub async fn encrypt(&self, data: &[u8], key_label: &str) -> ClientResult<String> {
        self.check_key_label(key_label)?;
        let ciphertext = self
            .post_for_bytes(
                ENCRYPT_ENDPOINT,
                &DataRequest {
                    session_id: &self.session.session_id,
                    data,
                    key_label,
                },
            )
            .await?;
        Ok(b64.encode(ciphertext))
    }

    /// Decrypt a base64 ciphertext and return the plaintext as text
    pub async fn decrypt(&self, ciphertext: &str, key_label: &str) -> ClientResult<String> {
        let plaintext = self.decrypt_bytes(ciphertext, key_label).await?;
        String::from_utf8(plaintext)
            .map_err(|e| ClientError::Conversion(format!("the plaintext is not UTF-8: {e}")))
    }

    /// Decrypt a base64 ciphertext and return the raw plaintext bytes
    pub async fn decrypt_bytes(&self, ciphertext: &str, key_label: &str) -> ClientResult<Vec<u8>> {
        self.check_key_label(key_label)?;
        let ciphertext = b64.decode(ciphertext)?;
        self.post_for_bytes(
            DECRYPT_ENDPOINT,
            &DataRequest {
                session_id: &self.session.session_id,
                data: &ciphertext,
                key_label,
            },
        )
        .await
    }

    /// Sign the content of `data_file` and write the signature to
    /// [`DEFAULT_SIGNATURE_FILE`] in the current directory.
    ///
    /// Returns the path of the signature file.
    pub async fn sign(&self, data_file: impl AsRef<Path>, key_label: &str) -> ClientResult<PathBuf> {
        self.sign_to(data_file, key_label, DEFAULT_SIGNATURE_FILE)
            .await
    }

    /// Sign the content of `data_file` and write the signature to `signature_file`
    pub async fn sign_to(
        &self,
        data_file: impl AsRef<Path>,
        key_label: &str,
        signature_file: impl AsRef<Path>,
    ) -> ClientResult<PathBuf> {
        self.check_key_label(key_label)?;
        let data_file = data_file.as_ref();
        if data_file.as_os_str().is_empty() {
            return Err(ClientError::MissingFileName("data filename".to_owned()))
        }
        let data = read_bytes_from_file(&data_file)?;

        let signature = self
            .post_for_bytes(
                SIGN_ENDPOINT,
                &DataRequest {
                    session_id: &self.session.session_id,
                    data: &data,
                    key_label,
                },
            )
            .await?;

        let signature_file = signature_file.as_ref().to_path_buf();
        write_bytes_to_file(&signature, &signature_file)?;
        debug!(
            "signature of {} written to {}",
            data_file.display(),
            signature_file.display()
        );
        Ok(signature_file)
    }

    /// Verify the signature stored in `signature_file` of the content of `data_file`
    pub async fn verify(
        &self,
        data_file: impl AsRef<Path>,
        signature_file: impl AsRef<Path>,
        key_label: &str,
    ) -> ClientResult<()> {
        self.check_key_label(key_label)?;
        let (data_file, signature_file) = (data_file.as_ref(), signature_file.as_ref());
        if data_file.as_os_str().is_empty() || signature_file.as_os_str().is_empty() {
            return Err(ClientError::MissingFileName("required filename".to_owned()))
        }
        let data = read_bytes_from_file(&data_file)?;
        let signature = read_bytes_from_file(&signature_file)?;

        self.post_unit(
            VERIFY_ENDPOINT,
            &VerifyRequest {
                session_id: &self.session.session_id,
                data: &data,
                signature: &signature,
                key_label,
            },
        )
        .await
    }

    /// Generate `length` random bytes, returned in base64.
    ///
    /// A `length` of 0 lets the server pick its default length (32 bytes).
    pub async fn random(&self, length: u16) -> ClientResult<String> {
        let random = self
            .post_for_bytes(
                RANDOM_ENDPOINT,
                &RandomRequest::new(&self.session.session_id, length),
            )
            .await?;
        Ok(b64.encode(random))
    }

    /// Back up the key `key_label` to `file_name`.
    ///
    /// The backup file lives on the server: only its name is sent.
    pub async fn backup(&self, file_name: &str, key_label: &str) -> ClientResult<()> {
        self.check_key_label(key_label)?;
        self.post_unit(
            BACKUP_ENDPOINT,
            &BackupRequest {
                session_id: &self.session.session_id,
                user_type: self.session.user_type,
                data: file_name.as_bytes(),
                key_label,
            },
        )
        .await
    }

    /// Restore the keys backed up to the server side `file_name`
    pub async fn restore(&self, file_name: &str) -> ClientResult<()> {
        self.post_unit(
            RESTORE_ENDPOINT,
            &SessionDataRequest {
                session_id: &self.session.session_id,
                data: file_name.as_bytes(),
            },
        )
        .await
    }

    pub async fn delete(&self, key_label: &str) -> ClientResult<()> {
        self.check_key_label(key_label)?;
        self.post_unit(
            DELETE_ENDPOINT,
            &KeyLabelRequest {
                session_id: &self.session.session_id,
                key_label,
            },
        )
        .await
    }

    /// Generate a key.
    ///
    /// With only `label1`, a symmetric key is generated. When `label2` is not
    /// empty, an asymmetric key pair is generated with `label1` as the public key
    /// label and `label2` as the private key label.
    ///
    /// User objects are not allowed to generate keys: the server enforces it.
    pub async fn gen_key(&self, label1: &str, label2: &str) -> ClientResult<()> {
        if label2.is_empty() {
            self.post_unit(
                GENKEY_SYM_ENDPOINT,
                &KeyLabelRequest {
                    session_id: &self.session.session_id,
                    key_label: label1,
                },
            )
            .await
        } else {
            self.post_unit(
                GENKEY_ASYM_ENDPOINT,
                &KeyPairRequest {
                    session_id: &self.session.session_id,
                    public_key_label: label1,
                    private_key_label: label2,
                },
            )
            .await
        }
    }

    /// Override the default IV for the rest of the session
    pub async fn set_iv(&self, iv: &str) -> ClientResult<()> {
        if iv.len() != IV_LENGTH {
            return Err(ClientError::InvalidIv(iv.len()))
        }
        self.post_unit(
            SET_IV_ENDPOINT,
            &SessionDataRequest {
                session_id: &self.session.session_id,
                data: iv.as_bytes(),
            },
        )
        .await
    }

    fn check_key_label(&self, key_label: &str) -> ClientResult<()> {
        if key_label.is_empty() && self.session.user_type.requires_key_label() {
            return Err(ClientError::MissingKeyLabel(self.session.user_type))
        }
        Ok(())
    }

    async fn post_unit<O>(&self, endpoint: &str, request: &O) -> ClientResult<()>
    where
        O: Serialize,
    {
        self.post::<O, serde_json::Value>(endpoint, request)
            .await
            .map(|_| ())
    }

    async fn post_for_bytes<O>(&self, endpoint: &str, request: &O) -> ClientResult<Vec<u8>>
    where
        O: Serialize,
    {
        self.post::<O, Base64Bytes>(endpoint, request)
            .await?
            .map(Vec::from)
            .ok_or_else(|| {
                ClientError::ResponseFailed(format!("{endpoint}: the response carries no data"))
            })
    }

    async fn post<O, R>(&self, endpoint: &str, request: &O) -> ClientResult<Option<R>>
    where
        O: Serialize,
        R: DeserializeOwned,
    {
        let server_url = format!("{}{endpoint}", self.server_url);
        if self.print_json {
            println!(
                "\nHSM Request ==>\n{}",
                serde_json::to_string_pretty(request).unwrap_or_else(|_| "[N/A]".to_owned())
            );
        }
        trace!(
            "==> {endpoint}\n{}",
            serde_json::to_string_pretty(request).unwrap_or_else(|_| "[N/A]".to_owned())
        );

        let response = self.client.post(server_url).json(request).send().await?;
        let response: HsmResponse<R> = read_response(endpoint, response, self.print_json).await?;
        if !response.success {
            return Err(ClientError::RequestFailed(format!(
                "{endpoint}: the HSM reported a failure"
            )))
        }
        Ok(response.data)
    }
}

/// Prefix bare `host:port` addresses with `https://` and validate the URL
fn normalize_server_url(server_address: &str) -> ClientResult<String> {
    let server_url = if server_address.contains("://") {
        server_address.trim_end_matches('/').to_owned()
    } else {
        format!("https://{}", server_address.trim_end_matches('/'))
    };
    Url::parse(&server_url)?;
    Ok(server_url)
}

/// Post the credentials and open a session.
///
/// The request is never traced: it carries the API key and PIN.
async fn authenticate(
    client: &Client,
    server_url: &str,
    credentials: &Credentials,
    print_json: bool,
) -> ClientResult<Session> {
    let response = client
        .post(format!("{server_url}{AUTH_ENDPOINT}"))
        .json(&AuthRequest {
            api_key: credentials.api_key.as_str(),
            pin: credentials.pin.as_str(),
        })
        .send()
        .await?;

    let response: HsmResponse<SessionInfo> =
        read_response(AUTH_ENDPOINT, response, print_json).await?;
    if !response.success {
        return Err(ClientError::AuthenticationFailed(
            "the HSM rejected the API key or PIN".to_owned(),
        ))
    }
    response.data.map(Session::from).ok_or_else(|| {
        ClientError::ResponseFailed(format!("{AUTH_ENDPOINT}: the response carries no session"))
    })
}

/// Decode the JSON envelope of a successful HTTP response
async fn read_response<R>(
    endpoint: &str,
    response: Response,
    print_json: bool,
) -> ClientResult<HsmResponse<R>>
where
    R: DeserializeOwned,
{
    let status_code = response.status();
    if !status_code.is_success() {
        let p = handle_error(endpoint, response).await?;
        return Err(match status_code {
            StatusCode::UNAUTHORIZED if endpoint == AUTH_ENDPOINT => {
                ClientError::AuthenticationFailed(p)
            }
            StatusCode::UNAUTHORIZED => ClientError::SessionExpired(p),
            _ => ClientError::RequestFailed(p),
        })
    }

    let body = response.text().await?;
    if print_json {
        println!("\nHSM Response <==\n{body}\n");
    }
    trace!("<== {endpoint}\n{body}");
    serde_json::from_str(&body).map_err(|e| ClientError::ResponseFailed(format!("{endpoint}: {e}")))
}

/// Some errors are returned by a proxy or the HTTP layer without a body.
/// In that case, we make the error clearer here for the client.
async fn handle_error(endpoint: &str, response: Response) -> ClientResult<String> {
    trace!("Error response received on {endpoint}: Response: {response:?}");
    let status = response.status();
    let text = response.text().await?;

    Ok(format!(
        "{}: {}",
        endpoint,
        if text.is_empty() {
            match status {
                StatusCode::NOT_FOUND => "HSM server endpoint does not exist".to_owned(),
                StatusCode::UNAUTHORIZED => "session is unknown or expired".to_owned(),
                _ => format!("{status} {text}"),
            }
        } else {
            text
        }
    ))
}

#[cfg(test)]
mod tests {
    use super::normalize_server_url;

    #[test]
    fn test_normalize_server_url() {
        assert_eq!(
            normalize_server_url("hsm.example.com:8443").unwrap(),
            "https://hsm.example.com:8443"
        );
        assert_eq!(
            normalize_server_url("http://127.0.0.1:9000/").unwrap(),
            "http://127.0.0.1:9000"
        );
        assert!(normalize_server_url("https://").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // nothing listens on port 9 (discard) on the loopback
        let result = super::HsmClient::new("http://127.0.0.1:9", "key", "pin").await;
        assert!(result.is_err());
    }
}
