use std::{
    env,
    fmt,
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use der::{DecodePem, Encode};
use rustls::Certificate;
use serde::{Deserialize, Serialize};
#[cfg(target_os = "linux")]
use tracing::info;
use x509_cert::Certificate as X509Certificate;
use zeroize::Zeroizing;

#[cfg(target_os = "linux")]
use crate::client_bail;
use crate::{
    HsmClient,
    error::{ClientError, result::ClientResultHelper},
};

/// Returns the path to the current user's home folder.
///
/// Returns `None` if the home folder cannot be determined.
fn get_home_folder() -> Option<PathBuf> {
    // Linux and macOS
    if let Some(home) = env::var_os("HOME") {
        return Some(PathBuf::from(home))
    }
    // Windows
    else if let Some(profile) = env::var_os("USERPROFILE") {
        return Some(PathBuf::from(profile))
    } else if let (Some(hdrive), Some(hpath)) = (env::var_os("HOMEDRIVE"), env::var_os("HOMEPATH"))
    {
        return Some(PathBuf::from(hdrive).join(hpath))
    }
    None
}

/// Returns the default configuration path
///  or an error if the path cannot be determined
fn get_default_conf_path() -> Result<PathBuf, ClientError> {
    get_home_folder()
        .ok_or_else(|| ClientError::Default("unable to determine the home folder".to_owned()))
        .map(|home| home.join(".ksema/hsm.json"))
}

/// used for serialization
const fn not(b: &bool) -> bool {
    !*b
}

/// The configuration of an HSM client, stored as JSON:
///
/// ```json
/// {
///     "server_url": "hsm.example.com:8443",
///     "api_key": "AA...AAA",
///     "pin": "123456",
///     "accept_invalid_certs": false,
///     "verified_cert": "-----BEGIN CERTIFICATE-----\n..."
/// }
/// ```
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct ClientConf {
    // accept_invalid_certs is useful when the HSM server runs
    // an invalid or unsecure SSL certificate
    #[serde(default)]
    #[serde(skip_serializing_if = "not")]
    pub accept_invalid_certs: bool,
    pub server_url: String,
    pub api_key: Zeroizing<String>,
    pub pin: Zeroizing<String>,
    /// PEM leaf certificate the HSM server must present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_cert: Option<String>,
}

impl Default for ClientConf {
    fn default() -> Self {
        Self {
            accept_invalid_certs: false,
            server_url: "https://localhost:8443".to_owned(),
            api_key: Zeroizing::default(),
            pin: Zeroizing::default(),
            verified_cert: None,
        }
    }
}

// The API key and PIN must not end up in logs
impl fmt::Debug for ClientConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConf")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("server_url", &self.server_url)
            .field("api_key", &"****")
            .field("pin", &"****")
            .field("verified_cert", &self.verified_cert.is_some())
            .finish()
    }
}

/// The environment variable holding the path of the configuration file
pub const KSEMA_CLI_CONF_ENV: &str = "KSEMA_CLI_CONF";
#[cfg(target_os = "linux")]
pub(crate) const KSEMA_CLI_CONF_DEFAULT_SYSTEM_PATH: &str = "/etc/ksema/hsm.json";

impl ClientConf {
    pub fn location(conf: Option<PathBuf>) -> Result<PathBuf, ClientError> {
        // Obtain the configuration file path from:
        // - the `--conf` arg
        // - the environment variable corresponding to `KSEMA_CLI_CONF_ENV`
        // - default to a pre-determined path
        if let Some(conf_path) = conf {
            if !conf_path.exists() {
                return Err(ClientError::Default(format!(
                    "Configuration file {} from CLI arg does not exist",
                    conf_path.display()
                )))
            }
            return Ok(conf_path)
        } else if let Ok(conf_path) = env::var(KSEMA_CLI_CONF_ENV).map(PathBuf::from) {
            if !conf_path.exists() {
                return Err(ClientError::Default(format!(
                    "Configuration file {} specified in {KSEMA_CLI_CONF_ENV} environment variable \
                     does not exist",
                    conf_path.display()
                )))
            }
            return Ok(conf_path)
        }

        let user_conf_path = get_default_conf_path();

        #[cfg(not(target_os = "linux"))]
        return user_conf_path;

        #[cfg(target_os = "linux")]
        match user_conf_path {
            Err(_) => {
                // no user home, this may be a system service
                let default_system_path = PathBuf::from(KSEMA_CLI_CONF_DEFAULT_SYSTEM_PATH);
                if default_system_path.exists() {
                    info!(
                        "No active user, using configuration at {KSEMA_CLI_CONF_DEFAULT_SYSTEM_PATH}"
                    );
                    return Ok(default_system_path)
                }
                client_bail!(
                    "no configuration found at {KSEMA_CLI_CONF_DEFAULT_SYSTEM_PATH}, and no \
                     current user, bailing out"
                );
            }
            Ok(user_conf) => {
                if !user_conf.exists() {
                    let default_system_path = PathBuf::from(KSEMA_CLI_CONF_DEFAULT_SYSTEM_PATH);
                    if default_system_path.exists() {
                        info!(
                            "Linux user conf path is at: {} but is empty, using \
                             {KSEMA_CLI_CONF_DEFAULT_SYSTEM_PATH} instead",
                            user_conf.display()
                        );
                        return Ok(default_system_path)
                    }
                    info!(
                        "Linux user conf path is at: {} and will be initialized with a default \
                         value",
                        user_conf.display()
                    );
                }
                Ok(user_conf)
            }
        }
    }

    pub fn save(&self, conf_path: &Path) -> Result<(), ClientError> {
        fs::write(
            conf_path,
            serde_json::to_string_pretty(&self)
                .with_context(|| format!("Unable to serialize configuration {self:?}"))?,
        )
        .with_context(|| {
            format!(
                "Unable to write configuration to file {}",
                conf_path.display()
            )
        })?;

        Ok(())
    }

    /// Load the configuration, writing a default one when the file does not exist
    pub fn load(conf_path: &Path) -> Result<Self, ClientError> {
        let conf = if conf_path.exists() {
            let file = File::open(conf_path).with_context(|| {
                format!("Unable to read configuration file {}", conf_path.display())
            })?;
            serde_json::from_reader(BufReader::new(file)).with_context(|| {
                format!(
                    "Error while parsing configuration file {}",
                    conf_path.display()
                )
            })?
        } else {
            let parent = conf_path.parent().with_context(|| {
                format!("Unable to get parent directory of {}", conf_path.display())
            })?;
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Unable to create directory for configuration file {}",
                    parent.display()
                )
            })?;

            let default_conf = Self::default();
            default_conf.save(conf_path)?;
            default_conf
        };

        Ok(conf)
    }

    /// The pinned leaf certificate, DER encoded, if any
    fn pinned_certificate(&self) -> Result<Option<Certificate>, ClientError> {
        self.verified_cert
            .as_ref()
            .map(|pem| -> Result<Certificate, ClientError> {
                Ok(Certificate(
                    X509Certificate::from_pem(pem.as_bytes())?.to_der()?,
                ))
            })
            .transpose()
    }

    /// Initialize and authenticate an HSM REST client.
    ///
    /// Parameters `server_url` and `accept_invalid_certs` from the command line
    /// override the ones from the configuration file.
    pub async fn initialize_hsm_client(
        &self,
        server_url: Option<&str>,
        accept_invalid_certs: Option<bool>,
        print_json: bool,
    ) -> Result<HsmClient, ClientError> {
        let server_url = server_url.unwrap_or(&self.server_url);
        let accept_invalid_certs = accept_invalid_certs.unwrap_or(self.accept_invalid_certs);

        HsmClient::instantiate(
            server_url,
            &self.api_key,
            &self.pin,
            accept_invalid_certs,
            self.pinned_certificate()?,
            print_json,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use zeroize::Zeroizing;

    use super::ClientConf;

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();

        // a missing file is created with default values
        let conf_path = dir.path().join("nested/hsm.json");
        let conf = ClientConf::load(&conf_path).unwrap();
        assert_eq!(conf, ClientConf::default());
        assert!(conf_path.exists());

        // round trip through the file
        let conf = ClientConf {
            server_url: "hsm.example.com:8443".to_owned(),
            api_key: Zeroizing::new("api-key".to_owned()),
            pin: Zeroizing::new("1234".to_owned()),
            accept_invalid_certs: true,
            ..ClientConf::default()
        };
        conf.save(&conf_path).unwrap();
        assert_eq!(ClientConf::load(&conf_path).unwrap(), conf);
    }

    #[test]
    fn test_partial_and_bad_files() {
        let dir = tempfile::tempdir().unwrap();

        let partial = dir.path().join("partial.json");
        fs::write(
            &partial,
            r#"{"server_url": "127.0.0.1:9000", "api_key": "k", "pin": "p"}"#,
        )
        .unwrap();
        let conf = ClientConf::load(&partial).unwrap();
        assert_eq!(conf.api_key.as_str(), "k");
        assert_eq!(conf.pin.as_str(), "p");
        assert!(!conf.accept_invalid_certs);
        assert!(conf.verified_cert.is_none());

        let bad = dir.path().join("bad.json");
        fs::write(&bad, r#"{"api_key": "k", "pin": "p"}"#).unwrap();
        let e = ClientConf::load(&bad).err().unwrap().to_string();
        assert!(e.contains("missing field `server_url`"));
    }

    #[test]
    fn test_secrets_are_not_printed() {
        let conf = ClientConf {
            api_key: Zeroizing::new("very-secret-key".to_owned()),
            pin: Zeroizing::new("987654".to_owned()),
            ..ClientConf::default()
        };
        let printed = format!("{conf:?}");
        assert!(!printed.contains("very-secret-key"));
        assert!(!printed.contains("987654"));
    }

    #[test]
    fn test_default_skips_accept_invalid_certs() {
        let json = serde_json::to_string(&ClientConf::default()).unwrap();
        assert!(!json.contains("accept_invalid_certs"));
        assert!(!json.contains("verified_cert"));
    }

    #[test]
    fn test_location_from_arg() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(ClientConf::location(Some(missing)).is_err());

        let existing = dir.path().join("hsm.json");
        ClientConf::default().save(&existing).unwrap();
        assert_eq!(
            ClientConf::location(Some(existing.clone())).unwrap(),
            existing
        );
    }

    #[test]
    fn test_invalid_pinned_certificate() {
        let conf = ClientConf {
            verified_cert: Some("not a certificate".to_owned()),
            ..ClientConf::default()
        };
        assert!(conf.pinned_certificate().is_err());
        assert!(ClientConf::default().pinned_certificate().unwrap().is_none());
    }
}
