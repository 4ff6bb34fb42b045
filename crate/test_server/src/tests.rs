use std::fs;

use base64::{Engine as _, engine::general_purpose::STANDARD as b64};
use ksema_client::{
    ClientConf, ClientError, DEFAULT_SIGNATURE_FILE, HsmClient, UserType, client_error,
    messages::{BACKUP_ENDPOINT, ENCRYPT_ENDPOINT, RANDOM_ENDPOINT, SIGN_ENDPOINT},
};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::{
    SelfSignedIdentity, StubHsmConfig, TestsContext, start_test_hsm_server,
    start_test_hsm_server_with_options,
};

fn start_with(user_type: UserType) -> Result<TestsContext, ClientError> {
    start_test_hsm_server(StubHsmConfig {
        user_type,
        ..StubHsmConfig::default()
    })
}

#[tokio::test]
async fn test_start_server() -> Result<(), ClientError> {
    let context = start_test_hsm_server(StubHsmConfig::default())?;
    let client = context.client().await?;
    client.ping().await?;
    assert_eq!(client.user_type(), UserType::UserObject);
    context.stop_server().await
}

#[tokio::test]
async fn test_authentication_failure() -> Result<(), ClientError> {
    let context = start_test_hsm_server(StubHsmConfig::default())?;

    let result = HsmClient::new(&context.server_url, "test-api-key", "wrong pin").await;
    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));

    let result = HsmClient::new(&context.server_url, "wrong key", "1234").await;
    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));

    context.stop_server().await
}

#[tokio::test]
async fn test_encrypt_decrypt() -> Result<(), ClientError> {
    let context = start_with(UserType::UserObject)?;
    let client = context.client().await?;

    for key_label in ["", "aes-256"] {
        let ciphertext = client.encrypt(b"hello HSM", key_label).await?;
        assert_ne!(b64.decode(&ciphertext)?, b"hello HSM".to_vec());
        let plaintext = client.decrypt(&ciphertext, key_label).await?;
        assert_eq!(plaintext, "hello HSM");
    }

    // binary plaintexts only survive `decrypt_bytes`
    let ciphertext = client.encrypt(&[0xff, 0xfe, 0x00], "aes-256").await?;
    assert_eq!(
        client.decrypt_bytes(&ciphertext, "aes-256").await?,
        vec![0xff, 0xfe, 0x00]
    );
    let result = client.decrypt(&ciphertext, "aes-256").await;
    assert!(matches!(result, Err(ClientError::Conversion(_))));

    context.stop_server().await
}

#[tokio::test]
async fn test_decrypt_invalid_base64_is_local() -> Result<(), ClientError> {
    let context = start_with(UserType::UserObject)?;
    let client = context.client().await?;
    let requests_before = context.hsm.request_count();

    let result = client.decrypt("this is not base64!", "aes").await;
    assert!(matches!(result, Err(ClientError::Base64DecodeError(_))));
    assert_eq!(context.hsm.request_count(), requests_before);

    context.stop_server().await
}

#[tokio::test]
async fn test_missing_key_label_above_baseline() -> Result<(), ClientError> {
    let context = start_with(UserType::UserSlot)?;
    let client = context.client().await?;
    let dir = tempfile::tempdir()?;
    let data_file = dir.path().join("data.txt");
    fs::write(&data_file, b"to be signed")?;
    let requests_before = context.hsm.request_count();

    let results = [
        client.encrypt(b"data", "").await.map(|_| ()),
        client.decrypt("AQID", "").await.map(|_| ()),
        client.sign(&data_file, "").await.map(|_| ()),
        client.verify(&data_file, &data_file, "").await,
        client.backup("keys.bak", "").await,
        client.delete("").await,
    ];
    for result in results {
        assert!(matches!(
            result,
            Err(ClientError::MissingKeyLabel(UserType::UserSlot))
        ));
    }
    assert_eq!(context.hsm.request_count(), requests_before);

    context.stop_server().await
}

#[tokio::test]
async fn test_empty_key_label_at_baseline_is_sent() -> Result<(), ClientError> {
    let context = start_with(UserType::UserObject)?;
    let client = context.client().await?;
    let requests_before = context.hsm.request_count();

    client.encrypt(b"data", "").await?;
    assert_eq!(context.hsm.request_count(), requests_before + 1);

    // the server has no key to delete: the failure comes from the server
    let result = client.delete("").await;
    assert!(matches!(result, Err(ClientError::RequestFailed(_))));
    assert_eq!(context.hsm.request_count(), requests_before + 2);

    context.stop_server().await
}

#[tokio::test]
async fn test_set_iv() -> Result<(), ClientError> {
    let context = start_with(UserType::UserObject)?;
    let client = context.client().await?;
    let requests_before = context.hsm.request_count();

    for iv in ["", "too short", "seventeen chars!!"] {
        let result = client.set_iv(iv).await;
        assert!(matches!(result, Err(ClientError::InvalidIv(len)) if len == iv.len()));
    }
    assert_eq!(context.hsm.request_count(), requests_before);

    client.set_iv("0123456789abcdef").await?;
    assert_eq!(context.hsm.iv(), Some(b"0123456789abcdef".to_vec()));

    // the override does not survive a new session
    let client = client.reconnect().await?;
    client.ping().await?;
    assert_eq!(context.hsm.iv(), None);

    context.stop_server().await
}

#[tokio::test]
async fn test_random() -> Result<(), ClientError> {
    let context = start_with(UserType::UserObject)?;
    let client = context.client().await?;

    let random = b64.decode(client.random(0).await?)?;
    assert_eq!(random.len(), 32);

    let random = b64.decode(client.random(300).await?)?;
    assert_eq!(random.len(), 300);

    let requests = context.hsm.requests_to(RANDOM_ENDPOINT);
    assert_eq!(requests.len(), 2);
    assert!(requests[0].get("data").is_none());
    // 300 as a 2-byte big endian field: 0x01 0x2C
    assert_eq!(requests[1]["data"], Value::from("ASw="));

    context.stop_server().await
}

#[tokio::test]
async fn test_sign_verify() -> Result<(), ClientError> {
    let context = start_with(UserType::UserSlot)?;
    let client = context.client().await?;
    let dir = tempfile::tempdir()?;
    let data_file = dir.path().join("contract.pdf");
    fs::write(&data_file, b"the content of the contract")?;
    let signature_file = dir.path().join("contract.sig");

    let written = client
        .sign_to(&data_file, "rsa-private", &signature_file)
        .await?;
    assert_eq!(written, signature_file);
    assert!(!fs::read(&signature_file)?.is_empty());

    client
        .verify(&data_file, &signature_file, "rsa-private")
        .await?;

    // a tampered document fails the verification on the server side
    let tampered_file = dir.path().join("tampered.pdf");
    fs::write(&tampered_file, b"the content of another contract")?;
    let result = client
        .verify(&tampered_file, &signature_file, "rsa-private")
        .await;
    assert!(matches!(result, Err(ClientError::RequestFailed(_))));

    context.stop_server().await
}

#[tokio::test]
async fn test_sign_default_signature_file() -> Result<(), ClientError> {
    let context = start_with(UserType::UserObject)?;
    let client = context.client().await?;
    let dir = tempfile::tempdir()?;
    let data_file = dir.path().join("data.bin");
    fs::write(&data_file, [1_u8, 2, 3])?;

    let signature_file = client.sign(&data_file, "").await?;
    assert_eq!(signature_file.to_str(), Some(DEFAULT_SIGNATURE_FILE));
    let verified = client.verify(&data_file, &signature_file, "").await;
    fs::remove_file(&signature_file)?;
    verified?;

    context.stop_server().await
}

#[tokio::test]
async fn test_sign_missing_file_is_local() -> Result<(), ClientError> {
    let context = start_with(UserType::UserObject)?;
    let client = context.client().await?;
    let dir = tempfile::tempdir()?;
    let requests_before = context.hsm.request_count();

    let result = client.sign(dir.path().join("missing.txt"), "key").await;
    let err = result.unwrap_err().to_string();
    assert!(err.starts_with("could not open the file"), "{err}");

    let result = client.sign("", "key").await;
    assert!(matches!(result, Err(ClientError::MissingFileName(_))));

    let result = client.verify("", "signature.sig", "key").await;
    assert!(matches!(result, Err(ClientError::MissingFileName(_))));

    assert_eq!(context.hsm.request_count(), requests_before);
    assert!(context.hsm.requests_to(SIGN_ENDPOINT).is_empty());

    context.stop_server().await
}

#[tokio::test]
async fn test_gen_key_and_delete() -> Result<(), ClientError> {
    let context = start_with(UserType::Administrator)?;
    let client = context.client().await?;

    client.gen_key("aes-256", "").await?;
    assert!(context.hsm.has_key("aes-256"));

    client.gen_key("ec-public", "ec-private").await?;
    assert!(context.hsm.has_key("ec-public"));
    assert!(context.hsm.has_key("ec-private"));

    client.delete("aes-256").await?;
    assert!(!context.hsm.has_key("aes-256"));

    let result = client.delete("aes-256").await;
    assert!(matches!(result, Err(ClientError::RequestFailed(_))));

    context.stop_server().await
}

#[tokio::test]
async fn test_gen_key_denied_to_user_object() -> Result<(), ClientError> {
    let context = start_with(UserType::UserObject)?;
    let client = context.client().await?;

    // not checked locally: the request reaches the server which refuses it
    let requests_before = context.hsm.request_count();
    let result = client.gen_key("aes-256", "").await;
    assert!(matches!(result, Err(ClientError::RequestFailed(_))));
    assert_eq!(context.hsm.request_count(), requests_before + 1);

    context.stop_server().await
}

#[tokio::test]
async fn test_backup_restore() -> Result<(), ClientError> {
    let context = start_with(UserType::UserSlot)?;
    let client = context.client().await?;
    context.hsm.insert_key("aes-256");

    client.backup("aes.bak", "aes-256").await?;
    let backup = &context.hsm.requests_to(BACKUP_ENDPOINT)[0];
    assert_eq!(backup["data"], Value::from(b64.encode("aes.bak")));
    assert_eq!(backup["user_type"], Value::from(1));

    client.delete("aes-256").await?;
    assert!(!context.hsm.has_key("aes-256"));

    client.restore("aes.bak").await?;
    assert!(context.hsm.has_key("aes-256"));

    let result = client.restore("unknown.bak").await;
    assert!(matches!(result, Err(ClientError::RequestFailed(_))));

    context.stop_server().await
}

#[tokio::test]
async fn test_session_expired_and_reconnect() -> Result<(), ClientError> {
    let context = start_with(UserType::UserObject)?;
    let client = context.client().await?;
    client.ping().await?;

    context.hsm.expire_sessions();
    let result = client.ping().await;
    assert!(matches!(result, Err(ClientError::SessionExpired(_))));

    let reconnected = client.reconnect().await?;
    assert_ne!(
        reconnected.session().session_id(),
        client.session().session_id()
    );
    reconnected.ping().await?;

    context.stop_server().await
}

#[tokio::test]
async fn test_concurrent_calls() -> Result<(), ClientError> {
    let context = start_with(UserType::UserObject)?;
    let client = context.client().await?;
    let other = client.clone();

    let (a, b, c) = tokio::join!(
        client.encrypt(b"first", "k1"),
        other.encrypt(b"second", "k2"),
        client.random(8),
    );
    assert_eq!(client.decrypt(&a?, "k1").await?, "first");
    assert_eq!(other.decrypt(&b?, "k2").await?, "second");
    assert_eq!(b64.decode(c?)?.len(), 8);

    context.stop_server().await
}

#[tokio::test]
async fn test_unknown_tier_requires_key_label() -> Result<(), ClientError> {
    let context = start_with(UserType::Other(5))?;
    let client = context.client().await?;
    assert_eq!(client.user_type(), UserType::Other(5));

    let result = client.encrypt(b"data", "").await;
    assert!(matches!(
        result,
        Err(ClientError::MissingKeyLabel(UserType::Other(5)))
    ));
    assert!(context.hsm.requests_to(ENCRYPT_ENDPOINT).is_empty());
    client.encrypt(b"data", "aes-256").await?;

    context.stop_server().await
}

#[tokio::test]
async fn test_tls_certificate_verification() -> Result<(), ClientError> {
    let context = start_test_hsm_server_with_options(StubHsmConfig::default(), true)?;
    assert!(context.server_url.starts_with("https://"));
    let config = context.hsm.config();

    // the self-signed certificate is refused by default
    let result = HsmClient::new(&context.server_url, &config.api_key, &config.pin).await;
    assert!(result.is_err());
    assert_eq!(context.hsm.request_count(), 0);

    let client = HsmClient::instantiate(
        &context.server_url,
        &config.api_key,
        &config.pin,
        true,
        None,
        false,
    )
    .await?;
    client.ping().await?;

    context.stop_server().await
}

#[tokio::test]
async fn test_tls_pinned_certificate() -> Result<(), ClientError> {
    let context = start_test_hsm_server_with_options(StubHsmConfig::default(), true)?;
    let config = context.hsm.config();
    let conf = ClientConf {
        accept_invalid_certs: true,
        server_url: context.server_url.clone(),
        api_key: Zeroizing::new(config.api_key.clone()),
        pin: Zeroizing::new(config.pin.clone()),
        verified_cert: context.server_cert_pem.clone(),
    };

    let client = conf.initialize_hsm_client(None, None, false).await?;
    client.ping().await?;

    // a server presenting another certificate is refused
    let other_cert_pem = SelfSignedIdentity::generate("localhost")
        .and_then(|identity| identity.certificate_pem())
        .map_err(|e| client_error!(e))?;
    let conf = ClientConf {
        verified_cert: Some(other_cert_pem),
        ..conf
    };
    let requests_before = context.hsm.request_count();
    assert!(conf.initialize_hsm_client(None, None, false).await.is_err());
    assert_eq!(context.hsm.request_count(), requests_before);

    context.stop_server().await
}
