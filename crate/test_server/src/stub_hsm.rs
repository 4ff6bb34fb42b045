use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use actix_web::{
    HttpResponse,
    web::{self, Data, Json},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as b64};
use ksema_client::{
    UserType,
    messages::{
        AUTH_ENDPOINT, BACKUP_ENDPOINT, DECRYPT_ENDPOINT, DELETE_ENDPOINT, ENCRYPT_ENDPOINT,
        GENKEY_ASYM_ENDPOINT, GENKEY_SYM_ENDPOINT, PING_ENDPOINT, RANDOM_ENDPOINT,
        RESTORE_ENDPOINT, SET_IV_ENDPOINT, SIGN_ENDPOINT, VERIFY_ENDPOINT,
    },
};
use serde_json::{Value, json};
use tracing::{debug, trace};

/// Length of the random data when the request carries none
pub const DEFAULT_RANDOM_LENGTH: usize = 32;

#[derive(Clone, Debug)]
pub struct StubHsmConfig {
    pub api_key: String,
    pub pin: String,
    /// The tier granted to authenticated sessions
    pub user_type: UserType,
}

impl Default for StubHsmConfig {
    fn default() -> Self {
        Self {
            api_key: "test-api-key".to_owned(),
            pin: "1234".to_owned(),
            user_type: UserType::UserObject,
        }
    }
}

/// An in-memory stand-in for the HSM service.
///
/// Its "cryptography" is only meant to be reversible and deterministic:
/// encryption XORs the data with a byte derived from the key label, a
/// signature is the key label followed by the reversed data.
#[derive(Debug)]
pub struct StubHsm {
    config: StubHsmConfig,
    session_counter: AtomicU64,
    current_session: Mutex<Option<String>>,
    /// endpoint and body of every request received, in order
    requests: Mutex<Vec<(String, Value)>>,
    keys: Mutex<HashSet<String>>,
    backups: Mutex<HashMap<String, String>>,
    iv: Mutex<Option<Vec<u8>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn str_field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name).and_then(Value::as_str)
}

fn bytes_field(body: &Value, name: &str) -> Option<Vec<u8>> {
    str_field(body, name).and_then(|encoded| b64.decode(encoded).ok())
}

fn key_byte(key_label: &str) -> u8 {
    key_label
        .bytes()
        .fold(0x5a_u8, |acc, b| acc.wrapping_add(b))
        | 0x01
}

/// The stub cipher, its own inverse
#[must_use]
pub fn stub_cipher(key_label: &str, data: &[u8]) -> Vec<u8> {
    let k = key_byte(key_label);
    data.iter().map(|b| b ^ k).collect()
}

#[must_use]
pub fn stub_signature(key_label: &str, data: &[u8]) -> Vec<u8> {
    key_label
        .bytes()
        .chain(data.iter().rev().copied())
        .collect()
}

type Operation = fn(&StubHsm, &Value) -> Option<Value>;

impl StubHsm {
    #[must_use]
    pub fn new(config: StubHsmConfig) -> Self {
        Self {
            config,
            session_counter: AtomicU64::new(0),
            current_session: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            keys: Mutex::new(HashSet::new()),
            backups: Mutex::new(HashMap::new()),
            iv: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &StubHsmConfig {
        &self.config
    }

    /// The bodies of the requests received on `endpoint`
    #[must_use]
    pub fn requests_to(&self, endpoint: &str) -> Vec<Value> {
        lock(&self.requests)
            .iter()
            .filter(|(received_on, _)| received_on == endpoint)
            .map(|(_, body)| body.clone())
            .collect()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Invalidate the current session: further requests get a 401
    pub fn expire_sessions(&self) {
        *lock(&self.current_session) = None;
    }

    #[must_use]
    pub fn has_key(&self, key_label: &str) -> bool {
        lock(&self.keys).contains(key_label)
    }

    pub fn insert_key(&self, key_label: &str) {
        lock(&self.keys).insert(key_label.to_owned());
    }

    #[must_use]
    pub fn iv(&self) -> Option<Vec<u8>> {
        lock(&self.iv).clone()
    }

    fn record(&self, endpoint: &str, body: &Value) {
        trace!("stub HSM <== {endpoint}: {body}");
        lock(&self.requests).push((endpoint.to_owned(), body.clone()));
    }

    fn authenticate(&self, body: &Value) -> HttpResponse {
        self.record(AUTH_ENDPOINT, body);
        let granted = str_field(body, "api_key") == Some(self.config.api_key.as_str())
            && str_field(body, "pin") == Some(self.config.pin.as_str());
        if !granted {
            debug!("stub HSM: authentication refused");
            return HttpResponse::Ok().json(json!({ "success": false }))
        }

        let session_id = format!(
            "session-{}",
            self.session_counter.fetch_add(1, Ordering::SeqCst) + 1
        );
        *lock(&self.current_session) = Some(session_id.clone());
        // a new session drops the IV override
        *lock(&self.iv) = None;
        HttpResponse::Ok().json(json!({
            "success": true,
            "data": {
                "session_id": session_id,
                "user_type": u32::from(self.config.user_type),
            }
        }))
    }

    fn respond(&self, endpoint: &str, body: &Value, operation: Operation) -> HttpResponse {
        self.record(endpoint, body);
        let current = lock(&self.current_session).clone();
        if current.is_none() || current.as_deref() != str_field(body, "session_id") {
            return HttpResponse::Unauthorized().finish()
        }
        match operation(self, body) {
            Some(data) => HttpResponse::Ok().json(json!({ "success": true, "data": data })),
            None => HttpResponse::Ok().json(json!({ "success": false })),
        }
    }

    fn crypt(&self, body: &Value) -> Option<Value> {
        let data = bytes_field(body, "data")?;
        let key_label = str_field(body, "key_label")?;
        Some(Value::from(b64.encode(stub_cipher(key_label, &data))))
    }

    fn sign(&self, body: &Value) -> Option<Value> {
        let data = bytes_field(body, "data")?;
        let key_label = str_field(body, "key_label")?;
        Some(Value::from(b64.encode(stub_signature(key_label, &data))))
    }

    fn verify(&self, body: &Value) -> Option<Value> {
        let data = bytes_field(body, "data")?;
        let signature = bytes_field(body, "signature")?;
        let key_label = str_field(body, "key_label")?;
        (signature == stub_signature(key_label, &data)).then_some(Value::Null)
    }

    fn random(&self, body: &Value) -> Option<Value> {
        let length = match body.get("data") {
            None => DEFAULT_RANDOM_LENGTH,
            Some(_) => {
                let encoded = bytes_field(body, "data")?;
                let length: [u8; 2] = encoded.try_into().ok()?;
                usize::from(u16::from_be_bytes(length))
            }
        };
        let random: Vec<u8> = (0..length).map(|i| (i % 251) as u8).collect();
        Some(Value::from(b64.encode(random)))
    }

    fn backup(&self, body: &Value) -> Option<Value> {
        let file_name = String::from_utf8(bytes_field(body, "data")?).ok()?;
        let key_label = str_field(body, "key_label")?;
        body.get("user_type")?.as_u64()?;
        lock(&self.backups).insert(file_name, key_label.to_owned());
        Some(Value::Null)
    }

    fn restore(&self, body: &Value) -> Option<Value> {
        let file_name = String::from_utf8(bytes_field(body, "data")?).ok()?;
        let key_label = lock(&self.backups).get(&file_name).cloned()?;
        self.insert_key(&key_label);
        Some(Value::Null)
    }

    fn delete(&self, body: &Value) -> Option<Value> {
        let key_label = str_field(body, "key_label")?;
        lock(&self.keys).remove(key_label).then_some(Value::Null)
    }

    fn gen_key_sym(&self, body: &Value) -> Option<Value> {
        if self.config.user_type == UserType::UserObject {
            return None
        }
        let key_label = str_field(body, "key_label").filter(|l| !l.is_empty())?;
        self.insert_key(key_label);
        Some(Value::Null)
    }

    fn gen_key_asym(&self, body: &Value) -> Option<Value> {
        if self.config.user_type == UserType::UserObject {
            return None
        }
        let public_key_label = str_field(body, "public_key_label").filter(|l| !l.is_empty())?;
        let private_key_label = str_field(body, "private_key_label").filter(|l| !l.is_empty())?;
        self.insert_key(public_key_label);
        self.insert_key(private_key_label);
        Some(Value::Null)
    }

    fn set_iv(&self, body: &Value) -> Option<Value> {
        let iv = bytes_field(body, "data").filter(|iv| iv.len() == 16)?;
        *lock(&self.iv) = Some(iv);
        Some(Value::Null)
    }
}

type StubData = Data<Arc<StubHsm>>;

async fn auth(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.authenticate(&body)
}

async fn ping(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(PING_ENDPOINT, &body, |_, _| Some(Value::from("pong")))
}

async fn encrypt(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(ENCRYPT_ENDPOINT, &body, StubHsm::crypt)
}

async fn decrypt(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(DECRYPT_ENDPOINT, &body, StubHsm::crypt)
}

async fn sign(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(SIGN_ENDPOINT, &body, StubHsm::sign)
}

async fn verify(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(VERIFY_ENDPOINT, &body, StubHsm::verify)
}

async fn random(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(RANDOM_ENDPOINT, &body, StubHsm::random)
}

async fn backup(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(BACKUP_ENDPOINT, &body, StubHsm::backup)
}

async fn restore(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(RESTORE_ENDPOINT, &body, StubHsm::restore)
}

async fn delete(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(DELETE_ENDPOINT, &body, StubHsm::delete)
}

async fn gen_key_sym(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(GENKEY_SYM_ENDPOINT, &body, StubHsm::gen_key_sym)
}

async fn gen_key_asym(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(GENKEY_ASYM_ENDPOINT, &body, StubHsm::gen_key_asym)
}

async fn set_iv(hsm: StubData, body: Json<Value>) -> HttpResponse {
    hsm.respond(SET_IV_ENDPOINT, &body, StubHsm::set_iv)
}

/// Register the HSM REST endpoints
pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route(AUTH_ENDPOINT, web::post().to(auth))
        .route(PING_ENDPOINT, web::post().to(ping))
        .route(ENCRYPT_ENDPOINT, web::post().to(encrypt))
        .route(DECRYPT_ENDPOINT, web::post().to(decrypt))
        .route(SIGN_ENDPOINT, web::post().to(sign))
        .route(VERIFY_ENDPOINT, web::post().to(verify))
        .route(RANDOM_ENDPOINT, web::post().to(random))
        .route(BACKUP_ENDPOINT, web::post().to(backup))
        .route(RESTORE_ENDPOINT, web::post().to(restore))
        .route(DELETE_ENDPOINT, web::post().to(delete))
        .route(GENKEY_SYM_ENDPOINT, web::post().to(gen_key_sym))
        .route(GENKEY_ASYM_ENDPOINT, web::post().to(gen_key_asym))
        .route(SET_IV_ENDPOINT, web::post().to(set_iv));
}
