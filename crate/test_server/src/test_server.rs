use std::{
    net::SocketAddr,
    sync::{Arc, mpsc},
    thread::{self, JoinHandle},
    time::Duration,
};

use actix_server::ServerHandle;
use actix_web::{App, HttpServer, web::Data};
use ksema_client::{ClientError, HsmClient, client_error};
use tracing::{info, trace};

use crate::{
    stub_hsm::{StubHsm, StubHsmConfig, routes},
    tls::SelfSignedIdentity,
};

pub struct TestsContext {
    /// `http(s)://127.0.0.1:<port>` of the stub HSM
    pub server_url: String,
    pub hsm: Arc<StubHsm>,
    /// PEM certificate presented by the stub when it serves HTTPS
    pub server_cert_pem: Option<String>,
    pub server_handle: ServerHandle,
    pub thread_handle: JoinHandle<Result<(), ClientError>>,
}

impl TestsContext {
    /// A client authenticated with the credentials the stub accepts
    pub async fn client(&self) -> Result<HsmClient, ClientError> {
        let config = self.hsm.config();
        HsmClient::new(&self.server_url, &config.api_key, &config.pin).await
    }

    pub async fn stop_server(self) -> Result<(), ClientError> {
        self.server_handle.stop(false).await;
        self.thread_handle
            .join()
            .map_err(|_e| client_error!("failed joining the stub HSM server thread"))?
    }
}

/// Start a plain HTTP stub HSM server on a free loopback port, in its own thread
pub fn start_test_hsm_server(config: StubHsmConfig) -> Result<TestsContext, ClientError> {
    start_test_hsm_server_with_options(config, false)
}

/// Start a stub HSM server on a free loopback port, in its own thread.
///
/// With `use_https`, the server presents a freshly generated self-signed
/// certificate, exposed in [`TestsContext::server_cert_pem`].
pub fn start_test_hsm_server_with_options(
    config: StubHsmConfig,
    use_https: bool,
) -> Result<TestsContext, ClientError> {
    ksema_logger::log_init(None);
    let hsm = Arc::new(StubHsm::new(config));

    let identity = if use_https {
        Some(
            SelfSignedIdentity::generate("localhost")
                .map_err(|e| client_error!("Can't generate the stub HSM certificate: {e}"))?,
        )
    } else {
        None
    };
    let server_cert_pem = identity
        .as_ref()
        .map(SelfSignedIdentity::certificate_pem)
        .transpose()
        .map_err(|e| client_error!("Can't export the stub HSM certificate: {e}"))?;

    let (tx, rx) = mpsc::channel::<(ServerHandle, SocketAddr)>();
    let server_hsm = hsm.clone();
    let thread_handle = thread::spawn(move || {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run_stub_server(server_hsm, identity, tx))
    });

    trace!("Waiting for the stub HSM server to start...");
    let (server_handle, address) = rx
        .recv_timeout(Duration::from_secs(25))
        .map_err(|e| client_error!("Can't get the stub HSM server handle: {e}"))?;
    let scheme = if use_https { "https" } else { "http" };
    let server_url = format!("{scheme}://{address}");
    info!("Stub HSM server listening at {server_url}");

    Ok(TestsContext {
        server_url,
        hsm,
        server_cert_pem,
        server_handle,
        thread_handle,
    })
}

async fn run_stub_server(
    hsm: Arc<StubHsm>,
    identity: Option<SelfSignedIdentity>,
    tx: mpsc::Sender<(ServerHandle, SocketAddr)>,
) -> Result<(), ClientError> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(hsm.clone()))
            .configure(routes)
    })
    .workers(1);
    let server = match identity {
        Some(identity) => {
            let acceptor = identity
                .acceptor()
                .map_err(|e| client_error!("Can't build the stub HSM TLS acceptor: {e}"))?;
            server.bind_openssl(("127.0.0.1", 0), acceptor)?
        }
        None => server.bind(("127.0.0.1", 0))?,
    };

    let address = server
        .addrs()
        .first()
        .copied()
        .ok_or_else(|| client_error!("the stub HSM server is not bound to any address"))?;

    let server = server.run();
    tx.send((server.handle(), address))
        .map_err(|e| client_error!(e))?;
    server.await?;
    Ok(())
}
