use std::{sync::Arc, time::SystemTime};

use reqwest::{Client, ClientBuilder};
use rustls::{
    Certificate, Error as RustTLSError, OwnedTrustAnchor, RootCertStore, ServerName,
    client::{ServerCertVerified, ServerCertVerifier, WebPkiVerifier},
};

/// A TLS verifier that only accepts one pinned HSM server leaf certificate.
pub(crate) struct PinnedLeafVerifier {
    // The leaf certificate the HSM server must present
    pinned_cert: Certificate,
    // Chain verification run after the pin matched; `None` skips it
    chain_verifier: Option<WebPkiVerifier>,
}

impl PinnedLeafVerifier {
    pub(crate) fn new(pinned_cert: Certificate, verify_chain: bool) -> Self {
        let chain_verifier = verify_chain.then(|| {
            let mut root_cert_store = RootCertStore::empty();
            root_cert_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(
                |trust_anchor| {
                    OwnedTrustAnchor::from_subject_spki_name_constraints(
                        trust_anchor.subject,
                        trust_anchor.spki,
                        trust_anchor.name_constraints,
                    )
                },
            ));
            WebPkiVerifier::new(root_cert_store, None)
        });
        Self {
            pinned_cert,
            chain_verifier,
        }
    }
}

impl ServerCertVerifier for PinnedLeafVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        scts: &mut dyn Iterator<Item = &[u8]>,
        ocsp_response: &[u8],
        now: SystemTime,
    ) -> Result<ServerCertVerified, RustTLSError> {
        if !end_entity.eq(&self.pinned_cert) {
            return Err(RustTLSError::General(
                "HSM server leaf certificate doesn't match the pinned one".to_owned(),
            ))
        }

        match &self.chain_verifier {
            Some(verifier) => verifier.verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                scts,
                ocsp_response,
                now,
            ),
            None => Ok(ServerCertVerified::assertion()),
        }
    }
}

/// Build a client builder that only talks to the HSM presenting `leaf_cert`.
///
/// When `accept_invalid_certs` is set, the chain of the pinned certificate is
/// not checked against the web PKI roots (self-signed HSM certificates).
pub(crate) fn build_pinned_tls_client(
    leaf_cert: Certificate,
    accept_invalid_certs: bool,
) -> ClientBuilder {
    let verifier = PinnedLeafVerifier::new(leaf_cert, !accept_invalid_certs);

    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Client::builder().use_preconfigured_tls(config)
}
