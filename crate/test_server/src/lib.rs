pub use stub_hsm::{
    DEFAULT_RANDOM_LENGTH, StubHsm, StubHsmConfig, stub_cipher, stub_signature,
};
pub use test_server::{TestsContext, start_test_hsm_server, start_test_hsm_server_with_options};
pub use tls::SelfSignedIdentity;

mod stub_hsm;
mod test_server;
mod tls;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests;
