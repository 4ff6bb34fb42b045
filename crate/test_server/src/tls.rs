use openssl::{
    asn1::{Asn1Integer, Asn1Time},
    bn::BigNum,
    ec::{EcGroup, EcKey},
    error::ErrorStack,
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    ssl::{SslAcceptor, SslAcceptorBuilder, SslMethod},
    x509::{X509, X509Builder, X509NameBuilder, extension::SubjectAlternativeName},
};

/// A self-signed P-256 certificate for `localhost` / `127.0.0.1`, with its key
pub struct SelfSignedIdentity {
    private_key: PKey<Private>,
    certificate: X509,
}

impl SelfSignedIdentity {
    pub fn generate(common_name: &str) -> Result<Self, ErrorStack> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let private_key = PKey::from_ec_key(EcKey::generate(&group)?)?;

        let mut builder = X509Builder::new()?;
        builder.set_version(2)?;
        builder.set_pubkey(&private_key)?;

        let mut x509_name = X509NameBuilder::new()?;
        x509_name.append_entry_by_text("O", "Ksema stub HSM")?;
        x509_name.append_entry_by_text("CN", common_name)?;
        let x509_name = x509_name.build();
        builder.set_subject_name(&x509_name)?;
        // self-signed
        builder.set_issuer_name(&x509_name)?;

        builder.set_serial_number(Asn1Integer::from_bn(BigNum::from_u32(12345)?.as_ref())?.as_ref())?;
        builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
        builder.set_not_after(Asn1Time::days_from_now(1)?.as_ref())?;

        let subject_alternative_name = SubjectAlternativeName::new()
            .dns("localhost")
            .ip("127.0.0.1")
            .build(&builder.x509v3_context(None, None))?;
        builder.append_extension(subject_alternative_name)?;

        builder.sign(&private_key, MessageDigest::sha256())?;
        Ok(Self {
            private_key,
            certificate: builder.build(),
        })
    }

    pub fn certificate_pem(&self) -> Result<String, ErrorStack> {
        Ok(String::from_utf8_lossy(&self.certificate.to_pem()?).into_owned())
    }

    pub(crate) fn acceptor(&self) -> Result<SslAcceptorBuilder, ErrorStack> {
        let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls())?;
        builder.set_private_key(&self.private_key)?;
        builder.set_certificate(&self.certificate)?;
        builder.check_private_key()?;
        Ok(builder)
    }
}
