//! Client TLS configuration built from the PEM outputs of the modules.

use mysql_async::{ClientIdentity, SslOpts};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslConnector, SslMethod};
use openssl::x509::X509;
use postgres_openssl::MakeTlsConnector;

use crate::errors::{HarnessError, Result};

// native-tls refuses PKCS#12 bundles without a password on some platforms.
const PKCS12_PASSWORD: &str = "cloudsql-stages";

/// Certificates for a mutual-TLS connection.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    /// CA certificate of the instance, PEM.
    pub server_ca_pem: String,
    /// Client certificate, PEM.
    pub client_cert_pem: String,
    /// Client private key, PEM.
    pub client_key_pem: String,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("server_ca_pem", &format_args!("{} bytes", self.server_ca_pem.len()))
            .field("client_cert_pem", &format_args!("{} bytes", self.client_cert_pem.len()))
            .field("client_key_pem", &"<redacted>")
            .finish()
    }
}

impl TlsMaterial {
    /// Creates TLS material from PEM strings.
    #[must_use]
    pub fn new(
        server_ca_pem: impl Into<String>,
        client_cert_pem: impl Into<String>,
        client_key_pem: impl Into<String>,
    ) -> Self {
        Self {
            server_ca_pem: server_ca_pem.into(),
            client_cert_pem: client_cert_pem.into(),
            client_key_pem: client_key_pem.into(),
        }
    }

    fn server_ca(&self) -> Result<X509> {
        X509::from_pem(self.server_ca_pem.as_bytes())
            .map_err(|e| HarnessError::Tls(format!("invalid server CA certificate: {e}")))
    }

    fn client_cert(&self) -> Result<X509> {
        X509::from_pem(self.client_cert_pem.as_bytes())
            .map_err(|e| HarnessError::Tls(format!("invalid client certificate: {e}")))
    }

    fn client_key(&self) -> Result<PKey<Private>> {
        PKey::private_key_from_pem(self.client_key_pem.as_bytes())
            .map_err(|e| HarnessError::Tls(format!("invalid client private key: {e}")))
    }

    /// Checks that all three PEM documents parse and the key matches the certificate.
    pub fn validate(&self) -> Result<()> {
        self.server_ca()?;
        let cert = self.client_cert()?;
        let key = self.client_key()?;
        let public = cert.public_key()?;
        if !public.public_eq(&key) {
            return Err(HarnessError::Tls(
                "client private key does not match the client certificate".to_string(),
            ));
        }
        Ok(())
    }

    /// `mysql_async` TLS options.
    ///
    /// Server certificate verification is disabled: Cloud SQL certificates
    /// carry no IP SANs, so a connection by public IP can never verify. The
    /// instance CA is still handed to the driver as the only root.
    pub fn mysql_ssl_opts(&self) -> Result<SslOpts> {
        self.validate()?;
        let cert = self.client_cert()?;
        let key = self.client_key()?;
        let bundle = Pkcs12::builder()
            .name("client")
            .pkey(&key)
            .cert(&cert)
            .build2(PKCS12_PASSWORD)?
            .to_der()?;

        let identity = ClientIdentity::new(bundle.into()).with_password(PKCS12_PASSWORD);

        Ok(SslOpts::default()
            .with_root_certs(vec![self.server_ca_pem.clone().into_bytes().into()])
            .with_client_identity(Some(identity))
            .with_danger_accept_invalid_certs(true))
    }

    /// `tokio-postgres` TLS connector.
    ///
    /// The chain must lead to the instance CA; the host name is not checked.
    pub fn pg_connector(&self) -> Result<MakeTlsConnector> {
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        builder.cert_store_mut().add_cert(self.server_ca()?)?;
        let cert = self.client_cert()?;
        builder.set_certificate(&cert)?;
        let key = self.client_key()?;
        builder.set_private_key(&key)?;
        builder.check_private_key()?;

        let mut connector = MakeTlsConnector::new(builder.build());
        connector.set_callback(|config, _domain| {
            config.set_verify_hostname(false);
            Ok(())
        });
        Ok(connector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::rsa::Rsa;
    use openssl::x509::X509NameBuilder;

    fn self_signed(cn: &str) -> (String, String) {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", cn).unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder
            .set_serial_number(&BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        let cert = String::from_utf8(builder.build().to_pem().unwrap()).unwrap();
        let key = String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap();
        (cert, key)
    }

    fn material() -> TlsMaterial {
        let (ca, _) = self_signed("Google Cloud SQL Server CA");
        let (cert, key) = self_signed("mysql-public-abc-client");
        TlsMaterial::new(ca, cert, key)
    }

    #[test]
    fn test_valid_material() {
        material().validate().unwrap();
    }

    #[test]
    fn test_mysql_opts_carry_identity_and_root() {
        let opts = material().mysql_ssl_opts().unwrap();
        assert!(opts.client_identity().is_some());
        assert_eq!(opts.root_certs().len(), 1);
        assert!(opts.accept_invalid_certs());
    }

    #[test]
    fn test_pg_connector_builds() {
        material().pg_connector().unwrap();
    }

    #[test]
    fn test_pg_connector_rejects_mismatched_key() {
        let mut tls = material();
        let (_, other_key) = self_signed("someone-else");
        tls.client_key_pem = other_key;
        assert!(tls.pg_connector().is_err());
    }

    #[test]
    fn test_mismatched_key_is_rejected() {
        let mut tls = material();
        let (_, other_key) = self_signed("someone-else");
        tls.client_key_pem = other_key;

        let err = tls.validate().unwrap_err();
        assert!(matches!(err, HarnessError::Tls(ref m) if m.contains("does not match")));
    }

    #[test]
    fn test_garbage_pem_is_tls_error() {
        let mut tls = material();
        tls.server_ca_pem = "not a certificate".to_string();
        assert!(matches!(tls.validate(), Err(HarnessError::Tls(_))));
    }

    #[test]
    fn test_debug_hides_key() {
        let rendered = format!("{:?}", material());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
