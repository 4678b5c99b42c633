//! rustls client configuration for the hyper transport.
//!
//! System roots are loaded once per process and cached; loading them can be
//! slow on some platforms.

use std::sync::{Arc, OnceLock};

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

use crate::config::TlsSetting;
use crate::error::TransportCode;

static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn load_native_roots() -> Vec<CertificateDer<'static>> {
    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }
    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }
    result.certs
}

fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE.get_or_init(load_native_roots).as_slice()
}

/// Globally installed provider if any, aws-lc-rs otherwise.
fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn root_store(setting: &TlsSetting) -> Result<RootCertStore, TransportCode> {
    let mut store = RootCertStore::empty();
    let (_, ignored) = store.add_parsable_certificates(native_root_certs().iter().cloned());
    if ignored > 0 {
        tracing::warn!(ignored, "some native root certificates could not be parsed");
    }

    if let Some(path) = &setting.ca_file {
        let certs = CertificateDer::pem_file_iter(path)
            .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
            .map_err(|e| {
                tracing::warn!(path = %path.display(), error = %e, "failed to read CA file");
                TransportCode::SslCaCertBadFile
            })?;
        let (added, _) = store.add_parsable_certificates(certs);
        if added == 0 {
            tracing::warn!(path = %path.display(), "CA file contains no usable certificate");
            return Err(TransportCode::SslCaCertBadFile);
        }
    }

    if store.is_empty() {
        tracing::warn!("no trusted root certificates available");
        return Err(TransportCode::SslCaCertBadFile);
    }
    Ok(store)
}

/// Build the client config matching the verification flags.
///
/// `verify_peer = false` accepts any certificate. `verify_host = false` keeps
/// chain validation but tolerates a name mismatch.
pub(super) fn client_config(setting: &TlsSetting) -> Result<rustls::ClientConfig, TransportCode> {
    let provider = crypto_provider();
    let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| {
            tracing::warn!(error = %e, "failed to set TLS protocol versions");
            TransportCode::SslConnectError
        })?;

    let config = if setting.verify_peer {
        let webpki = WebPkiServerVerifier::builder_with_provider(
            Arc::new(root_store(setting)?),
            Arc::clone(&provider),
        )
        .build()
        .map_err(|e| {
            tracing::warn!(error = %e, "failed to build certificate verifier");
            TransportCode::SslCertProblem
        })?;
        if setting.verify_host {
            builder
                .with_webpki_verifier(webpki)
                .with_no_client_auth()
        } else {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(IgnoreHostname { inner: webpki }))
                .with_no_client_auth()
        }
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
            .with_no_client_auth()
    };
    Ok(config)
}

/// Chain validation without the host name check.
#[derive(Debug)]
struct IgnoreHostname {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for IgnoreHostname {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Accepts any certificate; handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Classify a TLS failure reported through an I/O error chain.
pub(super) fn classify_tls_error(err: &(dyn std::error::Error + 'static)) -> Option<TransportCode> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            return Some(match tls {
                rustls::Error::InvalidCertificate(_) => TransportCode::PeerFailedVerification,
                _ => TransportCode::SslConnectError,
            });
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && let Some(inner) = io.get_ref()
            && let Some(tls) = inner.downcast_ref::<rustls::Error>()
        {
            return Some(match tls {
                rustls::Error::InvalidCertificate(_) => TransportCode::PeerFailedVerification,
                _ => TransportCode::SslConnectError,
            });
        }
        current = e.source();
    }
    None
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_native_roots_are_cached() {
        let first = native_root_certs().as_ptr();
        let second = native_root_certs().as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn test_insecure_config_builds() {
        assert!(client_config(&TlsSetting::insecure()).is_ok());
    }

    #[test]
    fn test_missing_ca_file_is_local_problem() {
        let setting = TlsSetting::default().with_ca_file("/no/such/ca.pem");
        assert_eq!(
            client_config(&setting).unwrap_err(),
            TransportCode::SslCaCertBadFile
        );
    }

    #[test]
    fn test_ca_file_without_certificates_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "not a certificate\n").unwrap();
        let setting = TlsSetting::default().with_ca_file(&path);
        assert_eq!(
            client_config(&setting).unwrap_err(),
            TransportCode::SslCaCertBadFile
        );
    }

    #[test]
    fn test_classify_wrapped_certificate_error() {
        let io = std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer),
        );
        assert_eq!(
            classify_tls_error(&io),
            Some(TransportCode::PeerFailedVerification)
        );

        let io = std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            rustls::Error::HandshakeNotComplete,
        );
        assert_eq!(classify_tls_error(&io), Some(TransportCode::SslConnectError));

        let plain = std::io::Error::other("boom");
        assert_eq!(classify_tls_error(&plain), None);
    }
}
