// TLS certificate policy for local sync daemons
//
// Daemons serve their GUI/REST API with a self-signed certificate issued
// for a name that rarely matches the address used to reach them. The
// `LocalDaemon` policy validates normally and tolerates exactly those two
// failures; everything else still fails the handshake.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, Error, RootCertStore, SignatureScheme,
};
use std::sync::Arc;
use tracing::{debug, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::errors::ConnectorError;

/// How server certificates are checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Normal validation, tolerating hostname mismatch and self-signed certificates
    #[default]
    LocalDaemon,
    /// Accept any certificate (handshake signatures are still verified)
    AcceptAny,
}

/// A reason a certificate failed validation
#[derive(Debug, Clone, PartialEq)]
pub enum CertificateIssue {
    HostnameMismatch,
    SelfSigned,
    Other(CertificateError),
}

impl CertificateIssue {
    /// Classify a validation error reported by webpki
    ///
    /// `UnknownIssuer` is not classified as self-signed here: that needs the
    /// certificate itself, see `LocalDaemonVerifier`.
    pub fn classify(err: &CertificateError) -> Self {
        match err {
            CertificateError::NotValidForName
            | CertificateError::NotValidForNameContext { .. } => CertificateIssue::HostnameMismatch,
            other => CertificateIssue::Other(other.clone()),
        }
    }
}

/// Whether a set of certificate issues may be ignored for a local daemon
///
/// Only hostname mismatch and self-signed certificates are tolerated. An
/// empty set means validation passed.
pub fn is_tolerated(issues: &[CertificateIssue]) -> bool {
    issues.iter().all(|issue| {
        matches!(issue, CertificateIssue::HostnameMismatch | CertificateIssue::SelfSigned)
    })
}

/// Certificate verifier implementing the `LocalDaemon` policy
#[derive(Debug)]
pub struct LocalDaemonVerifier {
    inner: Arc<WebPkiServerVerifier>,
    provider: Arc<CryptoProvider>,
}

impl LocalDaemonVerifier {
    pub fn new(provider: Arc<CryptoProvider>) -> Result<Self, ConnectorError> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| ConnectorError::Tls(e.to_string()))?;
        Ok(Self { inner, provider })
    }

    /// Collect the issues with `end_entity` after normal validation failed
    /// with `UnknownIssuer`
    ///
    /// The certificate is self-signed when, presented alone, it validates
    /// with itself as the only trust anchor. Any other failure of that
    /// check leaves the original unknown-issuer verdict in place.
    fn issues_for_unknown_issuer(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Vec<CertificateIssue> {
        let unknown = CertificateIssue::Other(CertificateError::UnknownIssuer);
        if !intermediates.is_empty() {
            return vec![unknown];
        }

        let mut own_root = RootCertStore::empty();
        if own_root.add(end_entity.clone()).is_err() {
            return vec![unknown];
        }
        let pinned = match WebPkiServerVerifier::builder_with_provider(
            Arc::new(own_root),
            self.provider.clone(),
        )
        .build()
        {
            Ok(verifier) => verifier,
            Err(_) => return vec![unknown],
        };

        match pinned.verify_server_cert(end_entity, &[], server_name, ocsp_response, now) {
            Ok(_) => vec![CertificateIssue::SelfSigned],
            Err(Error::InvalidCertificate(err))
                if CertificateIssue::classify(&err) == CertificateIssue::HostnameMismatch =>
            {
                vec![CertificateIssue::SelfSigned, CertificateIssue::HostnameMismatch]
            }
            Err(_) => vec![unknown],
        }
    }
}

/// Whether `end_entity` is a currently valid CA certificate that signed itself
///
/// webpki refuses CA certificates as end entities, yet `openssl req -x509`
/// produces exactly those by default. Issuer must equal subject and the
/// signature must verify under the certificate's own key.
fn is_self_signed_ca(end_entity: &CertificateDer<'_>, now: UnixTime) -> bool {
    let Ok((_, cert)) = X509Certificate::from_der(end_entity.as_ref()) else {
        return false;
    };
    let now = now.as_secs() as i64;
    let validity = cert.validity();

    cert.is_ca()
        && cert.subject().as_raw() == cert.issuer().as_raw()
        && validity.not_before.timestamp() <= now
        && now <= validity.not_after.timestamp()
        && cert.verify_signature(None).is_ok()
}

impl ServerCertVerifier for LocalDaemonVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        let err = match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Ok(verified) => return Ok(verified),
            Err(Error::InvalidCertificate(err)) => err,
            Err(other) => return Err(other),
        };

        let issues = match CertificateIssue::classify(&err) {
            CertificateIssue::HostnameMismatch => vec![CertificateIssue::HostnameMismatch],
            _ if intermediates.is_empty() && is_self_signed_ca(end_entity, now) => {
                vec![CertificateIssue::SelfSigned]
            }
            CertificateIssue::Other(CertificateError::UnknownIssuer) => self
                .issues_for_unknown_issuer(
                    end_entity,
                    intermediates,
                    server_name,
                    ocsp_response,
                    now,
                ),
            issue => vec![issue],
        };

        if is_tolerated(&issues) {
            debug!(server = ?server_name, ?issues, "Ignoring tolerated certificate issues");
            return Ok(ServerCertVerified::assertion());
        }

        warn!(server = ?server_name, error = ?err, "Rejecting daemon certificate");
        let rejected = issues
            .into_iter()
            .find_map(|issue| match issue {
                CertificateIssue::Other(e) => Some(e),
                _ => None,
            })
            .unwrap_or(err);
        Err(Error::InvalidCertificate(rejected))
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Accepts any server certificate
///
/// Used only for the one-shot version probe when explicitly configured.
#[derive(Debug)]
pub struct AcceptAnyVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
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
    ) -> Result<HandshakeSignatureValid, Error> {
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

/// Build a rustls client configuration for the given policy
pub fn build_tls_config(policy: TlsPolicy) -> Result<ClientConfig, ConnectorError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let verifier: Arc<dyn ServerCertVerifier> = match policy {
        TlsPolicy::LocalDaemon => Arc::new(LocalDaemonVerifier::new(provider.clone())?),
        TlsPolicy::AcceptAny => Arc::new(AcceptAnyVerifier {
            provider: provider.clone(),
        }),
    };

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    Ok(config)
}
