//! TLS support using rustls
//!
//! Builds the server configuration for `stcp` endpoints and the client
//! configuration used when forwarding to `stcp` targets.
//!
//! # Client trust
//!
//! - No trusted set configured: a client certificate is requested but not
//!   required, and any certificate is accepted.
//! - Trusted set configured: the client must present a chain where at least
//!   one certificate has a trusted SHA-256 thumbprint, and the chain must
//!   validate against the configured trust anchors. The anchor a chain
//!   resolves to counts as part of the chain, so pinning a CA trusts every
//!   client it issued.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use atna_protocol::PeerCertificate;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{
    CryptoProvider, WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature,
};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{
    ClientConfig, DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig,
    SignatureScheme,
};
use sha2::{Digest, Sha256};

use crate::config::TlsSettings;
use crate::error::{Result, TransportError};

/// Uppercase hex SHA-256 of a DER certificate
pub fn thumbprint(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Normalize a configured thumbprint: uppercase, separators removed
pub fn normalize_thumbprint(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ':' | ' ' | '-'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Describe the certificate a TLS peer authenticated with
pub fn peer_certificate(conn: &rustls::ServerConnection) -> Option<PeerCertificate> {
    conn.peer_certificates()
        .and_then(|chain| chain.first())
        .map(|der| PeerCertificate {
            der: der.to_vec(),
            thumbprint: thumbprint(der),
        })
}

/// Load every certificate from a PEM file
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = read_pem(path)?;
    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            TransportError::tls(format!(
                "failed to parse certificates in '{}': {e}",
                path.display()
            ))
        })?;

    if certs.is_empty() {
        return Err(TransportError::tls(format!(
            "'{}' contains no certificates",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load the first private key from a PEM file
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem = read_pem(path)?;
    PrivateKeyDer::from_pem_slice(&pem).map_err(|e| {
        TransportError::tls(format!(
            "failed to parse private key in '{}': {e}",
            path.display()
        ))
    })
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| TransportError::tls(format!("failed to read '{}': {e}", path.display())))
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build the server configuration for a secure endpoint
///
/// Fails if the server certificate or key is missing or unreadable, or if a
/// trusted client set is configured without any trust anchor.
pub fn build_server_config(settings: &TlsSettings) -> Result<Arc<ServerConfig>> {
    let cert_path = settings
        .server_certificate
        .as_deref()
        .ok_or_else(|| TransportError::configuration("TLS requires a server certificate"))?;
    let key_path = settings
        .server_key
        .as_deref()
        .ok_or_else(|| TransportError::configuration("TLS requires a server private key"))?;

    let certs = load_certificates(cert_path)?;
    let key = load_private_key(key_path)?;
    let provider = provider();

    let verifier: Arc<dyn ClientCertVerifier> = if settings.restricts_clients() {
        Arc::new(PinnedClientVerifier::from_settings(settings, &provider)?)
    } else {
        Arc::new(AcceptAnyClientCert::new(&provider))
    };

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::tls(format!("protocol versions: {e}")))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| TransportError::tls(format!("server config error: {e}")))?;

    Ok(Arc::new(config))
}

/// Build the client configuration used for `stcp` forwarding
pub fn build_client_config(
    ca_certificates: &[PathBuf],
    client_certificate: Option<&Path>,
    client_key: Option<&Path>,
) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    for path in ca_certificates {
        add_anchors(&mut roots, load_certificates(path)?)?;
    }
    if roots.is_empty() {
        return Err(TransportError::configuration(
            "stcp forwarding requires at least one CA certificate",
        ));
    }

    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::tls(format!("protocol versions: {e}")))?
        .with_root_certificates(roots);

    let config = match (client_certificate, client_key) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_certificates(cert)?, load_private_key(key)?)
            .map_err(|e| TransportError::tls(format!("client config error: {e}")))?,
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(TransportError::configuration(
                "client_certificate and client_key must be set together",
            ));
        }
    };

    Ok(Arc::new(config))
}

fn webpki_verifier(
    anchors: Vec<CertificateDer<'static>>,
    provider: &Arc<CryptoProvider>,
) -> Result<Arc<dyn ClientCertVerifier>> {
    let mut roots = RootCertStore::empty();
    add_anchors(&mut roots, anchors)?;
    WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(provider))
        .build()
        .map_err(|e| TransportError::tls(format!("client verifier error: {e}")))
}

fn add_anchors(roots: &mut RootCertStore, certs: Vec<CertificateDer<'static>>) -> Result<()> {
    for cert in certs {
        roots
            .add(cert)
            .map_err(|e| TransportError::tls(format!("failed to add trust anchor: {e}")))?;
    }
    Ok(())
}

// =============================================================================
// Client Certificate Verifiers
// =============================================================================

/// Requires a trusted thumbprint in the chain and a valid chain
#[derive(Debug)]
pub struct PinnedClientVerifier {
    /// Validates against every configured anchor
    inner: Arc<dyn ClientCertVerifier>,
    /// Validates against pinned anchors only
    pinned_anchors: Option<Arc<dyn ClientCertVerifier>>,
    thumbprints: HashSet<String>,
}

impl PinnedClientVerifier {
    /// Build from endpoint settings
    ///
    /// Trusted certificate files contribute both their thumbprint and a trust
    /// anchor. CA files contribute trust anchors only.
    pub fn from_settings(settings: &TlsSettings, provider: &Arc<CryptoProvider>) -> Result<Self> {
        let mut anchors = Vec::new();
        let mut thumbprints: HashSet<String> = settings
            .trusted_client_thumbprints
            .iter()
            .map(|t| normalize_thumbprint(t))
            .collect();

        for path in &settings.client_ca_certificates {
            anchors.extend(load_certificates(path)?);
        }
        for path in &settings.trusted_client_certificates {
            let certs = load_certificates(path)?;
            thumbprints.extend(certs.iter().map(|c| thumbprint(c)));
            anchors.extend(certs);
        }

        if anchors.is_empty() {
            return Err(TransportError::configuration(
                "trusted client thumbprints require client_ca_certificates or trusted_client_certificates",
            ));
        }

        let pinned: Vec<_> = anchors
            .iter()
            .filter(|c| thumbprints.contains(&thumbprint(c)))
            .cloned()
            .collect();
        let pinned_anchors = if pinned.is_empty() {
            None
        } else {
            Some(webpki_verifier(pinned, provider)?)
        };
        let inner = webpki_verifier(anchors, provider)?;

        Ok(Self {
            inner,
            pinned_anchors,
            thumbprints,
        })
    }

    /// Number of trusted thumbprints
    pub fn trusted_count(&self) -> usize {
        self.thumbprints.len()
    }

    fn is_pinned(&self, cert: &CertificateDer<'_>) -> bool {
        self.thumbprints.contains(&thumbprint(cert))
    }
}

impl ClientCertVerifier for PinnedClientVerifier {
    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.inner.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        if self.is_pinned(end_entity) || intermediates.iter().any(|c| self.is_pinned(c)) {
            return self.inner.verify_client_cert(end_entity, intermediates, now);
        }

        // A chain that validates against the pinned anchors alone ends at one of them
        let untrusted = || {
            rustls::Error::General(format!(
                "client certificate {} is not trusted",
                thumbprint(end_entity)
            ))
        };
        match &self.pinned_anchors {
            Some(anchors) => anchors
                .verify_client_cert(end_entity, intermediates, now)
                .map_err(|_| untrusted()),
            None => Err(untrusted()),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Requests a client certificate but accepts any (or none)
///
/// Handshake signatures are still checked so the peer proves possession of
/// the key for whatever certificate it presents.
#[derive(Debug)]
pub struct AcceptAnyClientCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyClientCert {
    pub fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
#[path = "tls_test.rs"]
mod tls_test;
