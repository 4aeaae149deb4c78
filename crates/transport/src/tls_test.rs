//! Tests for TLS configuration and client trust decisions

use std::io;
use std::sync::Arc;

use atna_protocol::PeerCertificate;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ServerConfig};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::TlsSettings;
use crate::error::TransportError;
use crate::test_certs::TestCa;
use crate::tls::{
    build_client_config, build_server_config, normalize_thumbprint, peer_certificate, thumbprint,
};

/// Run a handshake over an in-memory pipe and report the server side result
async fn handshake(
    server: Arc<ServerConfig>,
    client: Arc<ClientConfig>,
) -> io::Result<Option<PeerCertificate>> {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let acceptor = TlsAcceptor::from(server);
    let connector = TlsConnector::from(client);
    let name = ServerName::try_from("localhost").unwrap();

    let server_side = async move {
        let mut stream = acceptor.accept(server_io).await?;
        let peer = peer_certificate(stream.get_ref().1);
        // Prove application data flows after the handshake
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await?;
        assert_eq!(&buf, b"ping");
        Ok::<_, io::Error>(peer)
    };
    let client_side = async move {
        if let Ok(mut stream) = connector.connect(name, client_io).await {
            let _ = stream.write_all(b"ping").await;
            let _ = stream.flush().await;
            // Hold the stream open until the server is done reading
            let mut sink = [0u8; 1];
            let _ = stream.read(&mut sink).await;
        }
    };

    let (result, ()) = tokio::join!(server_side, client_side);
    result
}

struct Pki {
    dir: TempDir,
    ca: TestCa,
    settings: TlsSettings,
}

impl Pki {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let ca = TestCa::new("test-ca");
        let (cert, key) = ca.server().write(dir.path(), "server");
        Self {
            dir,
            ca,
            settings: TlsSettings::new(cert, key),
        }
    }

    fn ca_path(&self) -> std::path::PathBuf {
        self.ca.write(self.dir.path(), "ca")
    }

    fn client_config(&self, name: Option<&str>) -> Arc<ClientConfig> {
        let ca = self.ca_path();
        match name {
            Some(name) => {
                let (cert, key) = self.ca.client(name).write(self.dir.path(), name);
                build_client_config(&[ca], Some(&cert), Some(&key)).unwrap()
            }
            None => build_client_config(&[ca], None, None).unwrap(),
        }
    }
}

// =============================================================================
// Thumbprints
// =============================================================================

#[test]
fn test_thumbprint_format() {
    let t = thumbprint(b"hello");
    assert_eq!(t.len(), 64);
    assert!(t.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    assert_eq!(
        t,
        "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824"
    );
}

#[test]
fn test_normalize_thumbprint() {
    assert_eq!(normalize_thumbprint("ab:cd ef-01"), "ABCDEF01");
}

// =============================================================================
// Configuration errors
// =============================================================================

#[test]
fn test_missing_server_certificate_is_rejected() {
    let settings = TlsSettings::default();
    let err = build_server_config(&settings).unwrap_err();
    assert!(matches!(err, TransportError::Configuration(_)));
}

#[test]
fn test_unreadable_certificate_is_rejected() {
    let settings = TlsSettings::new("/nonexistent/server.pem", "/nonexistent/server.key");
    let err = build_server_config(&settings).unwrap_err();
    assert!(matches!(err, TransportError::Tls(_)));
}

#[test]
fn test_thumbprints_without_anchor_are_rejected() {
    let pki = Pki::new();
    let settings = TlsSettings {
        trusted_client_thumbprints: vec!["AB".into()],
        ..pki.settings.clone()
    };
    let err = build_server_config(&settings).unwrap_err();
    assert!(matches!(err, TransportError::Configuration(_)));
}

#[test]
fn test_client_config_requires_ca() {
    assert!(build_client_config(&[], None, None).is_err());
}

// =============================================================================
// Trust decisions
// =============================================================================

#[tokio::test]
async fn test_open_server_accepts_anonymous_client() {
    let pki = Pki::new();
    let server = build_server_config(&pki.settings).unwrap();

    let peer = handshake(server, pki.client_config(None)).await.unwrap();
    assert!(peer.is_none());
}

#[tokio::test]
async fn test_open_server_reports_client_certificate() {
    let pki = Pki::new();
    let server = build_server_config(&pki.settings).unwrap();

    let peer = handshake(server, pki.client_config(Some("ehr01")))
        .await
        .unwrap()
        .expect("peer certificate");
    assert_eq!(peer.thumbprint, thumbprint(&peer.der));
}

#[tokio::test]
async fn test_pinned_thumbprint_with_valid_chain_is_accepted() {
    let pki = Pki::new();
    let client = pki.ca.client("ehr01");
    let (cert, key) = client.write(pki.dir.path(), "ehr01");

    let settings = TlsSettings {
        client_ca_certificates: vec![pki.ca_path()],
        // Lowercase with separators still matches
        trusted_client_thumbprints: vec![thumbprint(&client.der).to_lowercase()],
        ..pki.settings.clone()
    };
    let server = build_server_config(&settings).unwrap();
    let client_config = build_client_config(&[pki.ca_path()], Some(&cert), Some(&key)).unwrap();

    let peer = handshake(server, client_config).await.unwrap().unwrap();
    assert_eq!(peer.thumbprint, thumbprint(&client.der));
}

#[tokio::test]
async fn test_pinned_ca_thumbprint_accepts_issued_client() {
    let pki = Pki::new();
    let client = pki.ca.client("ehr03");
    let (cert, key) = client.write(pki.dir.path(), "ehr03");

    // Clients send only their leaf, the pinned CA is the anchor the chain ends at
    let settings = TlsSettings {
        client_ca_certificates: vec![pki.ca_path()],
        trusted_client_thumbprints: vec![thumbprint(&pki.ca.der())],
        ..pki.settings.clone()
    };
    let server = build_server_config(&settings).unwrap();
    let client_config = build_client_config(&[pki.ca_path()], Some(&cert), Some(&key)).unwrap();

    let peer = handshake(server, client_config).await.unwrap().unwrap();
    assert_eq!(peer.thumbprint, thumbprint(&client.der));
}

#[tokio::test]
async fn test_pinned_ca_thumbprint_rejects_other_ca_clients() {
    let pki = Pki::new();
    let other_ca = TestCa::new("other-ca");
    let other_ca_path = other_ca.write(pki.dir.path(), "other-ca");
    let (cert, key) = other_ca.client("ehr04").write(pki.dir.path(), "ehr04");

    // Both CAs are anchors, only the server CA is pinned
    let settings = TlsSettings {
        client_ca_certificates: vec![pki.ca_path(), other_ca_path.clone()],
        trusted_client_thumbprints: vec![thumbprint(&pki.ca.der())],
        ..pki.settings.clone()
    };
    let server = build_server_config(&settings).unwrap();
    let client_config =
        build_client_config(&[pki.ca_path(), other_ca_path], Some(&cert), Some(&key)).unwrap();

    let result = handshake(server, client_config).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_trusted_certificate_file_is_accepted() {
    let pki = Pki::new();
    let client = pki.ca.client("ehr02");
    let (cert, key) = client.write(pki.dir.path(), "ehr02");

    let settings = TlsSettings {
        client_ca_certificates: vec![pki.ca_path()],
        trusted_client_certificates: vec![cert.clone()],
        ..pki.settings.clone()
    };
    let server = build_server_config(&settings).unwrap();
    let client_config = build_client_config(&[pki.ca_path()], Some(&cert), Some(&key)).unwrap();

    assert!(handshake(server, client_config).await.unwrap().is_some());
}

#[tokio::test]
async fn test_untrusted_thumbprint_is_rejected() {
    let pki = Pki::new();
    let trusted = pki.ca.client("trusted");

    let settings = TlsSettings {
        client_ca_certificates: vec![pki.ca_path()],
        trusted_client_thumbprints: vec![thumbprint(&trusted.der)],
        ..pki.settings.clone()
    };
    let server = build_server_config(&settings).unwrap();

    // Valid chain, but not pinned
    let result = handshake(server, pki.client_config(Some("intruder"))).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_pinned_thumbprint_with_invalid_chain_is_rejected() {
    let pki = Pki::new();
    let rogue_ca = TestCa::new("rogue-ca");
    let rogue = rogue_ca.client("rogue");
    let (cert, key) = rogue.write(pki.dir.path(), "rogue");
    let rogue_ca_path = rogue_ca.write(pki.dir.path(), "rogue-ca");

    let settings = TlsSettings {
        client_ca_certificates: vec![pki.ca_path()],
        trusted_client_thumbprints: vec![thumbprint(&rogue.der)],
        ..pki.settings.clone()
    };
    let server = build_server_config(&settings).unwrap();
    // The client trusts the server CA, its own cert chains to the rogue CA
    let client_config =
        build_client_config(&[pki.ca_path(), rogue_ca_path], Some(&cert), Some(&key)).unwrap();

    let result = handshake(server, client_config).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_pinned_server_requires_client_certificate() {
    let pki = Pki::new();
    let trusted = pki.ca.client("trusted");

    let settings = TlsSettings {
        client_ca_certificates: vec![pki.ca_path()],
        trusted_client_thumbprints: vec![thumbprint(&trusted.der)],
        ..pki.settings.clone()
    };
    let server = build_server_config(&settings).unwrap();

    let result = handshake(server, pki.client_config(None)).await;
    assert!(result.is_err());
}
