// Copyright (C) 2024 the freshet authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TLS setup for `rtsps` sources.
//!
//! Two modes: standard chain verification against the platform roots, or
//! trust-on-first-use pinning where a SHA-256 of the peer certificate
//! replaces the chain check entirely. Pinning is how fixed installations
//! talk to cameras with self-signed certificates.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use sha2::{Digest, Sha256};

use crate::error::ErrorInt;
use crate::Error;

/// Builds the client TLS configuration for one connection attempt.
pub(crate) fn client_config(fingerprint: Option<&str>) -> Result<rustls::ClientConfig, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let roots = match fingerprint {
        // The pinned fingerprint replaces chain verification, so don't
        // bother collecting roots.
        Some(_) => rustls::RootCertStore::empty(),
        None => {
            let mut roots = rustls::RootCertStore::empty();
            let native = rustls_native_certs::load_native_certs();
            for err in native.errors {
                log::warn!("failed to load a native root cert: {err}");
            }
            for cert in native.certs {
                if let Err(err) = roots.add(cert) {
                    log::warn!("failed to add a native root cert: {err}");
                }
            }
            roots
        }
    };

    let mut config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| {
            wrap!(ErrorInt::Transport {
                description: format!("TLS setup: {e}"),
            })
        })?
        .with_root_certificates(roots)
        .with_no_client_auth();

    if let Some(fingerprint) = fingerprint {
        let verifier = FingerprintVerifier::new(fingerprint, provider)?;
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(verifier));
    }
    Ok(config)
}

/// Compares a SHA-256 of the peer certificate's DER encoding against the
/// configured value instead of verifying the chain. Handshake signature
/// checks still go through the provider as usual.
#[derive(Debug)]
struct FingerprintVerifier {
    /// Lowercase hex.
    expected: String,
    provider: Arc<CryptoProvider>,
}

impl FingerprintVerifier {
    fn new(fingerprint: &str, provider: Arc<CryptoProvider>) -> Result<Self, Error> {
        if fingerprint.len() != 64 || !fingerprint.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!(ErrorInt::InvalidConfig(format!(
                "fingerprint {fingerprint:?} is not a hex-encoded SHA-256"
            )));
        }
        Ok(FingerprintVerifier {
            expected: fingerprint.to_ascii_lowercase(),
            provider,
        })
    }
}

impl ServerCertVerifier for FingerprintVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let observed = hex::encode(Sha256::digest(end_entity.as_ref()));
        if observed != self.expected {
            return Err(rustls::Error::General(format!(
                "server fingerprint does not match: expected {}, got {}",
                self.expected, observed
            )));
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
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
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
