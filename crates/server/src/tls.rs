//! Loads the TLS certificate chain and private key named by `--certfile`/
//! `--keyfile` (see §6, "TLS").

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use stellite_core::{Error, Result};

/// Parse a PEM certificate chain file into DER certificates.
pub fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| Error::Tls(Box::new(e)))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::Tls(Box::new(e)))
}

/// Parse a PEM private key file (PKCS#8, or the other forms
/// `rustls_pemfile::private_key` recognises) into a DER private key.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| Error::Tls(Box::new(e)))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Tls(Box::new(e)))?
        .ok_or_else(|| Error::Tls(Box::new(std::io::Error::other("no private key found in keyfile"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_certfile_is_a_tls_error() {
        let result = load_cert_chain(Path::new("/nonexistent/stellite-test-cert.pem"));
        assert!(matches!(result, Err(Error::Tls(_))));
    }
}
