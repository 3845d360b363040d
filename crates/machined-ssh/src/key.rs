//! Host key loading.

use std::path::Path;

use russh_keys::key::KeyPair;

use crate::error::SshError;

/// Read and decode the server's private host key.
///
/// Accepts the formats `ssh-keygen` writes (OpenSSH, PKCS#1, PKCS#8).
/// A missing or unreadable file and an undecodable one are distinct errors;
/// either is fatal at startup.
pub async fn load_host_key(path: &Path) -> Result<KeyPair, SshError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| SshError::NoPrivateKey {
            path: path.to_path_buf(),
            source,
        })?;
    russh_keys::decode_secret_key(&String::from_utf8_lossy(&raw), None).map_err(|source| {
        SshError::ParsePrivateKey {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_no_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_host_key(&dir.path().join("id_rsa")).await.unwrap_err();
        assert!(matches!(err, SshError::NoPrivateKey { .. }));
        assert!(err.to_string().contains("ssh-keygen -t rsa -f"));
    }

    #[tokio::test]
    async fn test_garbage_key_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_rsa");
        std::fs::write(&path, "not a key").unwrap();
        let err = load_host_key(&path).await.unwrap_err();
        assert!(matches!(err, SshError::ParsePrivateKey { .. }));
    }

    #[tokio::test]
    async fn test_openssh_key_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/host_ed25519");
        assert!(load_host_key(&path).await.is_ok());
    }
}
