use std::path::Path;

use anyhow::Context;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

const KEY_BITS: usize = 4096;

/// Generates a fresh PKCS#1 PEM key pair: the private key at `key_path`,
/// the public key next to it with the `.pem` suffix swapped for `.pub`.
pub fn generate_crypto_keys(key_path: &Path) -> anyhow::Result<()> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS).context("key generation")?;
    let public = RsaPublicKey::from(&private);

    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .context("private key encoding")?;
    let public_pem = public
        .to_pkcs1_pem(LineEnding::LF)
        .context("public key encoding")?;

    std::fs::write(key_path, private_pem.as_bytes())?;
    let public_path = public_key_path(key_path);
    std::fs::write(&public_path, public_pem.as_bytes())?;
    tracing::info!(
        private = %key_path.display(),
        public = %public_path.display(),
        "crypto key pair written"
    );
    Ok(())
}

/// `<path minus ".pem">.pub`
fn public_key_path(key_path: &Path) -> std::path::PathBuf {
    let s = key_path.to_string_lossy().replace(".pem", "");
    std::path::PathBuf::from(format!("{s}.pub"))
}

/// Loads the PKCS#1 PEM private key used by the decryption middleware.
pub fn load_private_key(path: &Path) -> anyhow::Result<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("reading crypto key {}", path.display()))?;
    if !pem.contains("BEGIN RSA PRIVATE KEY") {
        anyhow::bail!("bad PEM signature in {}", path.display());
    }
    Ok(RsaPrivateKey::from_pkcs1_pem(&pem).context("parsing PKCS#1 private key")?)
}
