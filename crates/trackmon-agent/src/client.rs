use std::path::Path;
use std::str::FromStr;

use reqwest::header::CONTENT_TYPE;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha512;
use tonic::transport::{Channel, Endpoint};
use trackmon_common::proto::monitoring_client::MonitoringClient;
use trackmon_common::proto::UpdateRequest;
use trackmon_common::{convert, Metric};

const SHA512_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("metric count is 0")]
    MetricsCountIsNull,
    #[error("no such metric type")]
    WrongMetricType,
    #[error("unsupported transport {0}")]
    UnsupportedTransport(String),
    #[error("bad PEM signature")]
    PemDecode,
    #[error("bad public key: {0}")]
    BadPublicKey(#[from] rsa::pkcs1::Error),
    #[error("crypto key file: {0}")]
    KeyFile(#[from] std::io::Error),
    #[error("encryption failed: {0}")]
    Encrypt(#[from] rsa::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Dial(#[from] tonic::transport::Error),
    #[error(transparent)]
    Grpc(#[from] tonic::Status),
    #[error("save failed: {0}")]
    SaveFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Grpc,
}

impl FromStr for Transport {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Transport::Http),
            "grpc" => Ok(Transport::Grpc),
            other => Err(ClientError::UnsupportedTransport(other.to_string())),
        }
    }
}

/// Unified outbound transport for the agent.
///
/// HTTP requests are stamped with the agent's own address in `X-Real-IP`
/// and, when a public key is configured, POST bodies are wrapped in the
/// chunked RSA-OAEP-SHA512 envelope. The gRPC variant wraps the generated
/// `Monitoring` client over a lazily dialed channel.
#[derive(Clone)]
pub struct Client {
    transport: Transport,
    self_address: String,
    http: Option<reqwest::Client>,
    grpc: Option<MonitoringClient<Channel>>,
    key: Option<RsaPublicKey>,
}

impl Client {
    pub fn new(
        transport: &str,
        server_address: &str,
        self_address: &str,
        crypto_key: Option<&Path>,
    ) -> Result<Self, ClientError> {
        let transport = transport.parse::<Transport>()?;
        let mut client = Client {
            transport,
            self_address: self_address.to_string(),
            http: None,
            grpc: None,
            key: None,
        };
        match transport {
            Transport::Http => {
                client.http = Some(
                    reqwest::Client::builder()
                        .pool_max_idle_per_host(10)
                        .build()?,
                );
            }
            Transport::Grpc => {
                let endpoint = if server_address.contains("://") {
                    server_address.to_string()
                } else {
                    format!("http://{server_address}")
                };
                let channel = Endpoint::from_shared(endpoint)?.connect_lazy();
                client.grpc = Some(MonitoringClient::new(channel));
            }
        }
        if let Some(path) = crypto_key {
            let pem = std::fs::read_to_string(path)?;
            if !pem.contains("BEGIN RSA PUBLIC KEY") {
                return Err(ClientError::PemDecode);
            }
            client.key = Some(RsaPublicKey::from_pkcs1_pem(&pem)?);
        }
        Ok(client)
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// POSTs `body` to `url`, encrypting it first when a public key is
    /// configured. Non-2xx responses become [`ClientError::SaveFailed`]
    /// carrying the response body.
    pub async fn post(
        &self,
        url: String,
        body: Vec<u8>,
        content_type: &'static str,
    ) -> Result<(), ClientError> {
        let http = self
            .http
            .as_ref()
            .ok_or_else(|| ClientError::UnsupportedTransport("grpc".to_string()))?;
        let body = match &self.key {
            Some(key) => encrypt_body(key, &body)?,
            None => body,
        };
        let resp = http
            .post(&url)
            .header("X-Real-IP", &self.self_address)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::SaveFailed(body));
        }
        Ok(())
    }

    /// Converts the slice to wire form and issues one unary `Update` call.
    pub async fn send_metrics(&self, metrics: &[Metric]) -> Result<(), ClientError> {
        if metrics.is_empty() {
            return Err(ClientError::MetricsCountIsNull);
        }
        let grpc = self
            .grpc
            .as_ref()
            .ok_or_else(|| ClientError::UnsupportedTransport("http".to_string()))?;
        let mut converted = Vec::with_capacity(metrics.len());
        for m in metrics {
            converted.push(convert::to_proto(m).map_err(|_| ClientError::WrongMetricType)?);
        }
        let mut client = grpc.clone();
        client
            .update(UpdateRequest {
                metrics: converted,
            })
            .await?;
        Ok(())
    }
}

/// Splits `plain` into chunks of `key.size() − 2·hash_len − 2` bytes and
/// concatenates the RSA-OAEP-SHA512 ciphertext blocks, each exactly
/// `key.size()` bytes long.
pub fn encrypt_body(key: &RsaPublicKey, plain: &[u8]) -> Result<Vec<u8>, ClientError> {
    let chunk_size = key.size() - 2 * SHA512_LEN - 2;
    let mut rng = rand::thread_rng();
    let mut out = Vec::new();
    for chunk in plain.chunks(chunk_size) {
        let ciphertext = key.encrypt(&mut rng, Oaep::new::<Sha512>(), chunk)?;
        out.extend_from_slice(&ciphertext);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;

    #[test]
    fn unknown_transport_is_rejected() {
        let err = Client::new("carrier-pigeon", "127.0.0.1:8080", "127.0.0.1", None)
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::UnsupportedTransport(t) if t == "carrier-pigeon"));
    }

    #[test]
    fn missing_key_file_is_rejected() {
        let err = Client::new(
            "http",
            "127.0.0.1:8080",
            "127.0.0.1",
            Some(Path::new("/definitely/not/here.pub")),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ClientError::KeyFile(_)));
    }

    #[test]
    fn garbage_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pub");
        std::fs::write(&path, "not a pem at all").unwrap();
        let err = Client::new("http", "127.0.0.1:8080", "127.0.0.1", Some(&path))
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::PemDecode));
    }

    #[tokio::test]
    async fn empty_metric_slice_is_rejected() {
        let client = Client::new("grpc", "127.0.0.1:3200", "127.0.0.1", None).unwrap();
        let err = client.send_metrics(&[]).await.err().unwrap();
        assert!(matches!(err, ClientError::MetricsCountIsNull));
    }

    #[tokio::test]
    async fn metric_without_value_is_wrong_type() {
        let client = Client::new("grpc", "127.0.0.1:3200", "127.0.0.1", None).unwrap();
        let mut hollow = Metric::counter("x", 1);
        hollow.delta = None;
        let err = client.send_metrics(&[hollow]).await.err().unwrap();
        assert!(matches!(err, ClientError::WrongMetricType));
    }

    #[test]
    fn envelope_round_trips_across_chunks() {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = RsaPublicKey::from(&private);

        // three plaintext chunks at this key size
        let plain: Vec<u8> = (0..500u16).map(|i| (i % 251) as u8).collect();
        let encrypted = encrypt_body(&public, &plain).unwrap();
        assert_eq!(encrypted.len() % public.size(), 0);

        let mut decrypted = Vec::new();
        for block in encrypted.chunks(public.size()) {
            decrypted.extend_from_slice(
                &private.decrypt(Oaep::new::<Sha512>(), block).unwrap(),
            );
        }
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn empty_body_encrypts_to_empty() {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = RsaPublicKey::from(&private);
        assert!(encrypt_body(&public, &[]).unwrap().is_empty());
    }
}
