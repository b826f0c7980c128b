//! Fans a load-test request out to every configured worker and fans their
//! result streams back in through one channel.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tonic::{
    transport::{Certificate, Channel, ClientTlsConfig, Endpoint},
    Request, Status,
};

use crate::{
    backend::StoredResult,
    proto::{self, worker_client::WorkerClient, BrowserType as WireBrowserType, Endpoint as WireEndpoint},
    service::Endpoint as LoadEndpoint,
};

/// Injects the `authorization: basic <secret>` header the original client
/// attaches via `ctxWithSecret`, when a worker has a secret configured.
#[derive(Clone)]
struct AuthInterceptor {
    secret: Option<String>,
}

impl tonic::service::Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(secret) = &self.secret {
            let value = format!("basic {secret}")
                .parse()
                .map_err(|_| Status::invalid_argument("secret contains invalid header characters"))?;
            request.metadata_mut().insert("authorization", value);
        }
        Ok(request)
    }
}

type AuthedClient = WorkerClient<tonic::service::interceptor::InterceptedService<Channel, AuthInterceptor>>;

/// One worker this instructor can dial, as configured.
#[derive(Debug, Clone)]
pub struct WorkerDescriptor {
    pub alias: String,
    pub adress: String,
    pub port: u16,
    pub certificate_pem: Option<Vec<u8>>,
    pub secret: Option<String>,
}

struct WorkerHandle {
    descriptor: WorkerDescriptor,
    client: AuthedClient,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("worker '{alias}' is unreachable: {source}")]
    Dial { alias: String, #[source] source: tonic::transport::Error },
    #[error("worker '{0}' responded with an error: {1}")]
    Rpc(String, Status),
    #[error("invalid endpoint uri for worker '{0}': {1}")]
    InvalidUri(String, #[source] tonic::transport::Error),
    #[error("certificate for worker '{0}' could not be decoded as PEM")]
    CertDecode(String),
}

/// Coordinates every worker target an instructor run talks to.
#[derive(Default)]
pub struct Client {
    descriptors: Vec<WorkerDescriptor>,
    cert_pool: Vec<u8>,
    handles: Vec<WorkerHandle>,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a worker target. If it carries a certificate, it must
    /// decode as at least one PEM certificate; a worker whose certificate
    /// fails to decode is rejected with `ClientError::CertDecode` and not
    /// added. A decodable certificate's raw PEM bytes are appended to the
    /// client's shared trust pool; every worker connection dialed afterwards
    /// trusts the union of all certificates added so far, mirroring the
    /// original `x509.CertPool` accumulation.
    pub fn add_worker(&mut self, descriptor: WorkerDescriptor) -> Result<(), ClientError> {
        if let Some(pem) = &descriptor.certificate_pem {
            let decoded = rustls_pemfile::certs(&mut &pem[..])
                .map_err(|_| ClientError::CertDecode(descriptor.alias.clone()))?;
            if decoded.is_empty() {
                return Err(ClientError::CertDecode(descriptor.alias.clone()));
            }
            self.cert_pool.extend_from_slice(pem);
            self.cert_pool.push(b'\n');
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Dials every registered worker, applying `timeout` to each connection
    /// attempt. Stops at the first failure, matching the original's
    /// all-or-nothing `ExecuteAction` dial loop.
    pub async fn connect(&mut self, timeout: Duration) -> Result<(), ClientError> {
        self.handles.clear();

        for descriptor in self.descriptors.clone() {
            let scheme = if descriptor.certificate_pem.is_some() { "https" } else { "http" };
            let uri = format!("{scheme}://{}:{}", descriptor.adress, descriptor.port);

            let mut endpoint = Endpoint::from_shared(uri)
                .map_err(|e| ClientError::InvalidUri(descriptor.alias.clone(), e))?
                .timeout(timeout)
                .connect_timeout(timeout);

            if descriptor.certificate_pem.is_some() {
                let tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(&self.cert_pool));
                endpoint = endpoint
                    .tls_config(tls)
                    .map_err(|e| ClientError::Dial { alias: descriptor.alias.clone(), source: e })?;
            }

            let channel = endpoint
                .connect()
                .await
                .map_err(|e| ClientError::Dial { alias: descriptor.alias.clone(), source: e })?;

            let interceptor = AuthInterceptor { secret: descriptor.secret.clone() };
            let client = WorkerClient::with_interceptor(channel, interceptor);

            self.handles.push(WorkerHandle { descriptor, client });
        }

        Ok(())
    }

    /// Drops every live connection. Channels close on drop; nothing else to
    /// flush on the client side.
    pub fn disconnect(&mut self) {
        self.handles.clear();
    }

    /// Pings every connected worker in order, stopping at the first failure.
    pub async fn ping(&mut self) -> Result<(), ClientError> {
        for handle in &mut self.handles {
            let response = handle
                .client
                .ping(proto::PingRequest {})
                .await
                .map_err(|s| ClientError::Rpc(handle.descriptor.alias.clone(), s))?;

            tracing::info!(
                component = "instructor_client",
                worker = %handle.descriptor.alias,
                response = %response.into_inner().message,
                "pinged worker"
            );
        }

        Ok(())
    }

    /// Starts a load test on every connected worker concurrently and fans
    /// every worker's result stream into a single channel. The returned
    /// receiver closes once every worker's stream has ended (or failed).
    pub async fn run(
        &mut self,
        endpoints: Vec<LoadEndpoint>,
        amount: u32,
        min_wait: Duration,
        max_wait: Duration,
        browser_type: WireBrowserType,
    ) -> mpsc::Receiver<Result<StoredResult, ClientError>> {
        let (tx, rx) = mpsc::channel(1024);

        let wire_endpoints: Vec<WireEndpoint> = endpoints
            .iter()
            .map(|e| WireEndpoint { url: e.url.clone(), weight: e.weight })
            .collect();

        let mut tasks = Vec::with_capacity(self.handles.len());
        for handle in &mut self.handles {
            let mut client = handle.client.clone();
            let alias = handle.descriptor.alias.clone();
            let tx = tx.clone();
            let request = proto::RunRequest {
                endpoints: wire_endpoints.clone(),
                amount,
                min_wait_time: min_wait.as_millis() as u32,
                max_wait_time: max_wait.as_millis() as u32,
                r#type: browser_type as i32,
            };

            tasks.push(tokio::spawn(async move {
                let stream = match client.run(request).await {
                    Ok(resp) => resp.into_inner(),
                    Err(status) => {
                        let _ = tx.send(Err(ClientError::Rpc(alias, status))).await;
                        return;
                    }
                };

                let mut stream = stream;
                loop {
                    match tokio_stream::StreamExt::next(&mut stream).await {
                        Some(Ok(result)) => {
                            let stored = StoredResult {
                                url: result.url,
                                http_status_code: result.http_status_code,
                                http_status_message: result.http_status_message,
                                ttfb: Duration::from_millis(result.ttfb.max(0) as u64),
                                cached: result.cached,
                            };
                            if tx.send(Ok(stored)).await.is_err() {
                                return;
                            }
                        }
                        Some(Err(status)) => {
                            let _ = tx.send(Err(ClientError::Rpc(alias.clone(), status))).await;
                            return;
                        }
                        None => return,
                    }
                }
            }));
        }

        drop(tx);
        tokio::spawn(async move {
            futures::future::join_all(tasks).await;
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two distinct self-signed test certificates (CN=test, CN=test2), used
    // only to exercise PEM decoding; not checked against any private key.
    const CERT_A: &[u8] = b"-----BEGIN CERTIFICATE-----\n\
MIIC/zCCAeegAwIBAgIUUPDl7zdlI7Vzuytzrl7eL7b+3fYwDQYJKoZIhvcNAQEL\n\
BQAwDzENMAsGA1UEAwwEdGVzdDAeFw0yNjA3MjgyMTUyMTNaFw0yNjA3MjkyMTUy\n\
MTNaMA8xDTALBgNVBAMMBHRlc3QwggEiMA0GCSqGSIb3DQEBAQUAA4IBDwAwggEK\n\
AoIBAQCaFHRhFkawNP0PscS0vDKIqGa5UBfRaOO3MF8XbB0vWp98eSLBEwBOF7oR\n\
QIOQ9NdCSsBDGtWxP89YJGQmbLU8h7UaFSFMW7idfUTDX9prZWcsrwL+uaWffn+G\n\
GmjssCEQ/TlsgSfzJ82VH2MGtldpn3Y2gEp6aPxCL6HE+5dbdBaoDMiumpluLE2B\n\
rHgYh82hfzlOutWdQhl+AVCbv+xVQ/+1e1GFX3+8ccLmJYCvb2Je2vmqpmi1Eluu\n\
2ZSRjm9P015VNT+7oF4XOwD92oTrNL1EcndKx9hOyggoPukXpoaExjWPCu3QdSKx\n\
pQ8qdGM1GFJGCgqVrhKE9ECi3ARLAgMBAAGjUzBRMB0GA1UdDgQWBBSVBizUeWMV\n\
ighgqyiZ8Myi4OvB3TAfBgNVHSMEGDAWgBSVBizUeWMVighgqyiZ8Myi4OvB3TAP\n\
BgNVHRMBAf8EBTADAQH/MA0GCSqGSIb3DQEBCwUAA4IBAQBMsxMKkgXoVuldM83h\n\
9AdFzUuUaTaxkC0cTRqPyfFuwBZB8YgwxnIL3nzrn9JmwDg3N6vhRTEkGWJXezZS\n\
9qdgL+Sewq9o9vHi14pZylIW+fefuUYIg8tiM5b1ke90oLDt9eeqIty1oH06I2N9\n\
2Hv2gfVRFM1P1ToZc+IOkF1r8SDncpPn/fOWLIqCSdwVusGuvV94DyXkcLZjVlV/\n\
jyTXi3jHo4ciAr22Gb7PNLDOyYLaIvqppXB0l0j5ACM2Eu8dpQI2jAb1OW/9qchs\n\
yNZvxqgE9s9wMTxZeGUMPcfhc8YKDxb7kvVKbSa12O4WyiTac6lKc9Ain4BH8Asv\n\
BAeC\n\
-----END CERTIFICATE-----\n";

    const CERT_B: &[u8] = b"-----BEGIN CERTIFICATE-----\n\
MIIDATCCAemgAwIBAgIUej8AnbHvo9RKRPgP+WeQjDyBgTowDQYJKoZIhvcNAQEL\n\
BQAwEDEOMAwGA1UEAwwFdGVzdDIwHhcNMjYwNzI4MjE1MjIxWhcNMjYwNzI5MjE1\n\
MjIxWjAQMQ4wDAYDVQQDDAV0ZXN0MjCCASIwDQYJKoZIhvcNAQEBBQADggEPADCC\n\
AQoCggEBANC+HyTiHOIhw5qzQ54RPven6PBeTCtp14D9X36fzi44wic4SjFN08QJ\n\
2AAMDdU1MO6am8CLxOP9n5ynZMJ+2qmkqXxTJ75Glrk+ITu5ParixokmyPSbvMbo\n\
GJfGUbofUoVAAlY7H9N6sehvKOjyszz0Vuh1sJFp/3qObwG28NvNCyP8tvKtc4c/\n\
xdmYapy92wQXb481RJVDAGJnBBfZWYsd0NIecMjtxohXQFqqGM4OYQz1s44paXkB\n\
qFvXHOILJvhXd+luIngEV7/LvCCXhqvFTs12FySIaAmYGn5junOcfFdE7nhvpeOq\n\
oa9DHX2fVhaC+hZG47joSTpil4c3sB0CAwEAAaNTMFEwHQYDVR0OBBYEFLCBjjRr\n\
kWFL4ScNno7bro6ktiEBMB8GA1UdIwQYMBaAFLCBjjRrkWFL4ScNno7bro6ktiEB\n\
MA8GA1UdEwEB/wQFMAMBAf8wDQYJKoZIhvcNAQELBQADggEBAMylmHS+rxorujgJ\n\
p8v8hs/U8U1p25l6oqUEUeVpw/Nv5EEGEw82vCZHye9EwFLvc2s5iC+FVaRfp/yL\n\
zUd3XGHjv6ebNulbDH3SdGYgOtrn9+DEkgLw6vp9jctEKkr71tOKmW4mvZuAzSpd\n\
Fep5xbm0re0Wc7xEn4YrreEO+SuRfHE7Mg0HTgP+HdjoRe3h3DUCRrZskqih2NdD\n\
2a6ju+qJWtj9yjuEQNJmBugbJ0prwAVbSSYBLWBv1oBHYjtqmHyESJp+w4t5GUHK\n\
ao2df8I6Y7AsPjwdB9LKxhIB9/hPHbI0IruNzjwdFAaTNpQSt7eFuzkhtG43tNTZ\n\
3VhCR/I=\n\
-----END CERTIFICATE-----\n";

    #[test]
    fn add_worker_without_certificate_leaves_pool_empty() {
        let mut client = Client::new();
        client
            .add_worker(WorkerDescriptor {
                alias: "a".into(),
                adress: "127.0.0.1".into(),
                port: 1,
                certificate_pem: None,
                secret: None,
            })
            .unwrap();
        assert!(client.cert_pool.is_empty());
        assert_eq!(client.descriptors.len(), 1);
    }

    #[test]
    fn add_worker_with_certificate_appends_to_shared_pool() {
        let mut client = Client::new();
        client
            .add_worker(WorkerDescriptor {
                alias: "a".into(),
                adress: "127.0.0.1".into(),
                port: 1,
                certificate_pem: Some(CERT_A.to_vec()),
                secret: None,
            })
            .unwrap();
        client
            .add_worker(WorkerDescriptor {
                alias: "b".into(),
                adress: "127.0.0.1".into(),
                port: 2,
                certificate_pem: Some(CERT_B.to_vec()),
                secret: None,
            })
            .unwrap();
        let mut expected_tail = CERT_B.to_vec();
        expected_tail.push(b'\n');
        assert!(client.cert_pool.starts_with(b"-----BEGIN CERTIFICATE"));
        assert!(client.cert_pool.ends_with(&expected_tail));
    }

    #[test]
    fn add_worker_rejects_undecodable_certificate() {
        let mut client = Client::new();
        let err = client
            .add_worker(WorkerDescriptor {
                alias: "a".into(),
                adress: "127.0.0.1".into(),
                port: 1,
                certificate_pem: Some(b"not a pem certificate".to_vec()),
                secret: None,
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::CertDecode(alias) if alias == "a"));
        assert!(client.descriptors.is_empty());
        assert!(client.cert_pool.is_empty());
    }
}
