//! Outbound HTTPS transport: parameter defaulting over a pooled client.
//!
//! [`Https`] is a plain data struct — set the knobs you care about, leave
//! the rest at zero value — and the real client is built exactly once, on
//! first use, with defaults filled in. Certificate verification is on by
//! default and can be switched off for upstreams with private CAs.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http::uri::Scheme;
use http::Uri;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{Client, Error as ClientError};
use hyper_util::rt::TokioExecutor;

const DEFAULT_TCP_KEEPALIVE: Duration = Duration::from_secs(10 * 60);
const DEFAULT_MAX_IDLE_CONNS: usize = 100;
const DEFAULT_IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(10 * 60);

type PooledClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// HTTPS transport to an upstream.
///
/// ```rust,no_run
/// use rampart::upstream::Https;
/// use std::time::Duration;
///
/// let mut transport = Https::new();
/// transport.dial_timeout = Some(Duration::from_secs(2));
/// # let _ = transport;
/// ```
pub struct Https {
    /// TCP connect timeout; unlimited when `None`.
    pub dial_timeout: Option<Duration>,
    /// TCP keepalive interval; defaults to 10 minutes.
    pub tcp_keepalive: Option<Duration>,
    /// Disables connection pooling entirely.
    pub disable_keepalive: bool,
    /// Idle connections kept per upstream host; defaults to 100.
    pub max_idle_conns: Option<usize>,
    /// How long an idle pooled connection survives; defaults to 10 minutes.
    pub idle_conn_timeout: Option<Duration>,
    /// Verify the upstream certificate chain. On by default; turn off only
    /// for upstreams with certificates the trust store cannot check.
    pub verify_ca: bool,

    client: OnceLock<PooledClient>,
}

impl Default for Https {
    fn default() -> Self {
        Self {
            dial_timeout: None,
            tcp_keepalive: None,
            disable_keepalive: false,
            max_idle_conns: None,
            idle_conn_timeout: None,
            verify_ca: true,
            client: OnceLock::new(),
        }
    }
}

impl Https {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `req` upstream over HTTPS. The request URI's scheme is forced
    /// to `https` — this transport does not speak anything else.
    pub async fn round_trip(
        &self,
        req: http::Request<Full<Bytes>>,
    ) -> Result<http::Response<Incoming>, ClientError> {
        let (mut parts, body) = req.into_parts();
        parts.uri = force_https(parts.uri);
        self.client()
            .request(http::Request::from_parts(parts, body))
            .await
    }

    fn client(&self) -> &PooledClient {
        self.client.get_or_init(|| {
            let mut connector = HttpConnector::new();
            connector.enforce_http(false);
            connector.set_connect_timeout(self.dial_timeout);
            connector.set_keepalive(Some(
                self.tcp_keepalive.unwrap_or(DEFAULT_TCP_KEEPALIVE),
            ));

            let https = HttpsConnectorBuilder::new()
                .with_tls_config(self.tls_config())
                .https_only()
                .enable_http1()
                .enable_http2()
                .wrap_connector(connector);

            Client::builder(TokioExecutor::new())
                .pool_max_idle_per_host(self.max_idle())
                .pool_idle_timeout(self.idle_timeout())
                .build(https)
        })
    }

    fn tls_config(&self) -> rustls::ClientConfig {
        if self.verify_ca {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        } else {
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(danger::NoVerify::new()))
                .with_no_client_auth()
        }
    }

    fn max_idle(&self) -> usize {
        if self.disable_keepalive {
            0
        } else {
            self.max_idle_conns.unwrap_or(DEFAULT_MAX_IDLE_CONNS)
        }
    }

    fn idle_timeout(&self) -> Duration {
        self.idle_conn_timeout.unwrap_or(DEFAULT_IDLE_CONN_TIMEOUT)
    }
}

fn force_https(uri: Uri) -> Uri {
    let original = uri.clone();
    let mut parts = uri.into_parts();
    parts.scheme = Some(Scheme::HTTPS);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some("/".parse().expect("static path"));
    }
    Uri::from_parts(parts).unwrap_or(original)
}

mod danger {
    //! Certificate verifier that accepts any chain. Signature checks still
    //! run through the real provider so a tampered handshake is caught.

    use rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use rustls::crypto::CryptoProvider;
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    #[derive(Debug)]
    pub(super) struct NoVerify(CryptoProvider);

    impl NoVerify {
        pub(super) fn new() -> Self {
            Self(rustls::crypto::aws_lc_rs::default_provider())
        }
    }

    impl ServerCertVerifier for NoVerify {
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
            rustls::crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }
}
