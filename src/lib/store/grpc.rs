use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use futures::SinkExt;
use futures::channel::mpsc;
use http::uri::PathAndQuery;
use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tonic::codec::ProstCodec;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, instrument};

use super::proto::{self, upload_request, upload_strategy};
use super::{
    DebuginfoStore, InitiateUpload, MarkUploadFinished, ShouldInitiateUpload, UploadDecision,
    UploadInstructions, UploadStrategy,
};
use crate::artifact::{Content, DebuginfoKind};
use crate::error::{Error, Result};

/// Size of the chunk frames sent by the streaming upload.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// How to reach the store.
#[derive(Clone, Default)]
pub struct StoreConfig {
    /// `host:port`, optionally prefixed with `http://` or `https://`.
    pub address: String,
    pub bearer_token: Option<String>,
    /// Use plaintext HTTP/2.
    pub insecure: bool,
    /// Use TLS but accept any server certificate.
    pub insecure_skip_verify: bool,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("address", &self.address)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("insecure", &self.insecure)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Security {
    Plaintext,
    Tls,
    TlsSkipVerify,
}

impl StoreConfig {
    fn authority(&self) -> &str {
        self.address
            .strip_prefix("http://")
            .or_else(|| self.address.strip_prefix("https://"))
            .unwrap_or(&self.address)
            .trim_end_matches('/')
    }

    fn security(&self) -> Result<Security> {
        if self.authority().is_empty() {
            return Err(Error::InvalidAddress {
                address: self.address.clone(),
            });
        }
        if self.insecure {
            return Ok(Security::Plaintext);
        }
        if self.address.starts_with("http://") {
            // A plaintext address without the explicit opt-in would leak the token.
            if self.bearer_token.is_some() {
                return Err(Error::InsecureBearerToken);
            }
            return Ok(Security::Plaintext);
        }
        if self.insecure_skip_verify {
            Ok(Security::TlsSkipVerify)
        } else {
            Ok(Security::Tls)
        }
    }

    fn endpoint(&self, security: Security) -> Result<Endpoint> {
        let scheme = match security {
            Security::Tls => "https",
            // The skip-verify connector does its own TLS underneath.
            Security::Plaintext | Security::TlsSkipVerify => "http",
        };
        Endpoint::from_shared(format!("{scheme}://{}", self.authority())).map_err(|_| {
            Error::InvalidAddress {
                address: self.address.clone(),
            }
        })
    }
}

/// Attaches `authorization: Bearer <token>` to every outgoing call.
#[derive(Clone, Default)]
pub struct BearerAuth {
    header: Option<MetadataValue<Ascii>>,
}

impl BearerAuth {
    pub fn new(token: Option<&str>) -> Result<Self> {
        let header = token
            .map(|token| {
                format!("Bearer {token}")
                    .parse::<MetadataValue<Ascii>>()
                    .map_err(|_| Error::InvalidBearerToken)
            })
            .transpose()?;
        Ok(Self { header })
    }
}

impl Interceptor for BearerAuth {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        if let Some(header) = &self.header {
            request.metadata_mut().insert("authorization", header.clone());
        }
        Ok(request)
    }
}

/// Accepts any server certificate. Handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
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

fn skip_verify_tls_config() -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(config)
}

async fn connect_skip_verify(endpoint: Endpoint) -> Result<Channel> {
    let connector = TlsConnector::from(Arc::new(skip_verify_tls_config()?));
    let service = tower::service_fn(move |uri: http::Uri| {
        let connector = connector.clone();
        async move {
            let host = uri
                .host()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing host"))?
                .to_string();
            let port = uri.port_u16().unwrap_or(443);
            let tcp = TcpStream::connect((host.as_str(), port)).await?;
            let server_name = ServerName::try_from(host)
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
            let tls = connector.connect(server_name, tcp).await?;
            Ok::<_, std::io::Error>(TokioIo::new(tls))
        }
    });
    Ok(endpoint.connect_with_connector(service).await?)
}

type Client = tonic::client::Grpc<InterceptedService<Channel, BearerAuth>>;

/// [`DebuginfoStore`] over gRPC.
#[derive(Clone)]
pub struct GrpcStore {
    client: Client,
}

impl GrpcStore {
    #[instrument(skip_all, fields(address = %config.address))]
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let security = config.security()?;
        let auth = BearerAuth::new(config.bearer_token.as_deref())?;
        let endpoint = config.endpoint(security)?;
        debug!(?security, "connecting to store");

        let channel = match security {
            Security::Plaintext => endpoint.connect().await?,
            Security::Tls => {
                endpoint
                    .tls_config(ClientTlsConfig::new().with_native_roots())?
                    .connect()
                    .await?
            }
            Security::TlsSkipVerify => connect_skip_verify(endpoint).await?,
        };
        Ok(Self::from_channel(channel, auth))
    }

    /// Talk to the store over an already established channel.
    pub fn from_channel(channel: Channel, auth: BearerAuth) -> Self {
        Self {
            client: tonic::client::Grpc::new(InterceptedService::new(channel, auth)),
        }
    }

    async fn ready(&self) -> Result<Client> {
        let mut client = self.client.clone();
        client.ready().await.map_err(|err| {
            let err: tonic::codegen::StdError = err.into();
            tonic::Status::unknown(format!("store was not ready: {err}"))
        })?;
        Ok(client)
    }
}

fn strategy_from_wire(instructions: &proto::UploadInstructions) -> UploadStrategy {
    match instructions.upload_strategy {
        upload_strategy::UNSPECIFIED => UploadStrategy::Unspecified,
        upload_strategy::GRPC => UploadStrategy::Grpc,
        upload_strategy::SIGNED_URL => UploadStrategy::SignedUrl(instructions.signed_url.clone()),
        other => UploadStrategy::Unrecognized(other),
    }
}

#[async_trait]
impl DebuginfoStore for GrpcStore {
    async fn should_initiate_upload(&self, request: ShouldInitiateUpload) -> Result<UploadDecision> {
        let mut client = self.ready().await?;
        let message = proto::ShouldInitiateUploadRequest {
            build_id: request.build_id,
            hash: String::new(),
            force: request.force,
            r#type: request.kind.as_wire(),
        };
        let response: tonic::Response<proto::ShouldInitiateUploadResponse> = client
            .unary(
                tonic::Request::new(message),
                PathAndQuery::from_static(proto::SHOULD_INITIATE_UPLOAD_PATH),
                ProstCodec::default(),
            )
            .await?;
        let response = response.into_inner();
        Ok(UploadDecision {
            should_upload: response.should_initiate_upload,
            reason: response.reason,
        })
    }

    async fn initiate_upload(&self, request: InitiateUpload) -> Result<UploadInstructions> {
        let mut client = self.ready().await?;
        let message = proto::InitiateUploadRequest {
            build_id: request.build_id,
            size: i64::try_from(request.size).unwrap_or(i64::MAX),
            hash: request.hash,
            force: request.force,
            r#type: request.kind.as_wire(),
        };
        let response: tonic::Response<proto::InitiateUploadResponse> = client
            .unary(
                tonic::Request::new(message),
                PathAndQuery::from_static(proto::INITIATE_UPLOAD_PATH),
                ProstCodec::default(),
            )
            .await?;
        let instructions = response
            .into_inner()
            .upload_instructions
            .ok_or_else(|| tonic::Status::internal("store returned no upload instructions"))?;
        Ok(UploadInstructions {
            strategy: strategy_from_wire(&instructions),
            kind: DebuginfoKind::from_wire(instructions.r#type).unwrap_or(request.kind),
            build_id: instructions.build_id,
            upload_id: instructions.upload_id,
        })
    }

    async fn upload(&self, instructions: &UploadInstructions, content: &mut Content) -> Result<u64> {
        let mut client = self.ready().await?;
        let (mut tx, rx) = mpsc::channel::<proto::UploadRequest>(4);
        let info = proto::UploadRequest {
            data: Some(upload_request::Data::Info(proto::UploadInfo {
                build_id: instructions.build_id.clone(),
                upload_id: instructions.upload_id.clone(),
                r#type: instructions.kind.as_wire(),
            })),
        };

        let produce = async move {
            let mut sent = 0u64;
            if tx.send(info).await.is_err() {
                return Ok(sent);
            }
            let mut chunk = vec![0u8; CHUNK_SIZE];
            loop {
                let n = content.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                let frame = proto::UploadRequest {
                    data: Some(upload_request::Data::ChunkData(chunk[..n].to_vec())),
                };
                // The receiver is gone once the call has failed; its status is reported below.
                if tx.send(frame).await.is_err() {
                    break;
                }
                sent += n as u64;
            }
            Ok::<_, Error>(sent)
        };
        let call = client.client_streaming(
            tonic::Request::new(rx),
            PathAndQuery::from_static(proto::UPLOAD_PATH),
            ProstCodec::<proto::UploadRequest, proto::UploadResponse>::default(),
        );

        let (produced, response) = futures::join!(produce, call);
        let response = response?.into_inner();
        let sent = produced?;
        debug!(sent, acknowledged = response.size, "streamed upload");
        if response.size != sent {
            return Err(Error::SizeMismatch {
                sent,
                acknowledged: response.size,
            });
        }
        Ok(sent)
    }

    async fn mark_upload_finished(&self, request: MarkUploadFinished) -> Result<()> {
        let mut client = self.ready().await?;
        let message = proto::MarkUploadFinishedRequest {
            build_id: request.build_id,
            upload_id: request.upload_id,
            r#type: request.kind.as_wire(),
        };
        let _: tonic::Response<proto::MarkUploadFinishedResponse> = client
            .unary(
                tonic::Request::new(message),
                PathAndQuery::from_static(proto::MARK_UPLOAD_FINISHED_PATH),
                ProstCodec::default(),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod test_store_config {
    use super::*;

    fn config(address: &str) -> StoreConfig {
        StoreConfig {
            address: address.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn tls_is_the_default() {
        assert_eq!(config("store:7070").security().unwrap(), Security::Tls);
    }

    #[test]
    fn insecure_flags_select_transport() {
        let plain = StoreConfig {
            insecure: true,
            ..config("store:7070")
        };
        assert_eq!(plain.security().unwrap(), Security::Plaintext);

        let skip = StoreConfig {
            insecure_skip_verify: true,
            ..config("store:7070")
        };
        assert_eq!(skip.security().unwrap(), Security::TlsSkipVerify);

        let both = StoreConfig {
            insecure: true,
            insecure_skip_verify: true,
            ..config("store:7070")
        };
        assert_eq!(both.security().unwrap(), Security::Plaintext);
    }

    #[test]
    fn token_over_implicit_plaintext_is_refused() {
        let cfg = StoreConfig {
            bearer_token: Some("secret".to_string()),
            ..config("http://store:7070")
        };
        assert!(matches!(cfg.security(), Err(Error::InsecureBearerToken)));
    }

    #[test]
    fn token_over_explicit_plaintext_is_allowed() {
        let cfg = StoreConfig {
            bearer_token: Some("secret".to_string()),
            insecure: true,
            ..config("http://store:7070")
        };
        assert_eq!(cfg.security().unwrap(), Security::Plaintext);
    }

    #[test]
    fn scheme_prefix_is_stripped_from_endpoint() {
        let cfg = config("https://store:7070/");
        let endpoint = cfg.endpoint(Security::Tls).unwrap();
        assert_eq!(endpoint.uri().scheme_str(), Some("https"));
        assert_eq!(endpoint.uri().host(), Some("store"));
        assert_eq!(endpoint.uri().port_u16(), Some(7070));
    }

    #[test]
    fn empty_address_is_invalid() {
        assert!(matches!(
            config("").security(),
            Err(Error::InvalidAddress { .. })
        ));
    }

    #[test]
    fn debug_output_redacts_token() {
        let cfg = StoreConfig {
            bearer_token: Some("secret".to_string()),
            ..config("store:7070")
        };
        let shown = format!("{cfg:?}");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn interceptor_attaches_bearer_header() {
        let mut auth = BearerAuth::new(Some("abc")).unwrap();
        let request = auth.call(tonic::Request::new(())).unwrap();
        let header = request.metadata().get("authorization").unwrap();
        assert_eq!(header.to_str().unwrap(), "Bearer abc");
    }

    #[test]
    fn interceptor_without_token_adds_nothing() {
        let mut auth = BearerAuth::new(None).unwrap();
        let request = auth.call(tonic::Request::new(())).unwrap();
        assert!(request.metadata().get("authorization").is_none());
    }

    #[test]
    fn token_with_newline_is_rejected() {
        assert!(matches!(
            BearerAuth::new(Some("abc\n")),
            Err(Error::InvalidBearerToken)
        ));
    }

    #[test]
    fn strategy_decoding_is_total() {
        let mut wire = proto::UploadInstructions {
            signed_url: "https://bucket/obj".to_string(),
            ..Default::default()
        };
        assert_eq!(strategy_from_wire(&wire), UploadStrategy::Unspecified);
        wire.upload_strategy = upload_strategy::GRPC;
        assert_eq!(strategy_from_wire(&wire), UploadStrategy::Grpc);
        wire.upload_strategy = upload_strategy::SIGNED_URL;
        assert_eq!(
            strategy_from_wire(&wire),
            UploadStrategy::SignedUrl("https://bucket/obj".to_string())
        );
        wire.upload_strategy = 7;
        assert_eq!(strategy_from_wire(&wire), UploadStrategy::Unrecognized(7));
    }
}
