use std::io::Write;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use futures::future::BoxFuture;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_client::TraceServiceClient;
use paytrace_core::error::{PaytraceError, Result};
use paytrace_core::model::span::SpanRecord;
use prost::Message;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::Mutex;
use tonic::codec::CompressionEncoding;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::Channel;

use crate::export::SpanExporter;
use crate::export::encode::{ResourceInfo, encode_request};

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub endpoint: String,
    pub protocol: ExportProtocol,
    pub compression: ExportCompression,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportProtocol {
    Grpc,
    HttpProtobuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportCompression {
    None,
    Gzip,
}

impl ExportProtocol {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "http" | "http/protobuf" | "httpprotobuf" => Self::HttpProtobuf,
            _ => Self::Grpc,
        }
    }
}

impl ExportCompression {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "gzip" => Self::Gzip,
            _ => Self::None,
        }
    }
}

/// Ships span batches to an OTLP collector over gRPC or HTTP/protobuf.
pub struct OtlpExporter {
    transport: Transport,
    resource: ResourceInfo,
}

enum Transport {
    Grpc {
        client: Mutex<TraceServiceClient<Channel>>,
        metadata: MetadataMap,
        timeout: Duration,
    },
    Http {
        client: Client,
        url: String,
        headers: HeaderMap,
        compression: ExportCompression,
    },
}

impl OtlpExporter {
    /// The gRPC channel connects lazily, so this must run inside a tokio runtime.
    pub fn new(cfg: ExportConfig, resource: ResourceInfo) -> Result<Self> {
        let transport = match cfg.protocol {
            ExportProtocol::Grpc => {
                let endpoint = normalize_grpc_endpoint(&cfg.endpoint);
                let channel = Channel::from_shared(endpoint.clone())
                    .map_err(|e| {
                        PaytraceError::Export(format!("invalid gRPC endpoint {endpoint}: {e}"))
                    })?
                    .connect_lazy();
                Transport::Grpc {
                    client: Mutex::new(configure_traces_client(
                        TraceServiceClient::new(channel),
                        cfg.compression,
                    )),
                    metadata: build_grpc_metadata(&cfg.headers),
                    timeout: cfg.timeout,
                }
            }
            ExportProtocol::HttpProtobuf => {
                let client = Client::builder()
                    .timeout(cfg.timeout)
                    .build()
                    .map_err(|e| PaytraceError::Export(format!("failed to build http client: {e}")))?;
                Transport::Http {
                    client,
                    url: traces_url(&cfg.endpoint),
                    headers: build_http_headers(&cfg.headers),
                    compression: cfg.compression,
                }
            }
        };

        Ok(Self {
            transport,
            resource,
        })
    }
}

impl SpanExporter for OtlpExporter {
    fn export(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let req = encode_request(&batch, &self.resource);
            match &self.transport {
                Transport::Grpc {
                    client,
                    metadata,
                    timeout,
                } => {
                    export_with_retries(|| async {
                        let mut client = client.lock().await;
                        let mut request = tonic::Request::new(req.clone());
                        request.set_timeout(*timeout);
                        *request.metadata_mut() = metadata.clone();
                        client.export(request).await.map(|_| ())
                    })
                    .await;
                }
                Transport::Http {
                    client,
                    url,
                    headers,
                    compression,
                } => {
                    export_http_with_retries(client, url, headers, &req, *compression).await;
                }
            }
        })
    }
}

fn normalize_grpc_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

fn traces_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/v1/traces") {
        base.to_string()
    } else {
        format!("{base}/v1/traces")
    }
}

async fn export_with_retries<F, Fut, E>(mut call: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Debug,
{
    let mut last_err = None;
    for attempt in 0..3 {
        match call().await {
            Ok(()) => return,
            Err(err) => last_err = Some(err),
        }
        tokio::time::sleep(Duration::from_millis(30 * (attempt + 1) as u64)).await;
    }
    tracing::warn!(error = ?last_err, "span export failed after retries");
}

async fn export_http_with_retries(
    client: &Client,
    url: &str,
    headers: &HeaderMap,
    req: &ExportTraceServiceRequest,
    compression: ExportCompression,
) {
    let mut body = Vec::new();
    if let Err(err) = req.encode(&mut body) {
        tracing::warn!(error = ?err, "failed to encode span export payload");
        return;
    }
    let Ok((body, content_encoding)) = maybe_compress_http_body(body, compression) else {
        tracing::warn!(url = %url, "failed to compress span export payload");
        return;
    };

    for attempt in 0..3 {
        let mut req = client
            .post(url)
            .header("content-type", "application/x-protobuf")
            .headers(headers.clone());
        if let Some(encoding) = content_encoding {
            req = req.header("content-encoding", encoding);
        }
        let result = req.body(body.clone()).send().await;
        if let Ok(resp) = result
            && resp.status().is_success()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(30 * (attempt + 1) as u64)).await;
    }
    tracing::warn!(url = %url, "span export over HTTP failed after retries");
}

fn configure_traces_client(
    client: TraceServiceClient<Channel>,
    compression: ExportCompression,
) -> TraceServiceClient<Channel> {
    match compression {
        ExportCompression::Gzip => client
            .send_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Gzip),
        ExportCompression::None => client,
    }
}

fn build_grpc_metadata(headers: &[(String, String)]) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (k, v) in headers {
        let key = MetadataKey::<Ascii>::from_bytes(k.as_bytes());
        let value = MetadataValue::try_from(v.as_str());
        match (key, value) {
            (Ok(key), Ok(value)) => {
                metadata.insert(key, value);
            }
            _ => {
                tracing::warn!(header = %k, "ignored invalid export gRPC header");
            }
        }
    }
    metadata
}

fn build_http_headers(headers: &[(String, String)]) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (k, v) in headers {
        let name = HeaderName::try_from(k.as_str());
        let value = HeaderValue::try_from(v.as_str());
        match (name, value) {
            (Ok(name), Ok(value)) => {
                out.insert(name, value);
            }
            _ => {
                tracing::warn!(header = %k, "ignored invalid export HTTP header");
            }
        }
    }
    out
}

fn maybe_compress_http_body(
    body: Vec<u8>,
    compression: ExportCompression,
) -> std::io::Result<(Vec<u8>, Option<&'static str>)> {
    match compression {
        ExportCompression::None => Ok((body, None)),
        ExportCompression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&body)?;
            let compressed = encoder.finish()?;
            Ok((compressed, Some("gzip")))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn export_protocol_parse_variants() {
        assert_eq!(ExportProtocol::parse("grpc"), ExportProtocol::Grpc);
        assert_eq!(
            ExportProtocol::parse("http/protobuf"),
            ExportProtocol::HttpProtobuf
        );
        assert_eq!(ExportProtocol::parse("HTTP"), ExportProtocol::HttpProtobuf);
        assert_eq!(ExportProtocol::parse("unexpected"), ExportProtocol::Grpc);
    }

    #[test]
    fn export_compression_parse_variants() {
        assert_eq!(ExportCompression::parse("gzip"), ExportCompression::Gzip);
        assert_eq!(ExportCompression::parse("GZIP"), ExportCompression::Gzip);
        assert_eq!(ExportCompression::parse("none"), ExportCompression::None);
    }

    #[test]
    fn traces_url_appends_signal_path_once() {
        assert_eq!(
            traces_url("http://127.0.0.1:4318"),
            "http://127.0.0.1:4318/v1/traces"
        );
        assert_eq!(
            traces_url("http://127.0.0.1:4318/v1/traces/"),
            "http://127.0.0.1:4318/v1/traces"
        );
    }

    #[test]
    fn grpc_endpoint_gets_scheme() {
        assert_eq!(normalize_grpc_endpoint("collector:4317"), "http://collector:4317");
        assert_eq!(
            normalize_grpc_endpoint("https://collector:4317"),
            "https://collector:4317"
        );
    }

    #[test]
    fn gzip_body_round_trips() {
        let (compressed, encoding) =
            maybe_compress_http_body(b"spans".to_vec(), ExportCompression::Gzip).unwrap();
        assert_eq!(encoding, Some("gzip"));
        let mut out = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "spans");
    }

    #[test]
    fn invalid_headers_are_skipped() {
        let headers = build_http_headers(&[
            ("x-tenant".into(), "dev".into()),
            ("bad header".into(), "x".into()),
        ]);
        assert_eq!(headers.len(), 1);
        let metadata = build_grpc_metadata(&[("x-tenant".into(), "dev".into())]);
        assert_eq!(metadata.len(), 1);
    }

    #[tokio::test]
    async fn http_exporter_posts_protobuf_batch() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        use chrono::Utc;
        use paytrace_core::ids::{SpanId, TraceId};
        use paytrace_core::model::span::{SpanKind, SpanStatus};

        let received = Arc::new(AtomicUsize::new(0));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counter = received.clone();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            if head.starts_with("POST /v1/traces") && head.contains("application/x-protobuf") {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let exporter = OtlpExporter::new(
            ExportConfig {
                endpoint: format!("http://{addr}"),
                protocol: ExportProtocol::HttpProtobuf,
                compression: ExportCompression::None,
                headers: vec![],
                timeout: Duration::from_secs(2),
            },
            ResourceInfo {
                service_version: "v0.1.0".into(),
                environment: "test".into(),
            },
        )
        .unwrap();

        let now = Utc::now();
        exporter
            .export(vec![SpanRecord {
                trace_id: TraceId::parse("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
                span_id: SpanId::parse("00f067aa0ba902b7").unwrap(),
                parent_span_id: None,
                service: "payments".into(),
                name: "HTTP POST /api/payment".into(),
                kind: SpanKind::Server,
                start_ts: now,
                end_ts: now,
                status: SpanStatus::Unset,
                error: None,
                attributes: Default::default(),
            }])
            .await;

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
