use crate::peers::ClusterNode;
use hyper::header::{CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper_openssl::HttpsConnector;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::debug;

const GET_CLUSTER_NODES: &str = r#"{"jsonrpc":"2.0","id":1,"method":"getClusterNodes"}"#;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid rpc url {url:?}: {source}")]
    Url {
        url: String,
        source: hyper::http::uri::InvalidUri,
    },
    #[error("failed to create https connector: {0}")]
    Connector(#[from] openssl::error::ErrorStack),
    #[error("failed to build request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("request to {url} failed: {source}")]
    Http { url: String, source: hyper::Error },
    #[error("no response from {url} within {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("malformed getClusterNodes response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("getClusterNodes response has no result")]
    MissingResult,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Vec<ClusterNode>>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Turn `--url` into an endpoint.
///
/// Anything with a scheme and a host is used as given; anything else is taken
/// as a cluster name, so `devnet` becomes `http://api.devnet.solana.com`.
pub fn build_url(url_key: &str) -> Result<String, FetchError> {
    if let Ok(uri) = url_key.parse::<Uri>() {
        if uri.scheme().is_some() && uri.host().is_some() {
            return Ok(url_key.to_string());
        }
    }
    let url = format!("http://api.{}.solana.com", url_key);
    url.parse::<Uri>().map_err(|source| FetchError::Url {
        url: url.clone(),
        source,
    })?;
    Ok(url)
}

pub fn user_agent() -> String {
    format!(
        "solana-latency-checker/{} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_COMMIT_HASH").unwrap_or("unknown")
    )
}

pub fn parse_cluster_nodes(body: &[u8]) -> Result<Vec<ClusterNode>, FetchError> {
    let response: RpcResponse = serde_json::from_slice(body)?;
    if let Some(error) = response.error {
        return Err(FetchError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    response.result.ok_or(FetchError::MissingResult)
}

/// POST `getClusterNodes` to `url` and return the node list.
pub async fn get_cluster_nodes(url: &str, timeout: Duration) -> Result<Vec<ClusterNode>, FetchError> {
    let uri = url.parse::<Uri>().map_err(|source| FetchError::Url {
        url: url.to_string(),
        source,
    })?;
    let https = HttpsConnector::new()?;
    let client: Client<_, Body> = Client::builder().build(https);

    let req = Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(USER_AGENT, user_agent())
        .body(Body::from(GET_CLUSTER_NODES))?;

    let fetch = async {
        let resp = client.request(req).await?;
        let status = resp.status();
        let body = hyper::body::to_bytes(resp.into_body()).await?;
        Ok::<_, hyper::Error>((status, body))
    };
    let (status, body) = match time::timeout(timeout, fetch).await {
        Ok(Ok(pair)) => pair,
        Ok(Err(source)) => {
            return Err(FetchError::Http {
                url: url.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(FetchError::Timeout {
                url: url.to_string(),
                timeout,
            })
        }
    };
    debug!("{} answered HTTP {} with {} bytes", url, status, body.len());

    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }
    parse_cluster_nodes(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response on a loopback port.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // drain the whole request so closing the socket does not reset it
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.ends_with(GET_CLUSTER_NODES.as_bytes()) {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        });
        format!("http://{}", addr)
    }

    #[test]
    fn cluster_names_expand_to_solana_endpoints() {
        assert_eq!(build_url("mainnet-beta").unwrap(), "http://api.mainnet-beta.solana.com");
        assert_eq!(build_url("devnet").unwrap(), "http://api.devnet.solana.com");
    }

    #[test]
    fn full_urls_are_kept_verbatim() {
        assert_eq!(build_url("https://rpc.example.com:8899").unwrap(), "https://rpc.example.com:8899");
        assert_eq!(build_url("http://127.0.0.1:8899/").unwrap(), "http://127.0.0.1:8899/");
    }

    #[test]
    fn unusable_names_are_rejected() {
        assert!(matches!(build_url("not a name"), Err(FetchError::Url { .. })));
    }

    #[test]
    fn parses_result_array() {
        let body = br#"{"jsonrpc":"2.0","result":[
            {"featureSet":1,"gossip":"10.0.0.1:8001","pubkey":"A","rpc":null,"shredVersion":2,"tpu":"10.0.0.1:8003","version":"1.18.0"},
            {"featureSet":null,"gossip":null,"pubkey":"B","rpc":null,"shredVersion":2,"tpu":null,"version":null}
        ],"id":1}"#;
        let nodes = parse_cluster_nodes(body).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].pubkey, "A");
        assert_eq!(nodes[1].gossip, None);
    }

    #[test]
    fn rpc_error_and_missing_result_are_errors() {
        let body = br#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":1}"#;
        assert!(matches!(
            parse_cluster_nodes(body),
            Err(FetchError::Rpc { code: -32601, .. })
        ));
        assert!(matches!(
            parse_cluster_nodes(br#"{"jsonrpc":"2.0","id":1}"#),
            Err(FetchError::MissingResult)
        ));
    }

    #[tokio::test]
    async fn fetches_nodes_over_http() {
        let url = serve_once(
            "200 OK",
            r#"{"jsonrpc":"2.0","result":[{"gossip":"10.0.0.1:8001","pubkey":"A"}],"id":1}"#,
        )
        .await;
        let nodes = get_cluster_nodes(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].gossip_or_empty(), "10.0.0.1:8001");
    }

    #[tokio::test]
    async fn invalid_json_is_a_fetch_error() {
        let url = serve_once("200 OK", "<html>not json</html>").await;
        let err = get_cluster_nodes(&url, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, FetchError::Json(_)));
    }

    #[tokio::test]
    async fn http_error_status_is_a_fetch_error() {
        let url = serve_once("503 Service Unavailable", "{}").await;
        let err = get_cluster_nodes(&url, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Status { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }
}
