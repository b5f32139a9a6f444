use std::time::Duration;

use reqwest::Client;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Unreachable(String),

    #[error("upstream returned invalid data: {0}")]
    InvalidData(String),
}

pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

pub async fn load_text(client: &Client, url: &str) -> Result<String, UpstreamError> {
    let resp = client
        .get(url)
        .header("accept", "application/json")
        .send()
        .await
        .map_err(|err| UpstreamError::Unreachable(err.to_string()))?;
    if !resp.status().is_success() {
        return Err(UpstreamError::Unreachable(format!(
            "unexpected status {} from {}",
            resp.status(),
            url
        )));
    }

    resp.text()
        .await
        .map_err(|err| UpstreamError::Unreachable(err.to_string()))
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    /// Answers a single request with `response` after `delay`, returning the URL to hit.
    async fn serve_once(response: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}/latest/USD", addr)
    }

    fn client(timeout: Duration) -> Client {
        build_client(timeout).unwrap()
    }

    #[tokio::test]
    async fn successful_response_returns_body() {
        let url = serve_once(
            concat!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n",
                "content-length: 17\r\nconnection: close\r\n\r\n",
                r#"{"rates":{"A":1}}"#,
            ),
            Duration::ZERO,
        )
        .await;

        let text = load_text(&client(Duration::from_secs(5)), &url).await.unwrap();
        assert_eq!(text, r#"{"rates":{"A":1}}"#);
    }

    #[tokio::test]
    async fn error_status_is_unreachable() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            Duration::ZERO,
        )
        .await;

        match load_text(&client(Duration::from_secs(5)), &url).await {
            Err(UpstreamError::Unreachable(reason)) => {
                assert!(reason.contains("503"), "{}", reason)
            }
            other => panic!("expected Unreachable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn slow_upstream_hits_the_client_timeout() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}",
            Duration::from_secs(2),
        )
        .await;

        assert!(matches!(
            load_text(&client(Duration::from_millis(100)), &url).await,
            Err(UpstreamError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let url = format!("http://127.0.0.1:{}/", port);
        assert!(matches!(
            load_text(&client(Duration::from_secs(5)), &url).await,
            Err(UpstreamError::Unreachable(_))
        ));
    }
}
