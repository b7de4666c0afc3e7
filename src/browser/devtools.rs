//! HTTP side of the DevTools protocol: `/json/version`, `/json/list`, `/json/new`.
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{GridLensError, GridLensResult};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// `/json/new` takes the raw query as the URL and unescapes it once, so only bytes
/// that would end the query early or be unescaped are encoded.
const NEW_TAB_QUERY: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'#').add(b'%').add(b'<').add(b'>');

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

/// One open tab as reported by `/json/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub target_type: String,
}

#[derive(Debug, Clone)]
pub struct DevToolsEndpoint {
    base: String,
    client: Client,
}

impl DevToolsEndpoint {
    pub fn new(endpoint: &str) -> GridLensResult<Self> {
        let base = normalize_endpoint(endpoint)?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { base, client })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn version(&self) -> GridLensResult<VersionInfo> {
        let url = format!("{}/json/version", self.base);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(GridLensError::Browser(format!(
                "{url} returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Page targets only; service workers and extensions are skipped.
    pub async fn list_tabs(&self) -> GridLensResult<Vec<TabInfo>> {
        let url = format!("{}/json/list", self.base);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(GridLensError::Browser(format!(
                "{url} returned {}",
                resp.status()
            )));
        }
        let targets: Vec<TabInfo> = resp.json().await?;
        Ok(targets.into_iter().filter(|t| t.target_type == "page").collect())
    }

    /// Opens a tab with `PUT /json/new?<url>`. Recent Chrome rejects GET here.
    pub async fn new_tab(&self, url: &str) -> GridLensResult<TabInfo> {
        let endpoint = new_tab_url(&self.base, url);
        let resp = self.client.put(&endpoint).send().await?;
        if !resp.status().is_success() {
            return Err(GridLensError::Browser(format!(
                "{endpoint} returned {}",
                resp.status()
            )));
        }
        let tab: TabInfo = resp.json().await?;
        tracing::info!(id = %tab.id, url, "opened tab");
        Ok(tab)
    }

    /// Polls `/json/version` until it answers or `budget` runs out.
    pub async fn wait_until_reachable(&self, budget: Duration) -> GridLensResult<VersionInfo> {
        let started = tokio::time::Instant::now();
        let deadline = started + budget;
        loop {
            match self.version().await {
                Ok(info) => {
                    tracing::debug!(
                        endpoint = %self.base,
                        browser = %info.browser,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "devtools endpoint reachable"
                    );
                    return Ok(info);
                }
                Err(e) => {
                    if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                        tracing::warn!(endpoint = %self.base, error = %e, "devtools endpoint unreachable");
                        return Err(GridLensError::ConnectionUnreachable {
                            endpoint: self.base.clone(),
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    tracing::trace!(endpoint = %self.base, error = %e, "endpoint not ready yet");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}

fn new_tab_url(base: &str, url: &str) -> String {
    format!("{base}/json/new?{}", utf8_percent_encode(url, NEW_TAB_QUERY))
}

/// Accepts `host:port`, `http://host:port/` or a bare port number.
fn normalize_endpoint(endpoint: &str) -> GridLensResult<String> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(GridLensError::Config("DevTools endpoint is empty".into()));
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Ok(format!("http://127.0.0.1:{trimmed}"));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Ok(trimmed.to_string());
    }
    if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        return Err(GridLensError::Config(format!(
            "expected the HTTP DevTools endpoint, got websocket url {trimmed}"
        )));
    }
    Ok(format!("http://{trimmed}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_forms_normalize() {
        assert_eq!(normalize_endpoint("9222").unwrap(), "http://127.0.0.1:9222");
        assert_eq!(normalize_endpoint("localhost:9333/").unwrap(), "http://localhost:9333");
        assert_eq!(normalize_endpoint("http://10.0.0.2:9222/").unwrap(), "http://10.0.0.2:9222");
        assert!(normalize_endpoint("  ").is_err());
        assert!(normalize_endpoint("ws://127.0.0.1:9222/devtools/browser/x").is_err());
    }

    /// Answers one request with `body` and yields the request line it received.
    async fn serve_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            let head = String::from_utf8_lossy(&head).into_owned();
            head.lines().next().unwrap_or_default().to_string()
        });
        (base, handle)
    }

    #[test]
    fn new_tab_query_is_the_raw_url() {
        assert_eq!(
            new_tab_url("http://h:1", "https://example.com/a?b=1&c=2"),
            "http://h:1/json/new?https://example.com/a?b=1&c=2"
        );
        assert_eq!(
            new_tab_url("http://h:1", "https://x.test/a b#top?q=100%"),
            "http://h:1/json/new?https://x.test/a%20b%23top?q=100%25"
        );
    }

    #[tokio::test]
    async fn new_tab_puts_url_as_query() {
        let (base, server) =
            serve_once(r#"{"id":"T9","title":"","url":"https://example.com/a?b=1","type":"page"}"#).await;
        let ep = DevToolsEndpoint::new(&base).unwrap();
        let tab = ep.new_tab("https://example.com/a?b=1").await.unwrap();
        assert_eq!(tab.id, "T9");
        assert_eq!(server.await.unwrap(), "PUT /json/new?https://example.com/a?b=1 HTTP/1.1");
    }

    #[tokio::test]
    async fn list_tabs_keeps_only_pages() {
        let (base, server) = serve_once(
            r#"[
            {"id":"A1","title":"Shop","url":"https://shop.test/","type":"page","webSocketDebuggerUrl":"ws://x"},
            {"id":"W1","title":"sw","url":"https://shop.test/sw.js","type":"service_worker"},
            {"id":"B2","url":"about:blank","type":"page"}
        ]"#,
        )
        .await;
        let ep = DevToolsEndpoint::new(&base).unwrap();
        let tabs = ep.list_tabs().await.unwrap();
        assert_eq!(tabs.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), ["A1", "B2"]);
        assert_eq!(tabs[1].title, "");
        assert_eq!(server.await.unwrap(), "GET /json/list HTTP/1.1");
    }

    #[tokio::test]
    async fn version_reads_websocket_url() {
        let (base, server) = serve_once(
            r#"{"Browser":"Chrome/126.0","Protocol-Version":"1.3","webSocketDebuggerUrl":"ws://127.0.0.1:9222/devtools/browser/abc"}"#,
        )
        .await;
        let ep = DevToolsEndpoint::new(&base).unwrap();
        let info = ep.version().await.unwrap();
        assert_eq!(info.browser, "Chrome/126.0");
        assert_eq!(info.web_socket_debugger_url, "ws://127.0.0.1:9222/devtools/browser/abc");
        assert_eq!(server.await.unwrap(), "GET /json/version HTTP/1.1");
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_budget() {
        // Port 9 (discard) is closed on test hosts; connection is refused quickly.
        let ep = DevToolsEndpoint::new("http://127.0.0.1:9").unwrap();
        let err = ep.wait_until_reachable(Duration::from_millis(300)).await.unwrap_err();
        match err {
            GridLensError::ConnectionUnreachable { endpoint, .. } => {
                assert_eq!(endpoint, "http://127.0.0.1:9")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
