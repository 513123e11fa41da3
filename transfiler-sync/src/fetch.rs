//! Fetch capability — `fetch(url, timeout) -> bytes | error`.
//!
//! The reconciler only sees the [`Fetch`] trait. [`HttpFetcher`] is the
//! production implementation on top of a blocking `ureq` agent.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use transfiler_core::{ManifestEntry, TlsPolicy};

use crate::error::{FetchError, SyncError};

/// Retrieve the bytes behind a URL within a bounded time.
pub trait Fetch {
    /// `limit` caps the accepted body length; longer bodies fail with
    /// [`FetchError::TooLarge`].
    fn fetch(&self, url: &Url, timeout: Duration, limit: Option<u64>)
        -> Result<Vec<u8>, FetchError>;
}

impl<F: Fetch + ?Sized> Fetch for &F {
    fn fetch(&self, url: &Url, timeout: Duration, limit: Option<u64>) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(url, timeout, limit)
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Blocking HTTP(S) fetcher.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Build a fetcher. Certificates are verified unless `tls` explicitly
    /// opts out.
    pub fn new(tls: TlsPolicy) -> Result<Self, SyncError> {
        let builder = ureq::AgentBuilder::new().user_agent(concat!(
            "transfiler/",
            env!("CARGO_PKG_VERSION")
        ));
        let builder = match tls {
            TlsPolicy::Verify => builder,
            TlsPolicy::AcceptInvalidCerts => {
                tracing::warn!("TLS certificate verification is disabled for this run");
                let connector = native_tls::TlsConnector::builder()
                    .danger_accept_invalid_certs(true)
                    .danger_accept_invalid_hostnames(true)
                    .build()
                    .map_err(|e| SyncError::Tls(e.to_string()))?;
                builder.tls_connector(Arc::new(connector))
            }
        };
        Ok(Self {
            agent: builder.build(),
        })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url, timeout: Duration, limit: Option<u64>) -> Result<Vec<u8>, FetchError> {
        let response = match self.agent.get(url.as_str()).timeout(timeout).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    code,
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(if is_timeout(&transport) {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    FetchError::Transport {
                        url: url.to_string(),
                        message: transport.to_string(),
                    }
                });
            }
        };

        let mut body = Vec::new();
        let cap = limit.map_or(u64::MAX, |l| l.saturating_add(1));
        if let Err(err) = response.into_reader().take(cap).read_to_end(&mut body) {
            return Err(if is_timeout_io(&err) {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    message: err.to_string(),
                }
            });
        }
        if let Some(limit) = limit {
            if body.len() as u64 > limit {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit,
                });
            }
        }
        Ok(body)
    }
}

fn is_timeout_io(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if err
            .downcast_ref::<std::io::Error>()
            .is_some_and(is_timeout_io)
        {
            return true;
        }
        source = err.source();
    }
    transport.kind() == ureq::ErrorKind::Io && transport.to_string().contains("timed out")
}

// ---------------------------------------------------------------------------
// URL resolution
// ---------------------------------------------------------------------------

/// Parse and validate the remote base URL (absolute `http`/`https` with a host).
pub fn parse_base(remote_base: &str) -> Result<Url, SyncError> {
    let invalid = |reason: &str| SyncError::InvalidUrl {
        url: remote_base.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(remote_base.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("URL cannot be used as a base"));
    }
    Ok(url)
}

/// Append percent-encoded path segments to `base`, dropping its query and
/// fragment.
pub fn join_segments<'a>(
    base: &Url,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Url, SyncError> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut path = url.path_segments_mut().map_err(|_| SyncError::InvalidUrl {
            url: base.to_string(),
            reason: "URL cannot be used as a base".to_string(),
        })?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}

/// `<base>/<relative path segments>/<name>`
pub fn entry_url(base: &Url, entry: &ManifestEntry) -> Result<Url, SyncError> {
    join_segments(
        base,
        entry
            .segments()
            .into_iter()
            .chain(std::iter::once(entry.name.as_str())),
    )
}

/// `<base>/<manifest name>`; `name` may contain `/`.
pub fn manifest_url(base: &Url, name: &str) -> Result<Url, SyncError> {
    join_segments(base, name.split('/').filter(|s| !s.is_empty() && *s != "."))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn base_must_be_http_with_host() {
        assert!(parse_base("https://example.com/site/").is_ok());
        assert!(matches!(
            parse_base("ftp://example.com"),
            Err(SyncError::InvalidUrl { .. })
        ));
        assert!(matches!(parse_base("not a url"), Err(SyncError::InvalidUrl { .. })));
        let err = parse_base("file:///etc").unwrap_err();
        assert!(err.to_string().contains("file:///etc"));
    }

    #[test]
    fn entry_urls_encode_segments() {
        let base = parse_base("http://old.example/site/").unwrap();
        let entry = ManifestEntry::file("./wp content/uploads", "a b#1.jpg", 1);
        assert_eq!(
            entry_url(&base, &entry).unwrap().as_str(),
            "http://old.example/site/wp%20content/uploads/a%20b%231.jpg"
        );

        let root_child = ManifestEntry::file(".", "a.txt", 1);
        let bare = parse_base("http://old.example").unwrap();
        assert_eq!(
            entry_url(&bare, &root_child).unwrap().as_str(),
            "http://old.example/a.txt"
        );
    }

    #[test]
    fn manifest_url_drops_query() {
        let base = parse_base("http://old.example/dir?x=1").unwrap();
        assert_eq!(
            manifest_url(&base, "index_20250101.csv").unwrap().as_str(),
            "http://old.example/dir/index_20250101.csv"
        );
    }

    /// Serve exactly one connection with `response`, after an optional delay.
    fn serve_once(response: &'static [u8], delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).map(|n| n > 2).unwrap_or(false) {
                    line.clear();
                }
                thread::sleep(delay);
                let _ = stream.write_all(response);
            }
        });
        format!("http://{addr}/")
    }

    #[test]
    fn http_fetch_returns_body() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
            Duration::ZERO,
        );
        let fetcher = HttpFetcher::new(TlsPolicy::Verify).unwrap();
        let url = Url::parse(&base).unwrap();
        let body = fetcher.fetch(&url, Duration::from_secs(5), None).unwrap();
        assert_eq!(body, b"hello");
    }

    #[test]
    fn http_status_is_reported() {
        let base = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            Duration::ZERO,
        );
        let fetcher = HttpFetcher::new(TlsPolicy::Verify).unwrap();
        let err = fetcher
            .fetch(&Url::parse(&base).unwrap(), Duration::from_secs(5), None)
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { code: 404, .. }), "got: {err}");
    }

    #[test]
    fn http_body_over_limit_is_rejected() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
            Duration::ZERO,
        );
        let fetcher = HttpFetcher::new(TlsPolicy::Verify).unwrap();
        let err = fetcher
            .fetch(&Url::parse(&base).unwrap(), Duration::from_secs(5), Some(3))
            .unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 3, .. }), "got: {err}");
    }

    #[test]
    fn slow_server_times_out() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
            Duration::from_secs(3),
        );
        let fetcher = HttpFetcher::new(TlsPolicy::Verify).unwrap();
        let err = fetcher
            .fetch(&Url::parse(&base).unwrap(), Duration::from_millis(200), None)
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "got: {err}");
    }
}
