//! Discovery of running server sockets.
//!
//! Servers bind `{dir}/{prefix}-{id}.sock` in the runtime directory. Given an
//! explicit pid the target path is computed directly; otherwise every
//! candidate socket matching the prefix is probed in turn, one connection at
//! a time, until one satisfies the filter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{IpcError, Result};
use crate::protocol::{wire, Message, Response};

/// Conditions a server must satisfy to be selected.
///
/// A set `pid` fully determines the socket path and short-circuits scanning
/// and probing. Username and server-address conditions are matched by probing
/// each candidate.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    /// Pid of the server process to target.
    pub pid: Option<u32>,
    /// Username the server must report for `get-username`.
    pub username: Option<String>,
    /// Address the server must report for `get-server-ip`.
    pub server_ip: Option<String>,
}

impl DiscoveryFilter {
    fn has_probe_conditions(&self) -> bool {
        self.username.is_some() || self.server_ip.is_some()
    }
}

/// Why a candidate was passed over during the scan.
#[derive(Debug)]
enum SkipReason {
    /// The socket file exists but the connection failed (stale file, server
    /// gone).
    Connect(std::io::Error),
    /// The candidate connected but a probe exchange failed.
    Probe(IpcError),
    /// The candidate did not answer within the probe timeout.
    Timeout,
}

/// Outcome of probing one candidate socket.
enum CandidateOutcome {
    Matched,
    NotMatched,
    Skipped(SkipReason),
}

/// Locates server sockets. All inputs are explicit so tests can inject a
/// scratch directory; nothing is read from the environment here.
#[derive(Debug, Clone)]
pub struct Discovery {
    dir: PathBuf,
    prefix: String,
    probe_timeout: Duration,
}

impl Discovery {
    /// Create a discovery instance over `dir` for sockets named
    /// `{prefix}-*.sock`.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            probe_timeout,
        }
    }

    /// Create a discovery instance from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.socket_dir(),
            config.socket.prefix.clone(),
            config.timeouts.probe(),
        )
    }

    /// Path of the socket bound by the server with this pid. Purely
    /// computed; whether anything listens there surfaces at connect time.
    pub fn socket_path_for_pid(&self, pid: u32) -> PathBuf {
        self.dir.join(format!("{}-{}.sock", self.prefix, pid))
    }

    /// Resolve the filter to a socket path, or `None` when no running server
    /// matches. Candidates are enumerated fresh on every call and probed
    /// strictly one at a time; each probe connection is closed before the
    /// next candidate is tried. `None` is an expected outcome, not an error.
    pub async fn resolve(&self, filter: &DiscoveryFilter) -> Result<Option<PathBuf>> {
        if let Some(pid) = filter.pid {
            return Ok(Some(self.socket_path_for_pid(pid)));
        }

        let pattern = format!("{}/{}-*.sock", self.dir.display(), self.prefix);
        let candidates = glob::glob(&pattern).map_err(|e| {
            IpcError::Transport(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        for entry in candidates {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    debug!("skipping unreadable candidate: {err}");
                    continue;
                }
            };
            match self.probe_candidate(&path, filter).await {
                CandidateOutcome::Matched => {
                    info!("matched server socket {}", path.display());
                    return Ok(Some(path));
                }
                CandidateOutcome::NotMatched => {
                    debug!("candidate {} does not match", path.display());
                }
                CandidateOutcome::Skipped(reason) => {
                    debug!("skipping candidate {}: {reason:?}", path.display());
                }
            }
        }
        Ok(None)
    }

    /// Probe one candidate. The connection is owned by this call and dropped
    /// before returning, so the next candidate always starts from a fresh
    /// socket.
    async fn probe_candidate(&self, path: &Path, filter: &DiscoveryFilter) -> CandidateOutcome {
        let mut stream =
            match tokio::time::timeout(self.probe_timeout, UnixStream::connect(path)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => return CandidateOutcome::Skipped(SkipReason::Connect(err)),
                Err(_) => return CandidateOutcome::Skipped(SkipReason::Timeout),
            };

        if !filter.has_probe_conditions() {
            return match self.probe(&mut stream, "ping").await {
                Ok(response) if response.success => CandidateOutcome::Matched,
                Ok(_) => CandidateOutcome::NotMatched,
                Err(err) => CandidateOutcome::Skipped(SkipReason::Probe(err)),
            };
        }

        // Both probes ride the same connection, strict request-then-response.
        let username_response = match self.probe(&mut stream, "get-username").await {
            Ok(response) => response,
            Err(err) => return CandidateOutcome::Skipped(SkipReason::Probe(err)),
        };
        let ip_response = match self.probe(&mut stream, "get-server-ip").await {
            Ok(response) => response,
            Err(err) => return CandidateOutcome::Skipped(SkipReason::Probe(err)),
        };

        let username_matched = condition_matches(filter.username.as_deref(), &username_response);
        let ip_matched = condition_matches(filter.server_ip.as_deref(), &ip_response);
        if username_matched && ip_matched {
            CandidateOutcome::Matched
        } else {
            CandidateOutcome::NotMatched
        }
    }

    /// One request/response probe exchange, bounded by the probe timeout.
    async fn probe(&self, stream: &mut UnixStream, command: &str) -> Result<Response> {
        let exchange = async {
            wire::write_message(&mut *stream, &Message::new([command])).await?;
            wire::read_response(&mut *stream).await
        };
        match tokio::time::timeout(self.probe_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(IpcError::Transport(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "probe timed out",
            ))),
        }
    }
}

/// A condition matches when it was not supplied, or when the probe succeeded
/// and its text equals the supplied value exactly.
fn condition_matches(wanted: Option<&str>, response: &Response) -> bool {
    match wanted {
        None => true,
        Some(value) => response.success && response.text == value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    const PREFIX: &str = "ipcmsg";

    fn probe_timeout() -> Duration {
        Duration::from_millis(500)
    }

    /// A scratch server answering the reserved probe commands.
    fn spawn_server(path: &Path, username: &str, server_ip: Option<&str>, ping_ok: bool) {
        let listener = UnixListener::bind(path).unwrap();
        let username = username.to_string();
        let server_ip = server_ip.map(str::to_string);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let username = username.clone();
                let server_ip = server_ip.clone();
                tokio::spawn(async move {
                    loop {
                        let message = match wire::read_message(&mut stream).await {
                            Ok(message) => message,
                            Err(_) => break,
                        };
                        let response = match message.args.first().map(String::as_str) {
                            Some("ping") if ping_ok => Response::success("pong"),
                            Some("ping") => Response::failure("not ready"),
                            Some("get-username") => Response::success(username.clone()),
                            Some("get-server-ip") => match &server_ip {
                                Some(ip) => Response::success(ip.clone()),
                                None => Response::failure("not connected to server"),
                            },
                            _ => Response::failure("unknown command"),
                        };
                        if wire::write_response(&mut stream, &response).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
    }

    #[test]
    fn test_pid_path_is_deterministic() {
        let discovery = Discovery::new("/run/user/1000", PREFIX, probe_timeout());
        assert_eq!(
            discovery.socket_path_for_pid(1234),
            PathBuf::from("/run/user/1000/ipcmsg-1234.sock")
        );
    }

    #[tokio::test]
    async fn test_pid_filter_skips_scanning() {
        // The directory does not even exist; the path is still resolved.
        let discovery = Discovery::new("/nonexistent/dir", PREFIX, probe_timeout());
        let filter = DiscoveryFilter {
            pid: Some(42),
            ..Default::default()
        };
        let path = discovery.resolve(&filter).await.unwrap();
        assert_eq!(path, Some(PathBuf::from("/nonexistent/dir/ipcmsg-42.sock")));
    }

    #[tokio::test]
    async fn test_empty_directory_is_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = Discovery::new(dir.path(), PREFIX, probe_timeout());
        let found = discovery.resolve(&DiscoveryFilter::default()).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_unfiltered_scan_selects_ping_success() {
        let dir = tempfile::tempdir().unwrap();
        // Sorts before the healthy candidate and fails ping.
        spawn_server(&dir.path().join("ipcmsg-a.sock"), "alice", None, false);
        let good = dir.path().join("ipcmsg-b.sock");
        spawn_server(&good, "bob", None, true);

        let discovery = Discovery::new(dir.path(), PREFIX, probe_timeout());
        let found = discovery.resolve(&DiscoveryFilter::default()).await.unwrap();
        assert_eq!(found, Some(good));
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("ipcmsg-a.sock");
        // Bind and immediately drop: the file stays behind with nothing
        // accepting on it.
        drop(UnixListener::bind(&stale).unwrap());
        let good = dir.path().join("ipcmsg-b.sock");
        spawn_server(&good, "alice", None, true);

        let discovery = Discovery::new(dir.path(), PREFIX, probe_timeout());
        let found = discovery.resolve(&DiscoveryFilter::default()).await.unwrap();
        assert_eq!(found, Some(good));
    }

    #[tokio::test]
    async fn test_username_filter_selects_matching_candidate() {
        let dir = tempfile::tempdir().unwrap();
        spawn_server(&dir.path().join("ipcmsg-1.sock"), "alice", None, true);
        let bob = dir.path().join("ipcmsg-2.sock");
        spawn_server(&bob, "bob", None, true);
        spawn_server(&dir.path().join("ipcmsg-3.sock"), "carol", None, true);

        let discovery = Discovery::new(dir.path(), PREFIX, probe_timeout());
        let filter = DiscoveryFilter {
            username: Some("bob".into()),
            ..Default::default()
        };
        let found = discovery.resolve(&filter).await.unwrap();
        assert_eq!(found, Some(bob));
    }

    #[tokio::test]
    async fn test_username_and_ip_must_both_match() {
        let dir = tempfile::tempdir().unwrap();
        spawn_server(
            &dir.path().join("ipcmsg-1.sock"),
            "alice",
            Some("play.example.net"),
            true,
        );
        let wanted = dir.path().join("ipcmsg-2.sock");
        spawn_server(&wanted, "alice", Some("mc.example.org"), true);

        let discovery = Discovery::new(dir.path(), PREFIX, probe_timeout());
        let filter = DiscoveryFilter {
            username: Some("alice".into()),
            server_ip: Some("mc.example.org".into()),
            ..Default::default()
        };
        let found = discovery.resolve(&filter).await.unwrap();
        assert_eq!(found, Some(wanted));
    }

    #[tokio::test]
    async fn test_ip_condition_fails_when_probe_fails() {
        let dir = tempfile::tempdir().unwrap();
        // Reports no server address: get-server-ip answers success=false.
        spawn_server(&dir.path().join("ipcmsg-1.sock"), "alice", None, true);

        let discovery = Discovery::new(dir.path(), PREFIX, probe_timeout());
        let filter = DiscoveryFilter {
            server_ip: Some("mc.example.org".into()),
            ..Default::default()
        };
        let found = discovery.resolve(&filter).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_no_candidate_matches_is_no_match() {
        let dir = tempfile::tempdir().unwrap();
        spawn_server(&dir.path().join("ipcmsg-1.sock"), "alice", None, true);

        let discovery = Discovery::new(dir.path(), PREFIX, probe_timeout());
        let filter = DiscoveryFilter {
            username: Some("nobody".into()),
            ..Default::default()
        };
        let found = discovery.resolve(&filter).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_mute_server_is_skipped_within_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mute = dir.path().join("ipcmsg-a.sock");
        // Accepts connections but never reads or answers.
        let listener = UnixListener::bind(&mute).unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let good = dir.path().join("ipcmsg-b.sock");
        spawn_server(&good, "alice", None, true);

        let discovery = Discovery::new(dir.path(), PREFIX, Duration::from_millis(200));
        let found = discovery.resolve(&DiscoveryFilter::default()).await.unwrap();
        assert_eq!(found, Some(good));
    }

    #[tokio::test]
    async fn test_foreign_prefix_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        spawn_server(&dir.path().join("othersvc-1.sock"), "alice", None, true);

        let discovery = Discovery::new(dir.path(), PREFIX, probe_timeout());
        let found = discovery.resolve(&DiscoveryFilter::default()).await.unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_condition_matches() {
        let ok = Response::success("alice");
        let failed = Response::failure("alice");
        assert!(condition_matches(None, &failed));
        assert!(condition_matches(Some("alice"), &ok));
        assert!(!condition_matches(Some("alice"), &failed));
        assert!(!condition_matches(Some("Alice"), &ok));
    }
}
