//! IMAP implementation of [`MailboxTransport`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use async_imap::types::{Fetch, Flag};
use async_imap::{Client, Session};
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use futures_util::io::{AsyncRead, AsyncWrite};
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use super::headers::{collect_digest_inputs, HeaderResponse, HEADER_FIELDS};
use super::{DateWindow, MailboxStatus, MailboxTransport, TransportError, TransportResult};
use crate::config::ImapConfig;
use crate::fingerprint::HeaderDigestInput;
use crate::secrets::{resolve_password, SecretError};

/// Byte stream an IMAP session runs over (plain TCP or TLS).
pub trait SessionStream: AsyncRead + AsyncWrite + Unpin + Send + Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Debug> SessionStream for T {}

type ImapSession = Session<Box<dyn SessionStream>>;

type AsyncTcpStream = async_io::Async<TcpStream>;

/// Errors raised while establishing an IMAP session.
#[derive(Error, Debug)]
pub enum ImapError {
    #[error("Failed to resolve '{0}'")]
    Resolve(String),

    #[error("IMAP connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Failed to read server greeting: {0}")]
    Greeting(String),

    #[error("STARTTLS failed: {0}")]
    StartTls(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Credentials not available: {0}")]
    Credentials(#[from] SecretError),

    #[error("Timed out after {0:?} while connecting")]
    Timeout(Duration),
}

impl ImapError {
    /// Bad credentials and missing secrets will not fix themselves on retry.
    fn is_permanent(&self) -> bool {
        matches!(
            self,
            ImapError::Authentication(_) | ImapError::Credentials(_) | ImapError::Resolve(_)
        )
    }
}

impl From<async_native_tls::Error> for ImapError {
    fn from(err: async_native_tls::Error) -> Self {
        ImapError::Tls(err.to_string())
    }
}

impl From<ImapError> for TransportError {
    fn from(err: ImapError) -> Self {
        if err.is_permanent() {
            TransportError::Fatal(err.to_string())
        } else {
            TransportError::Failure(err.to_string())
        }
    }
}

/// Maps a command error onto the recoverable/fatal split.
///
/// Only a lost connection is worth a reconnect; NO and BAD responses or
/// unparsable data would repeat on a fresh session.
fn classify(command: &str, err: async_imap::error::Error) -> TransportError {
    use async_imap::error::Error;

    match err {
        Error::Io(e) => TransportError::Failure(format!("{} failed: {}", command, e)),
        Error::ConnectionLost => {
            TransportError::Failure(format!("{} failed: connection lost", command))
        }
        other => TransportError::Fatal(format!("{} failed: {}", command, other)),
    }
}

async fn with_timeout<T, F>(timeout: Duration, command: &str, fut: F) -> TransportResult<T>
where
    F: Future<Output = async_imap::error::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(classify(command, e)),
        Err(_) => Err(TransportError::Failure(format!(
            "{} timed out after {:?}",
            command, timeout
        ))),
    }
}

/// Renders UIDs as a compact IMAP sequence set, e.g. `1:3,7,9:10`.
pub fn format_uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts: Vec<String> = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(mut start) = iter.next() else {
        return String::new();
    };
    let mut end = start;

    for uid in iter {
        if uid == end + 1 {
            end = uid;
            continue;
        }
        parts.push(format_range(start, end));
        start = uid;
        end = uid;
    }
    parts.push(format_range(start, end));
    parts.join(",")
}

fn format_range(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}:{}", start, end)
    }
}

/// Builds the UID SEARCH criteria for a date window.
pub fn search_query(window: &DateWindow) -> String {
    let mut query = String::from("ALL");
    if let Some(since) = window.since {
        query.push_str(&format!(" SINCE {}", since.format("%d-%b-%Y")));
    }
    if let Some(before) = window.before {
        query.push_str(&format!(" BEFORE {}", before.format("%d-%b-%Y")));
    }
    query
}

fn header_fetch_query() -> String {
    format!(
        "(UID RFC822.SIZE BODY.PEEK[HEADER.FIELDS ({})])",
        HEADER_FIELDS.join(" ")
    )
}

/// An authenticated IMAP connection with one mailbox selected read-write.
pub struct ImapTransport {
    config: ImapConfig,
    password: SecretString,
    session: Option<ImapSession>,
    timeout: Duration,
}

impl ImapTransport {
    /// Resolves credentials, connects and logs in.
    pub async fn connect(config: ImapConfig) -> Result<Self, ImapError> {
        if config.auth.password_insecure.is_some() {
            warn!(
                "Using direct password value (passwordInsecure) is not recommended. \
                 Consider using passwordEnvVar or passwordFile instead."
            );
        }
        let password = resolve_password(&config.auth)?;
        let timeout = Duration::from_secs(config.timeout_secs);

        let session = open_session(&config, &password, timeout).await?;
        info!("Successfully authenticated to IMAP server {}", config.host);

        Ok(Self {
            config,
            password,
            session: Some(session),
            timeout,
        })
    }

    /// Logs out from the IMAP server.
    pub async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            info!("Disconnecting from IMAP server");
            if let Err(e) = session.logout().await {
                debug!("Logout failed: {}", e);
            }
        }
    }

    fn session(&mut self) -> TransportResult<&mut ImapSession> {
        self.session
            .as_mut()
            .ok_or_else(|| TransportError::Failure("not connected".to_string()))
    }
}

#[async_trait]
impl MailboxTransport for ImapTransport {
    async fn select(&mut self, mailbox: &str) -> TransportResult<MailboxStatus> {
        let timeout = self.timeout;
        let session = self.session()?;

        info!("Selecting mailbox: {}", mailbox);
        let selected = with_timeout(timeout, "SELECT", session.select(mailbox)).await?;

        let uidvalidity = selected.uid_validity.ok_or_else(|| {
            TransportError::Fatal(format!(
                "server did not provide UIDVALIDITY for '{}'",
                mailbox
            ))
        })?;

        debug!(
            "Mailbox '{}' opened with UIDVALIDITY={} EXISTS={}",
            mailbox, uidvalidity, selected.exists
        );

        Ok(MailboxStatus {
            uidvalidity,
            exists: selected.exists,
        })
    }

    async fn search(&mut self, window: &DateWindow) -> TransportResult<Vec<u32>> {
        let timeout = self.timeout;
        let session = self.session()?;

        let query = search_query(window);
        debug!("Searching with query: {}", query);

        let uids = with_timeout(timeout, "UID SEARCH", session.uid_search(&query)).await?;
        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();

        debug!("Found {} messages matching search", uid_list.len());
        Ok(uid_list)
    }

    async fn fetch_headers(
        &mut self,
        uids: &[u32],
    ) -> TransportResult<HashMap<u32, HeaderDigestInput>> {
        if uids.is_empty() {
            return Ok(HashMap::new());
        }

        let timeout = self.timeout;
        let session = self.session()?;
        let uid_set = format_uid_set(uids);
        let query = header_fetch_query();

        debug!("Fetching headers for {} messages", uids.len());
        let fetches: Vec<Fetch> = with_timeout(timeout, "UID FETCH", async {
            let stream = session.uid_fetch(&uid_set, &query).await?;
            stream.try_collect::<Vec<Fetch>>().await
        })
        .await?;

        let inputs = collect_digest_inputs(fetches.iter().map(|fetch| HeaderResponse {
            uid: fetch.uid,
            size: fetch.size,
            header: fetch.header(),
        }));

        debug!("Fetched headers for {} of {} messages", inputs.len(), uids.len());
        Ok(inputs)
    }

    async fn mark_deleted(&mut self, uids: &[u32]) -> TransportResult<()> {
        if uids.is_empty() {
            return Ok(());
        }

        let timeout = self.timeout;
        let session = self.session()?;
        let uid_set = format_uid_set(uids);

        debug!("Flagging {} messages as deleted", uids.len());
        with_timeout(timeout, "UID STORE", async {
            let stream = session
                .uid_store(&uid_set, "+FLAGS.SILENT (\\Deleted)")
                .await?;
            stream.try_collect::<Vec<Fetch>>().await
        })
        .await?;
        Ok(())
    }

    async fn query_unmarked(&mut self, uids: &[u32]) -> TransportResult<Vec<u32>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let timeout = self.timeout;
        let session = self.session()?;
        let uid_set = format_uid_set(uids);

        let fetches: Vec<Fetch> = with_timeout(timeout, "UID FETCH FLAGS", async {
            let stream = session.uid_fetch(&uid_set, "(UID FLAGS)").await?;
            stream.try_collect::<Vec<Fetch>>().await
        })
        .await?;

        let mut unmarked: Vec<u32> = fetches
            .iter()
            .filter(|fetch| !fetch.flags().any(|flag| matches!(flag, Flag::Deleted)))
            .filter_map(|fetch| fetch.uid)
            .collect();
        unmarked.sort_unstable();
        Ok(unmarked)
    }

    async fn purge(&mut self) -> TransportResult<()> {
        let timeout = self.timeout;
        let session = self.session()?;

        let expunged: Vec<u32> = with_timeout(timeout, "EXPUNGE", async {
            let stream = session.expunge().await?;
            stream.try_collect::<Vec<u32>>().await
        })
        .await?;

        debug!("Expunged {} messages", expunged.len());
        Ok(())
    }

    async fn reconnect_and_reselect(&mut self, mailbox: &str) -> TransportResult<MailboxStatus> {
        // The old connection is presumed dead; dropping it closes the socket.
        self.session = None;

        let attempts = self.config.reconnect_attempts.max(1);
        let mut backoff = Duration::from_millis(self.config.reconnect_backoff_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }

            info!(
                "Reconnecting to {} (attempt {}/{})",
                self.config.host, attempt, attempts
            );
            match open_session(&self.config, &self.password, self.timeout).await {
                Ok(session) => {
                    self.session = Some(session);
                    return self.select(mailbox).await;
                }
                Err(e) if e.is_permanent() => return Err(e.into()),
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(TransportError::Failure(format!(
            "reconnect failed after {} attempts: {}",
            attempts, last_error
        )))
    }
}

impl Drop for ImapTransport {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("ImapTransport dropped without explicit disconnect - session will be closed");
        }
    }
}

async fn open_session(
    config: &ImapConfig,
    password: &SecretString,
    timeout: Duration,
) -> Result<ImapSession, ImapError> {
    let addr = resolve_addr(&config.host, config.port)?;
    debug!("Attempting IMAP connection to {} ({})", config.host, addr);

    let client = match tokio::time::timeout(timeout, establish(config, addr, timeout)).await {
        Ok(client) => client?,
        Err(_) => return Err(ImapError::Timeout(timeout)),
    };

    match tokio::time::timeout(
        timeout,
        client.login(&config.username, password.expose_secret()),
    )
    .await
    {
        Ok(Ok(session)) => Ok(session),
        Ok(Err((e, _))) => Err(ImapError::Authentication(e.to_string())),
        Err(_) => Err(ImapError::Timeout(timeout)),
    }
}

async fn establish(
    config: &ImapConfig,
    addr: SocketAddr,
    timeout: Duration,
) -> Result<Client<Box<dyn SessionStream>>, ImapError> {
    let tcp_stream = connect_tcp(addr, timeout)?;

    match config.security {
        crate::config::Security::Tls => {
            let tls_stream = TlsConnector::new().connect(&config.host, tcp_stream).await?;
            let mut client = Client::new(Box::new(tls_stream) as Box<dyn SessionStream>);
            read_greeting(&mut client).await?;
            Ok(client)
        }
        crate::config::Security::StartTls => {
            let mut client = Client::new(tcp_stream);
            read_greeting(&mut client).await?;
            client
                .run_command_and_check_ok("STARTTLS", None)
                .await
                .map_err(|e| ImapError::StartTls(e.to_string()))?;

            let tcp_stream = client.into_inner();
            let tls_stream = TlsConnector::new().connect(&config.host, tcp_stream).await?;
            Ok(Client::new(Box::new(tls_stream) as Box<dyn SessionStream>))
        }
        crate::config::Security::Plain => {
            warn!("Connecting to {} without encryption", config.host);
            let mut client = Client::new(Box::new(tcp_stream) as Box<dyn SessionStream>);
            read_greeting(&mut client).await?;
            Ok(client)
        }
    }
}

async fn read_greeting<T: SessionStream>(client: &mut Client<T>) -> Result<(), ImapError> {
    let _greeting = client
        .read_response()
        .await
        .map_err(|e| ImapError::Greeting(e.to_string()))?
        .ok_or_else(|| ImapError::Greeting("connection closed".to_string()))?;
    Ok(())
}

fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, ImapError> {
    let address = format!("{}:{}", host, port);
    address
        .to_socket_addrs()
        .map_err(|e| ImapError::Connect {
            addr: address.clone(),
            source: e,
        })?
        .next()
        .ok_or(ImapError::Resolve(address))
}

fn connect_tcp(addr: SocketAddr, timeout: Duration) -> Result<AsyncTcpStream, ImapError> {
    let connect_err = |source| ImapError::Connect {
        addr: addr.to_string(),
        source,
    };

    let std_stream = TcpStream::connect_timeout(&addr, timeout).map_err(connect_err)?;
    std_stream.set_nonblocking(true).map_err(connect_err)?;
    async_io::Async::new(std_stream).map_err(connect_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_format_uid_set_compresses_runs() {
        assert_eq!(format_uid_set(&[]), "");
        assert_eq!(format_uid_set(&[7]), "7");
        assert_eq!(format_uid_set(&[1, 2, 3, 7, 9, 10]), "1:3,7,9:10");
        assert_eq!(format_uid_set(&[10, 9, 3, 1, 2, 2]), "1:3,9:10");
    }

    #[test]
    fn test_search_query() {
        assert_eq!(search_query(&DateWindow::default()), "ALL");
        assert_eq!(
            search_query(&DateWindow::new(Some(date("2024-01-05")), None)),
            "ALL SINCE 05-Jan-2024"
        );
        assert_eq!(
            search_query(&DateWindow::new(
                Some(date("2023-11-01")),
                Some(date("2024-02-29"))
            )),
            "ALL SINCE 01-Nov-2023 BEFORE 29-Feb-2024"
        );
    }

    #[test]
    fn test_header_fetch_query() {
        assert_eq!(
            header_fetch_query(),
            "(UID RFC822.SIZE BODY.PEEK[HEADER.FIELDS (MESSAGE-ID DATE FROM TO SUBJECT)])"
        );
    }

    #[test]
    fn test_command_error_classification() {
        let io = async_imap::error::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(classify("UID STORE", io).is_recoverable());
        assert!(classify("EXPUNGE", async_imap::error::Error::ConnectionLost).is_recoverable());

        let no = async_imap::error::Error::No("mailbox is read-only".to_string());
        assert!(!classify("UID STORE", no).is_recoverable());
    }

    #[test]
    fn test_bootstrap_error_classification() {
        let auth: TransportError = ImapError::Authentication("bad password".into()).into();
        assert!(!auth.is_recoverable());

        let timeout: TransportError = ImapError::Timeout(Duration::from_secs(1)).into();
        assert!(timeout.is_recoverable());
    }

    #[tokio::test]
    async fn test_connect_without_password_fails() {
        let config = ImapConfig {
            host: "imap.example.com".to_string(),
            port: 993,
            security: crate::config::Security::Tls,
            username: "test@example.com".to_string(),
            auth: crate::config::PasswordSource::default(),
            timeout_secs: 1,
            reconnect_attempts: 1,
            reconnect_backoff_ms: 0,
        };

        let result = ImapTransport::connect(config).await;
        assert!(matches!(result, Err(ImapError::Credentials(_))));
    }
}
