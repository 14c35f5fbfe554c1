//! IMAP connection lifecycle, §4.I.

use std::time::Duration;

use async_imap::types::Fetch;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::decode::{decode_quoted_printable_utf8, extract_mime_part, select_body};
use crate::error::{EmailError, Result};
use crate::types::{ConnectionConfig, IngestionItem, MoveResult, CONNECT_TIMEOUT_SECS, PROCESSED_FOLDER};

type ImapSession = async_imap::Session<async_native_tls::TlsStream<TcpStream>>;

async fn connect(config: &ConnectionConfig, access_token: Option<&str>) -> Result<ImapSession> {
    let deadline = Duration::from_secs(CONNECT_TIMEOUT_SECS);
    let addr = (config.imap_host.as_str(), config.imap_port);

    let tcp = timeout(deadline, TcpStream::connect(addr))
        .await
        .map_err(|_| EmailError::Timeout(deadline))?
        .map_err(|e| EmailError::Imap(e.to_string()))?;

    let tls = async_native_tls::TlsConnector::new();
    let tls_stream = timeout(deadline, tls.connect(&config.imap_host, tcp))
        .await
        .map_err(|_| EmailError::Timeout(deadline))?
        .map_err(|e| EmailError::Tls(e.to_string()))?;

    let client = async_imap::Client::new(tls_stream);

    let session = match access_token {
        Some(token) => {
            let auth = GmailOAuth2 {
                user: config.imap_user.clone(),
                access_token: token.to_string(),
            };
            timeout(deadline, client.authenticate("XOAUTH2", &auth))
                .await
                .map_err(|_| EmailError::Timeout(deadline))?
                .map_err(|(e, _)| EmailError::Imap(e.to_string()))?
        }
        None => {
            let password = config
                .imap_password
                .as_deref()
                .ok_or_else(|| EmailError::Config("imapPassword required without an access token".to_string()))?;
            timeout(deadline, client.login(&config.imap_user, password))
                .await
                .map_err(|_| EmailError::Timeout(deadline))?
                .map_err(|(e, _)| EmailError::Imap(e.to_string()))?
        }
    };

    Ok(session)
}

struct GmailOAuth2 {
    user: String,
    access_token: String,
}

impl async_imap::Authenticator for &GmailOAuth2 {
    type Response = String;

    fn process(&mut self, _: &[u8]) -> Self::Response {
        format!("user={}\x01auth=Bearer {}\x01\x01", self.user, self.access_token)
    }
}

/// Connects with a bounded timeout, opens the mailbox under a lock,
/// iterates `1:*` requesting envelope + source + flags + uid, skips
/// already-`\Seen` messages, and decodes the raw body (§4.I). A
/// non-existent folder yields an empty list, not an error.
#[instrument(skip(config, access_token))]
pub async fn fetch_emails(config: &ConnectionConfig, access_token: Option<&str>) -> Result<Vec<IngestionItem>> {
    let mut session = connect(config, access_token).await?;

    let mailbox = match session.select(&config.folder).await {
        Ok(mailbox) => mailbox,
        Err(async_imap::error::Error::No(_)) => {
            let _ = session.logout().await;
            return Ok(Vec::new());
        }
        Err(e) => return Err(EmailError::Imap(e.to_string())),
    };

    if mailbox.exists == 0 {
        let _ = session.logout().await;
        return Ok(Vec::new());
    }

    let sequence = format!("1:{}", mailbox.exists);
    let mut stream = session
        .fetch(&sequence, "(ENVELOPE BODY[] FLAGS UID)")
        .await
        .map_err(|e| EmailError::Imap(e.to_string()))?;

    let mut items = Vec::new();
    while let Some(fetch) = stream.next().await {
        let fetch = match fetch {
            Ok(fetch) => fetch,
            Err(e) => {
                warn!(error = %e, "skipping unreadable fetch response");
                continue;
            }
        };
        if is_seen(&fetch) {
            continue;
        }
        if let Some(item) = decode_item(&fetch, &config.folder) {
            items.push(item);
        }
    }

    drop(stream);
    let _ = session.logout().await;
    info!(count = items.len(), folder = %config.folder, "fetched unread messages");
    Ok(items)
}

fn is_seen(fetch: &Fetch) -> bool {
    fetch.flags().any(|f| matches!(f, async_imap::types::Flag::Seen))
}

fn decode_item(fetch: &Fetch, folder: &str) -> Option<IngestionItem> {
    let envelope = fetch.envelope()?;
    let uid = fetch.uid?;
    let raw = fetch.body().map(|b| String::from_utf8_lossy(b).into_owned()).unwrap_or_default();

    let message_id = envelope
        .message_id
        .as_ref()
        .map(|m| String::from_utf8_lossy(m).into_owned())
        .unwrap_or_else(|| format!("uid-{uid}@{folder}"));

    let subject = envelope
        .subject
        .as_ref()
        .map(|s| decode_quoted_printable_utf8(&String::from_utf8_lossy(s)))
        .unwrap_or_default();

    let (from, from_name) = envelope
        .from
        .as_ref()
        .and_then(|addrs| addrs.first())
        .map(|addr| {
            let mailbox = addr.mailbox.as_ref().map(|m| String::from_utf8_lossy(m).into_owned());
            let host = addr.host.as_ref().map(|h| String::from_utf8_lossy(h).into_owned());
            let from = match (mailbox, host) {
                (Some(m), Some(h)) => format!("{m}@{h}"),
                (Some(m), None) => m,
                _ => String::new(),
            };
            let name = addr.name.as_ref().map(|n| decode_quoted_printable_utf8(&String::from_utf8_lossy(n)));
            (from, name)
        })
        .unwrap_or_default();

    let received_date: DateTime<Utc> = envelope
        .date
        .as_ref()
        .and_then(|d| DateTime::parse_from_rfc2822(&String::from_utf8_lossy(d)).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let plain = extract_mime_part(&raw, "Content-Type: text/plain").map(|s| decode_quoted_printable_utf8(&s));
    let html = extract_mime_part(&raw, "Content-Type: text/html").map(|s| decode_quoted_printable_utf8(&s));
    let body = select_body(plain.as_deref(), html.as_deref());

    Some(IngestionItem {
        subject,
        body,
        from,
        from_name,
        received_date,
        message_id,
        uid,
        folder: folder.to_string(),
        gmail_message_id: None,
    })
}

/// Adds the `\Seen` flag to the given UIDs under a mailbox lock.
#[instrument(skip(config, access_token))]
pub async fn mark_as_read(config: &ConnectionConfig, access_token: Option<&str>, uids: &[u32]) -> Result<()> {
    if uids.is_empty() {
        return Ok(());
    }
    let mut session = connect(config, access_token).await?;
    session.select(&config.folder).await.map_err(|e| EmailError::Imap(e.to_string()))?;

    let uid_set = uids.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
    let mut stream = session
        .uid_store(&uid_set, "+FLAGS (\\Seen)")
        .await
        .map_err(|e| EmailError::Imap(e.to_string()))?;
    while stream.next().await.is_some() {}
    drop(stream);
    let _ = session.logout().await;
    Ok(())
}

/// Ensures the destination folder exists (creating it if absent), then
/// moves the given UIDs. Returns which UIDs moved and which failed.
#[instrument(skip(config, access_token))]
pub async fn move_to_processed(config: &ConnectionConfig, access_token: Option<&str>, uids: &[u32]) -> Result<MoveResult> {
    if uids.is_empty() {
        return Ok(MoveResult::default());
    }
    let mut session = connect(config, access_token).await?;
    session.select(&config.folder).await.map_err(|e| EmailError::Imap(e.to_string()))?;

    if session.create(PROCESSED_FOLDER).await.is_err() {
        // Already exists, or the server lazily creates on first append — either way, proceed.
    }

    let mut result = MoveResult::default();
    for &uid in uids {
        let uid_str = uid.to_string();
        match session.uid_mv(&uid_str, PROCESSED_FOLDER).await {
            Ok(_) => result.moved.push(uid),
            Err(e) => {
                warn!(uid, error = %e, "failed to move message to processed folder");
                result.failed.push(uid);
            }
        }
    }

    let _ = session.logout().await;
    Ok(result)
}
