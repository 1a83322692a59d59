use std::io::{Read, Write};
use std::net::TcpStream;

use imap::types::NameAttribute;
use imap::{Client, Session};
use native_tls::TlsConnector;
use thiserror::Error;

use crate::config::ImapSecurity;
use crate::timestamps::date_from_header;

/// Fetch only the Date field, without setting \Seen.
const DATE_QUERY: &str = "BODY.PEEK[HEADER.FIELDS (DATE)]";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("IMAP error: {0}")]
    ImapError(#[from] imap::error::Error),

    #[error("Login failed: {0}")]
    LoginError(imap::error::Error),

    #[error("TLS error: {0}")]
    TlsError(#[from] native_tls::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Where and as whom to connect. The password is passed separately so it
/// never lands in a struct that might get logged or serialized.
#[derive(Debug, Clone)]
pub struct ImapAccount {
    pub host: String,
    pub port: u16,
    pub security: ImapSecurity,
    pub username: String,
}

/// Mailbox message counts and the Date values gathered so far.
#[derive(Debug, Default)]
pub struct Harvest {
    pub dates: Vec<String>,
    pub mailboxes: Vec<(String, usize)>,
}

impl Harvest {
    pub fn total(&self) -> usize {
        self.mailboxes.iter().map(|(_, count)| count).sum()
    }
}

/// Collect the Date header of every message in `folder` and the mailboxes
/// below it.
///
/// Never fails: any error is logged and whatever was gathered before it is
/// returned.
pub fn fetch_dates(account: &ImapAccount, password: &str, folder: &str) -> Vec<String> {
    let mut harvest = Harvest::default();
    log::info!(
        "Connecting to {}:{} ({})",
        account.host,
        account.port,
        account.security
    );

    let result = match account.security {
        ImapSecurity::SSL => connect_ssl(account)
            .and_then(|client| harvest_session(client, &account.username, password, folder, &mut harvest)),
        ImapSecurity::StartTLS => connect_starttls(account)
            .and_then(|client| harvest_session(client, &account.username, password, folder, &mut harvest)),
        ImapSecurity::None => connect_plain(account)
            .and_then(|client| harvest_session(client, &account.username, password, folder, &mut harvest)),
    };

    if let Err(e) = result {
        log::error!("{}", failure_message(&e));
        if !harvest.dates.is_empty() {
            log::warn!("Keeping {} dates gathered before the error", harvest.dates.len());
        }
    }

    println!("{:<30} : {:>6}", "TOTAL", harvest.total());
    harvest.dates
}

/// The error text plus its variant and cause, as logged by [`fetch_dates`].
fn failure_message(e: &FetchError) -> String {
    format!("Unexpected error: {} ({:?})", e, e)
}

fn connect_ssl(account: &ImapAccount) -> Result<Client<native_tls::TlsStream<TcpStream>>, FetchError> {
    let tls = TlsConnector::builder().build()?;
    let client = imap::connect((account.host.as_str(), account.port), &account.host, &tls)?;
    Ok(client)
}

fn connect_starttls(account: &ImapAccount) -> Result<Client<native_tls::TlsStream<TcpStream>>, FetchError> {
    let tls = TlsConnector::builder().build()?;
    let client = imap::connect_starttls((account.host.as_str(), account.port), &account.host, &tls)?;
    Ok(client)
}

fn connect_plain(account: &ImapAccount) -> Result<Client<TcpStream>, FetchError> {
    log::warn!("Connecting without TLS, the password is sent in clear text");
    let tcp_stream = TcpStream::connect((account.host.as_str(), account.port))?;
    let mut client = imap::Client::new(tcp_stream);
    client.read_greeting()?;
    Ok(client)
}

/// Log in, walk the mailboxes, and log out again whether or not the walk
/// succeeded.
pub fn harvest_session<T: Read + Write>(
    client: Client<T>,
    username: &str,
    password: &str,
    folder: &str,
    harvest: &mut Harvest,
) -> Result<(), FetchError> {
    let mut session = client
        .login(username, password)
        .map_err(|(e, _client)| FetchError::LoginError(e))?;
    log::debug!("Logged in as {}", username);

    let result = collect_dates(&mut session, folder, harvest);

    if let Err(e) = session.logout() {
        log::warn!("Logout failed: {}", e);
    }
    result
}

fn collect_dates<T: Read + Write>(
    session: &mut Session<T>,
    folder: &str,
    harvest: &mut Harvest,
) -> Result<(), FetchError> {
    let names = session.list(Some(folder), Some("*"))?;
    let mailboxes: Vec<String> = names
        .iter()
        .filter(|name| {
            !name
                .attributes()
                .iter()
                .any(|attr| matches!(attr, NameAttribute::NoSelect))
        })
        .map(|name| name.name().to_string())
        .collect();

    if mailboxes.is_empty() {
        log::warn!("No selectable mailboxes under {:?}", folder);
    }

    for mailbox in mailboxes {
        // read-only, so nothing on the server changes
        session.examine(&mailbox)?;

        let mut numbers: Vec<u32> = session.search("ALL")?.into_iter().collect();
        numbers.sort_unstable();

        if numbers.is_empty() {
            log::debug!("{}: empty, skipped", mailbox);
            continue;
        }

        let fetches = session.fetch(sequence_set(&numbers), DATE_QUERY)?;
        for message in fetches.iter() {
            match message
                .header()
                .or_else(|| message.body())
                .and_then(date_from_header)
            {
                Some(date) => harvest.dates.push(date),
                None => log::debug!("{}: message {} has no Date header", mailbox, message.message),
            }
        }

        println!("{:<30} : {:>6}", mailbox, numbers.len());
        harvest.mailboxes.push((mailbox, numbers.len()));
    }

    Ok(())
}

/// Compress sorted message numbers into an IMAP sequence set such as `1:3,7,9:10`.
pub fn sequence_set(numbers: &[u32]) -> String {
    let mut parts = Vec::new();
    let mut iter = numbers.iter().copied().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(next) = end.checked_add(1).filter(|n| iter.peek() == Some(n)) {
            end = next;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}:{}", start, end));
        }
    }

    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Replays canned server output; whatever the client sends is dropped.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
    }

    impl ScriptedStream {
        fn new(script: String) -> Self {
            Self {
                input: Cursor::new(script.into_bytes()),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn fetch_line(seq: u32, date: &str) -> String {
        let header = format!("Date: {}\r\n\r\n", date);
        format!(
            "* {} FETCH (BODY[HEADER.FIELDS (DATE)] {{{}}}\r\n{})\r\n",
            seq,
            header.len(),
            header
        )
    }

    #[test]
    fn test_sequence_set() {
        assert_eq!(sequence_set(&[]), "");
        assert_eq!(sequence_set(&[4]), "4");
        assert_eq!(sequence_set(&[1, 2, 3]), "1:3");
        assert_eq!(sequence_set(&[1, 2, 3, 7, 9, 10]), "1:3,7,9:10");
    }

    #[test]
    fn test_sequence_set_at_u32_max() {
        assert_eq!(sequence_set(&[u32::MAX]), "4294967295");
        assert_eq!(sequence_set(&[u32::MAX - 1, u32::MAX]), "4294967294:4294967295");
        assert_eq!(sequence_set(&[1, u32::MAX]), "1,4294967295");
    }

    #[test]
    fn test_failure_message_names_variant() {
        let e = FetchError::LoginError(imap::error::Error::No("Invalid credentials".to_string()));
        let message = failure_message(&e);

        assert!(message.starts_with("Unexpected error: Login failed"));
        assert!(message.contains("LoginError(No(\"Invalid credentials\"))"));
    }

    #[test]
    fn test_harvest_collects_dates() {
        let mut script = String::new();
        script.push_str("a1 OK Logged in\r\n");
        script.push_str("* LIST (\\HasNoChildren) \"/\" \"Archive\"\r\n");
        script.push_str("* LIST (\\Noselect \\HasChildren) \"/\" \"Archive/Old\"\r\n");
        script.push_str("a2 OK LIST completed\r\n");
        script.push_str("* 2 EXISTS\r\na3 OK [READ-ONLY] EXAMINE completed\r\n");
        script.push_str("* SEARCH 1 2\r\na4 OK SEARCH completed\r\n");
        script.push_str(&fetch_line(1, "Mon, 1 Jan 2024 09:15:00 +0000"));
        script.push_str(&fetch_line(2, "Tue, 2 Jan 2024 10:00:00 +0000"));
        script.push_str("a5 OK FETCH completed\r\n");
        script.push_str("* BYE\r\na6 OK LOGOUT completed\r\n");

        let client = Client::new(ScriptedStream::new(script));
        let mut harvest = Harvest::default();
        harvest_session(client, "me", "secret", "Archive", &mut harvest).unwrap();

        assert_eq!(
            harvest.dates,
            vec![
                "Mon, 1 Jan 2024 09:15:00 +0000".to_string(),
                "Tue, 2 Jan 2024 10:00:00 +0000".to_string(),
            ]
        );
        // the \Noselect parent is never examined
        assert_eq!(harvest.mailboxes, vec![("Archive".to_string(), 2)]);
        assert_eq!(harvest.total(), 2);
    }

    #[test]
    fn test_failure_keeps_partial_results() {
        let mut script = String::new();
        script.push_str("a1 OK Logged in\r\n");
        script.push_str("* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n");
        script.push_str("* LIST (\\HasNoChildren) \"/\" \"Gone\"\r\n");
        script.push_str("a2 OK LIST completed\r\n");
        script.push_str("* 1 EXISTS\r\na3 OK [READ-ONLY] EXAMINE completed\r\n");
        script.push_str("* SEARCH 1\r\na4 OK SEARCH completed\r\n");
        script.push_str(&fetch_line(1, "Wed, 3 Jan 2024 11:00:00 +0000"));
        script.push_str("a5 OK FETCH completed\r\n");
        script.push_str("a6 NO Mailbox does not exist\r\n");

        let client = Client::new(ScriptedStream::new(script));
        let mut harvest = Harvest::default();
        let result = harvest_session(client, "me", "secret", "", &mut harvest);

        assert!(result.is_err());
        assert_eq!(harvest.dates, vec!["Wed, 3 Jan 2024 11:00:00 +0000".to_string()]);
        assert_eq!(harvest.mailboxes, vec![("INBOX".to_string(), 1)]);
    }

    #[test]
    fn test_empty_mailbox_skips_fetch() {
        let mut script = String::new();
        script.push_str("a1 OK Logged in\r\n");
        script.push_str("* LIST (\\HasNoChildren) \"/\" \"Empty\"\r\n");
        script.push_str("a2 OK LIST completed\r\n");
        script.push_str("* 0 EXISTS\r\na3 OK [READ-ONLY] EXAMINE completed\r\n");
        script.push_str("a4 OK SEARCH completed\r\n");
        script.push_str("a5 OK LOGOUT completed\r\n");

        let client = Client::new(ScriptedStream::new(script));
        let mut harvest = Harvest::default();
        harvest_session(client, "me", "secret", "Empty", &mut harvest).unwrap();

        assert!(harvest.dates.is_empty());
        // empty mailboxes are left out of the report
        assert!(harvest.mailboxes.is_empty());
        assert_eq!(harvest.total(), 0);
    }

    #[test]
    fn test_rejected_login() {
        let script = "a1 NO Invalid credentials\r\n".to_string();
        let client = Client::new(ScriptedStream::new(script));
        let mut harvest = Harvest::default();

        let result = harvest_session(client, "me", "wrong", "", &mut harvest);
        assert!(matches!(result, Err(FetchError::LoginError(_))));
        assert!(harvest.dates.is_empty());
    }
}
