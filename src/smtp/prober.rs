//! The SMTP handshake prober.
//!
//! Per probe, each MX host is tried in priority order with the dialogue
//! CONNECT/EHLO -> MAIL FROM -> RCPT TO -> QUIT. The RCPT TO reply is the
//! only decisive signal; a refusal at any earlier stage is inconclusive
//! because the recipient was never presented. Servers that reject EHLO
//! outright get a plain HELO session instead. Connection-level failures
//! advance to the next host. A greylisted (450/451) recipient earns
//! exactly one bounded retry with jittered backoff before the probe
//! degrades to unreachable.

use crate::core::config::{get_random_backoff_duration, Config};
use crate::core::error::{AppError, Result};
use crate::core::models::{ProbeCode, ProbeOutcome};
use crate::smtp::MailboxProber;

use async_trait::async_trait;
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::{Mail, Rcpt};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::response::{Code, Response};
use lettre::Address;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const SMTP_PORT: u16 = 25;

/// Result of one full dialogue against one host.
#[derive(Debug)]
pub(crate) enum DialogueVerdict {
    Outcome(ProbeOutcome),
    /// The server refused the plaintext session and hinted at STARTTLS; the
    /// caller should redial the same host with TLS enabled.
    NeedsStarttls,
}

/// Seam between the host-walking state machine and the blocking wire
/// dialogue, so the walk and retry logic can be tested with scripts.
#[async_trait]
pub(crate) trait HostDialer: Send + Sync {
    async fn dial(&self, host: &str, recipient: &str, use_tls: bool) -> Result<DialogueVerdict>;
}

/// Production [`MailboxProber`] speaking SMTP over port 25.
pub struct SmtpProber {
    config: Arc<Config>,
    dialer: Arc<dyn HostDialer>,
}

impl SmtpProber {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let sender = Address::from_str(&config.smtp_sender_email).map_err(|e| {
            AppError::Config(format!(
                "Invalid sender email '{}' in config: {}",
                config.smtp_sender_email, e
            ))
        })?;
        let dialer = Arc::new(LettreDialer {
            config: Arc::clone(&config),
            sender,
        });
        Ok(Self { config, dialer })
    }

    #[cfg(test)]
    pub(crate) fn with_dialer(config: Arc<Config>, dialer: Arc<dyn HostDialer>) -> Self {
        Self { config, dialer }
    }

    fn is_blocked_provider(&self, domain: &str) -> bool {
        let domain = domain.to_ascii_lowercase();
        self.config
            .smtp_blocked_domains
            .iter()
            .any(|blocked| domain == *blocked || domain.ends_with(&format!(".{blocked}")))
    }

    /// Dials one host, transparently redialing with STARTTLS when the
    /// server demands it on the plaintext session.
    async fn dial_host(&self, host: &str, recipient: &str) -> Result<ProbeOutcome> {
        match self.dialer.dial(host, recipient, false).await? {
            DialogueVerdict::Outcome(outcome) => Ok(outcome),
            DialogueVerdict::NeedsStarttls => {
                tracing::info!(target: "smtp_task",
                    "Server {} appears to require STARTTLS, retrying connection with TLS enabled", host);
                match self.dialer.dial(host, recipient, true).await? {
                    DialogueVerdict::Outcome(outcome) => Ok(outcome),
                    DialogueVerdict::NeedsStarttls => Ok(ProbeOutcome::unreachable(
                        Some(host),
                        format!("{host} demanded STARTTLS on an already-encrypted session"),
                    )),
                }
            }
        }
    }
}

#[async_trait]
impl MailboxProber for SmtpProber {
    async fn probe(
        &self,
        local_part: &str,
        domain: &str,
        mx_hosts: &[String],
    ) -> Result<ProbeOutcome> {
        let recipient = format!("{local_part}@{domain}");

        if mx_hosts.is_empty() {
            return Ok(ProbeOutcome::unreachable(None, "no mail hosts to probe"));
        }
        if self.is_blocked_provider(domain) {
            tracing::debug!(target: "smtp_task",
                "Skipping SMTP dial for {}: provider is known to block verification probes", domain);
            return Ok(ProbeOutcome::new(
                ProbeCode::TempUnavailable,
                None,
                None,
                format!("{domain} blocks SMTP verification probes"),
            ));
        }

        let mut retries_left = self.config.max_verification_attempts.saturating_sub(1);
        let mut last = ProbeOutcome::unreachable(None, "all mail hosts exhausted without answer");

        for host in mx_hosts {
            let mut outcome = self.dial_host(host, &recipient).await?;

            while outcome.code == ProbeCode::Greylisted {
                if retries_left == 0 {
                    tracing::info!(target: "smtp_task",
                        "<{}> still greylisted by {} after retry; giving up", recipient, host);
                    return Ok(ProbeOutcome::new(
                        ProbeCode::Unreachable,
                        outcome.raw_response_code,
                        Some(host),
                        format!("still greylisted after retry: {}", outcome.detail),
                    ));
                }
                retries_left -= 1;
                let backoff = get_random_backoff_duration(&self.config);
                tracing::debug!(target: "smtp_task",
                    "<{}> greylisted by {}; retrying once after {:?}", recipient, host, backoff);
                tokio::time::sleep(backoff).await;
                outcome = self.dial_host(host, &recipient).await?;
            }

            match outcome.code {
                ProbeCode::Accepted | ProbeCode::Rejected => {
                    tracing::info!(target: "smtp_task",
                        "Decisive outcome for <{}> from {}: {:?}", recipient, host, outcome.code);
                    return Ok(outcome);
                }
                ProbeCode::TempUnavailable | ProbeCode::Unreachable => {
                    tracing::debug!(target: "smtp_task",
                        "Host {} gave no decisive answer for <{}> ({}); trying next host",
                        host, recipient, outcome.detail);
                    last = outcome;
                }
                ProbeCode::Greylisted => unreachable!("greylist handled above"),
            }
        }

        Ok(last)
    }
}

/// Maps an RCPT TO reply code onto the probe classification.
pub(crate) fn classify_rcpt_code(code: u16) -> ProbeCode {
    match code {
        250 | 251 => ProbeCode::Accepted,
        450 | 451 => ProbeCode::Greylisted,
        421 => ProbeCode::TempUnavailable,
        500..=599 => ProbeCode::Rejected,
        200..=299 => ProbeCode::Accepted,
        // Anything else (other 4xx, stray intermediates) is treated
        // conservatively as a transient non-answer, never as acceptance.
        _ => ProbeCode::TempUnavailable,
    }
}

/// Finds the first embedded three-digit SMTP reply code in an error string.
fn first_reply_code(text: &str) -> Option<u16> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start == 3 {
                if let Ok(code) = text[start..i].parse::<u16>() {
                    if (200..=599).contains(&code) {
                        return Some(code);
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Classifies a failure from the RCPT TO exchange. lettre surfaces every
/// non-positive reply as an error, so a permanent code at this stage is
/// the server refusing the mailbox itself.
fn rcpt_error_outcome(text: &str, host: &str) -> ProbeOutcome {
    match first_reply_code(text) {
        Some(code) => ProbeOutcome::new(
            classify_rcpt_code(code),
            Some(code),
            Some(host),
            format!("{host} answered {code}: {text}"),
        ),
        None => {
            ProbeOutcome::unreachable(Some(host), format!("SMTP transport error from {host}: {text}"))
        }
    }
}

/// Classifies a failure from any stage before RCPT TO. The recipient was
/// never presented, so even a permanent refusal here (a blocked client
/// host, a rejected sender) says nothing about the mailbox: the outcome
/// is inconclusive, never `Rejected`.
fn pre_rcpt_error_outcome(text: &str, host: &str) -> ProbeOutcome {
    match first_reply_code(text) {
        Some(code) => ProbeOutcome::new(
            ProbeCode::TempUnavailable,
            Some(code),
            Some(host),
            format!("{host} refused the session before RCPT TO ({code}): {text}"),
        ),
        None => {
            ProbeOutcome::unreachable(Some(host), format!("SMTP transport error from {host}: {text}"))
        }
    }
}

/// True when a connect-stage failure looks like an old server that only
/// implements HELO: EHLO answered with a syntax or unrecognized-command
/// code.
fn ehlo_unsupported(text: &str) -> bool {
    matches!(first_reply_code(text), Some(500) | Some(502) | Some(504))
}

fn code_number(code: Code) -> Option<u16> {
    code.to_string().parse().ok()
}

fn response_text(response: &Response) -> String {
    response.message().collect::<Vec<&str>>().join(" ")
}

/// True when a MAIL FROM failure on a plaintext session looks like a
/// STARTTLS requirement rather than a policy refusal.
fn starttls_hint(text: &str) -> bool {
    let text = text.to_lowercase();
    text.contains("starttls")
        || text.contains("tls required")
        || (text.contains("530") && text.contains("5.7.0"))
}

/// Everything the blocking dialogue needs, owned so it can cross the
/// `spawn_blocking` boundary.
struct DialogueRequest {
    host: String,
    recipient: Address,
    sender: Address,
    hello_name: String,
    timeout: Duration,
    use_tls: bool,
}

struct LettreDialer {
    config: Arc<Config>,
    sender: Address,
}

#[async_trait]
impl HostDialer for LettreDialer {
    async fn dial(&self, host: &str, recipient: &str, use_tls: bool) -> Result<DialogueVerdict> {
        let recipient_address = Address::from_str(recipient).map_err(|e| {
            AppError::SmtpProtocol(format!("invalid recipient '{recipient}': {e}"))
        })?;

        let request = DialogueRequest {
            host: host.to_string(),
            recipient: recipient_address,
            sender: self.sender.clone(),
            hello_name: self.config.smtp_hello_name.clone(),
            timeout: self.config.smtp_timeout,
            use_tls,
        };

        // The lettre connection is blocking; the socket timeout bounds every
        // individual read/write, and the outer guard bounds the session as a
        // whole so an abandoned row never pins a worker.
        let session_guard = self.config.smtp_timeout.saturating_mul(4);
        let host_owned = host.to_string();
        let handle = tokio::task::spawn_blocking(move || run_dialogue(request));

        match tokio::time::timeout(session_guard, handle).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(join_err)) => Err(AppError::Task(format!(
                "SMTP dialogue task for {host_owned} failed: {join_err}"
            ))),
            Err(_) => Ok(DialogueVerdict::Outcome(ProbeOutcome::unreachable(
                Some(&host_owned),
                format!("SMTP session with {host_owned} exceeded {session_guard:?}"),
            ))),
        }
    }
}

/// Runs the full blocking SMTP dialogue against one host. Protocol-level
/// refusals become outcomes; only internal errors surface as `Err`.
fn run_dialogue(request: DialogueRequest) -> Result<DialogueVerdict> {
    let outcome = |o: ProbeOutcome| Ok(DialogueVerdict::Outcome(o));
    let host = request.host.as_str();

    let socket_addr = match (host, SMTP_PORT).to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => {
                return outcome(ProbeOutcome::unreachable(
                    Some(host),
                    format!("could not resolve mail server address: {host}"),
                ))
            }
        },
        Err(e) => {
            return outcome(ProbeOutcome::unreachable(
                Some(host),
                format!("could not resolve mail server address {host}: {e}"),
            ))
        }
    };

    let hello = ClientId::Domain(request.hello_name.clone());
    let tls_parameters = if request.use_tls {
        Some(TlsParameters::new(host.to_string()).map_err(|e| {
            AppError::SmtpTls(format!("Failed to create TLS parameters for {host}: {e}"))
        })?)
    } else {
        None
    };

    // `SmtpConnection::connect` reads the greeting and performs the EHLO
    // exchange itself; any refusal along the way surfaces as the error.
    let mut conn = match SmtpConnection::connect(
        socket_addr,
        Some(request.timeout),
        &hello,
        tls_parameters.as_ref(),
        None,
    ) {
        Ok(conn) => conn,
        Err(e) => {
            let text = e.to_string();
            if !request.use_tls && ehlo_unsupported(&text) {
                tracing::debug!(target: "smtp_task",
                    "{} refused EHLO ({}); falling back to a HELO session", host, text);
                return helo_dialogue(socket_addr, &request);
            }
            tracing::debug!(target: "smtp_task",
                "SMTP connection failed for {} (TLS={}): {}", host, request.use_tls, text);
            return outcome(pre_rcpt_error_outcome(&text, host));
        }
    };

    // MAIL FROM: the configured sender on a controlled domain, never the
    // target domain. lettre returns `Err` for any non-positive reply.
    if let Err(e) = conn.command(Mail::new(Some(request.sender.clone()), vec![])) {
        let text = e.to_string();
        let _ = conn.quit();
        if !request.use_tls && starttls_hint(&text) {
            return Ok(DialogueVerdict::NeedsStarttls);
        }
        tracing::debug!(target: "smtp_task", "MAIL FROM refused by {}: {}", host, text);
        return outcome(pre_rcpt_error_outcome(&text, host));
    }

    // RCPT TO: the decisive signal. DATA is never issued.
    let verdict = match conn.command(Rcpt::new(request.recipient.clone(), vec![])) {
        Ok(response) => {
            let code = response.code();
            let message = response_text(&response);
            let number = code_number(code);
            let probe_code = number.map(classify_rcpt_code).unwrap_or_else(|| {
                tracing::warn!(target: "smtp_task",
                    "Unparseable RCPT reply code from {}: {}", host, code);
                ProbeCode::TempUnavailable
            });
            tracing::debug!(target: "smtp_task",
                "RCPT TO reply from {}: {} {}", host, code, message);
            ProbeOutcome::new(
                probe_code,
                number,
                Some(host),
                format!("RCPT TO answered {code} {message}"),
            )
        }
        Err(e) => rcpt_error_outcome(&e.to_string(), host),
    };

    let _ = conn.quit();
    Ok(DialogueVerdict::Outcome(verdict))
}

/// One parsed raw SMTP reply, possibly assembled from continuation lines.
struct RawReply {
    code: u16,
    text: String,
}

/// Fallback path for servers that reject EHLO: the same envelope spoken
/// over a plain HELO session. I/O failures fold into an unreachable
/// outcome.
fn helo_dialogue(addr: SocketAddr, request: &DialogueRequest) -> Result<DialogueVerdict> {
    let host = request.host.as_str();
    let outcome = match run_helo_dialogue(addr, request) {
        Ok(outcome) => outcome,
        Err(e) => {
            ProbeOutcome::unreachable(Some(host), format!("HELO session with {host} failed: {e}"))
        }
    };
    Ok(DialogueVerdict::Outcome(outcome))
}

/// Minimal blocking HELO dialogue. Classification rules match the main
/// path: RCPT TO is the only stage allowed to produce `Rejected`.
fn run_helo_dialogue(addr: SocketAddr, request: &DialogueRequest) -> std::io::Result<ProbeOutcome> {
    let host = request.host.as_str();
    let stream = TcpStream::connect_timeout(&addr, request.timeout)?;
    stream.set_read_timeout(Some(request.timeout))?;
    stream.set_write_timeout(Some(request.timeout))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let greeting = read_raw_reply(&mut reader)?;
    if greeting.code >= 400 {
        let _ = send_raw(&mut writer, "QUIT");
        return Ok(ProbeOutcome::new(
            ProbeCode::TempUnavailable,
            Some(greeting.code),
            Some(host),
            format!("{host} greeted with {}: {}", greeting.code, greeting.text),
        ));
    }

    for command in [
        format!("HELO {}", request.hello_name),
        format!("MAIL FROM:<{}>", request.sender),
    ] {
        send_raw(&mut writer, &command)?;
        let reply = read_raw_reply(&mut reader)?;
        if !(200..300).contains(&reply.code) {
            let _ = send_raw(&mut writer, "QUIT");
            return Ok(ProbeOutcome::new(
                ProbeCode::TempUnavailable,
                Some(reply.code),
                Some(host),
                format!(
                    "{host} refused the session before RCPT TO ({}): {}",
                    reply.code, reply.text
                ),
            ));
        }
    }

    send_raw(&mut writer, &format!("RCPT TO:<{}>", request.recipient))?;
    let reply = read_raw_reply(&mut reader)?;
    let _ = send_raw(&mut writer, "QUIT");
    Ok(ProbeOutcome::new(
        classify_rcpt_code(reply.code),
        Some(reply.code),
        Some(host),
        format!("RCPT TO answered {} {}", reply.code, reply.text),
    ))
}

fn send_raw(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    write!(stream, "{line}\r\n")?;
    stream.flush()
}

fn read_raw_reply(reader: &mut BufReader<TcpStream>) -> std::io::Result<RawReply> {
    let mut code = 0u16;
    let mut text = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ));
        }
        let line = line.trim_end();
        if line.len() < 3 || !line.as_bytes()[..3].iter().all(|b| b.is_ascii_digit()) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("malformed SMTP reply: {line}"),
            ));
        }
        code = line[..3].parse().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "unparseable reply code")
        })?;
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(line.get(4..).unwrap_or("").trim());
        if line.as_bytes().get(3).copied() != Some(b'-') {
            break;
        }
    }
    Ok(RawReply { code, text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigBuilder;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    fn test_config() -> Arc<Config> {
        let mut config = ConfigBuilder::new().build().expect("config");
        config.retry_backoff = (0.0, 0.0);
        config.smtp_blocked_domains = vec!["gmail.com".to_string()];
        Arc::new(config)
    }

    struct ScriptedDialer {
        script: Mutex<VecDeque<Result<DialogueVerdict>>>,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedDialer {
        fn new(script: Vec<Result<DialogueVerdict>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, bool)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl HostDialer for ScriptedDialer {
        async fn dial(
            &self,
            host: &str,
            _recipient: &str,
            use_tls: bool,
        ) -> Result<DialogueVerdict> {
            self.calls.lock().push((host.to_string(), use_tls));
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| panic!("dialer script exhausted for {host}"))
        }
    }

    fn verdict(code: ProbeCode, raw: Option<u16>, host: &str) -> Result<DialogueVerdict> {
        Ok(DialogueVerdict::Outcome(ProbeOutcome::new(
            code,
            raw,
            Some(host),
            "scripted",
        )))
    }

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rcpt_code_mapping_is_exact() {
        assert_eq!(classify_rcpt_code(250), ProbeCode::Accepted);
        assert_eq!(classify_rcpt_code(251), ProbeCode::Accepted);
        assert_eq!(classify_rcpt_code(550), ProbeCode::Rejected);
        assert_eq!(classify_rcpt_code(551), ProbeCode::Rejected);
        assert_eq!(classify_rcpt_code(553), ProbeCode::Rejected);
        assert_eq!(classify_rcpt_code(450), ProbeCode::Greylisted);
        assert_eq!(classify_rcpt_code(451), ProbeCode::Greylisted);
        assert_eq!(classify_rcpt_code(421), ProbeCode::TempUnavailable);
        assert_eq!(classify_rcpt_code(452), ProbeCode::TempUnavailable);
    }

    #[test]
    fn reply_code_extraction() {
        assert_eq!(
            first_reply_code("permanent error (550): mailbox unavailable"),
            Some(550)
        );
        assert_eq!(first_reply_code("transient error (451)"), Some(451));
        assert_eq!(first_reply_code("connection reset by peer"), None);
        // Four-digit runs are not reply codes.
        assert_eq!(first_reply_code("took 4512 ms"), None);
    }

    #[test]
    fn pre_rcpt_refusal_is_never_a_rejection() {
        // A client-host block at MAIL FROM carries a 550 but says nothing
        // about the mailbox.
        let outcome = pre_rcpt_error_outcome(
            "permanent error (550): 5.7.1 Service unavailable, client host blocked",
            "mx1",
        );
        assert_eq!(outcome.code, ProbeCode::TempUnavailable);
        assert_eq!(outcome.raw_response_code, Some(550));
        assert!(outcome.detail.contains("before RCPT TO"));

        let outcome = pre_rcpt_error_outcome("transient error (421): try later", "mx1");
        assert_eq!(outcome.code, ProbeCode::TempUnavailable);

        let outcome = pre_rcpt_error_outcome("connection reset by peer", "mx1");
        assert_eq!(outcome.code, ProbeCode::Unreachable);
    }

    #[test]
    fn rcpt_stage_errors_keep_the_full_mapping() {
        let outcome = rcpt_error_outcome("permanent error (550): no such user", "mx1");
        assert_eq!(outcome.code, ProbeCode::Rejected);
        assert_eq!(outcome.raw_response_code, Some(550));

        let outcome = rcpt_error_outcome("transient error (451): greylisted", "mx1");
        assert_eq!(outcome.code, ProbeCode::Greylisted);

        let outcome = rcpt_error_outcome("connection reset by peer", "mx1");
        assert_eq!(outcome.code, ProbeCode::Unreachable);
    }

    #[test]
    fn ehlo_unsupported_matches_command_syntax_codes_only() {
        assert!(ehlo_unsupported("permanent error (502): command not recognized"));
        assert!(ehlo_unsupported("permanent error (500): syntax error"));
        // A policy refusal is not a missing EHLO implementation.
        assert!(!ehlo_unsupported(
            "permanent error (550): client host blocked"
        ));
        assert!(!ehlo_unsupported("connection refused"));
    }

    #[test]
    fn starttls_hint_matches_known_phrasings() {
        assert!(starttls_hint("permanent error (530): Must issue a STARTTLS command first"));
        assert!(starttls_hint("permanent error (530): 5.7.0 authentication required"));
        assert!(!starttls_hint("permanent error (550): client host blocked"));
    }

    #[test]
    fn helo_fallback_probes_helo_only_servers() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut writer = stream;
            let mut commands: Vec<String> = Vec::new();
            write!(writer, "220 old.example ESMTP\r\n").expect("greet");
            writer.flush().expect("flush");
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let line = line.trim_end().to_string();
                let reply = if line.starts_with("HELO") {
                    "250 old.example"
                } else if line.starts_with("MAIL") {
                    "250 2.1.0 sender ok"
                } else if line.starts_with("RCPT") {
                    "250 2.1.5 recipient ok"
                } else if line.starts_with("QUIT") {
                    "221 bye"
                } else {
                    "502 command not recognized"
                };
                let done = line.starts_with("QUIT");
                commands.push(line);
                // The client may drop the socket without reading the QUIT
                // reply; a failed write here is not a test failure.
                if write!(writer, "{reply}\r\n").is_err() || writer.flush().is_err() {
                    break;
                }
                if done {
                    break;
                }
            }
            commands
        });

        let request = DialogueRequest {
            host: "old.example".to_string(),
            recipient: Address::from_str("user@old.example").expect("recipient"),
            sender: Address::from_str("probe@scout.example").expect("sender"),
            hello_name: "scout.example".to_string(),
            timeout: Duration::from_secs(5),
            use_tls: false,
        };
        let verdict = helo_dialogue(addr, &request).expect("dialogue");
        let outcome = match verdict {
            DialogueVerdict::Outcome(outcome) => outcome,
            other => panic!("unexpected verdict: {other:?}"),
        };
        assert_eq!(outcome.code, ProbeCode::Accepted);
        assert_eq!(outcome.raw_response_code, Some(250));

        let commands = server.join().expect("server thread");
        assert!(commands.iter().any(|c| c.starts_with("HELO scout.example")));
        assert!(commands.iter().all(|c| !c.starts_with("EHLO")));
    }

    #[test]
    fn helo_fallback_mail_refusal_stays_inconclusive() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut writer = stream;
            let mut saw_rcpt = false;
            write!(writer, "220 old.example ESMTP\r\n").expect("greet");
            writer.flush().expect("flush");
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let line = line.trim_end().to_string();
                saw_rcpt |= line.starts_with("RCPT");
                let reply = if line.starts_with("HELO") {
                    "250 old.example"
                } else if line.starts_with("MAIL") {
                    "550 5.7.1 client host blocked"
                } else if line.starts_with("QUIT") {
                    "221 bye"
                } else {
                    "502 command not recognized"
                };
                let done = line.starts_with("QUIT");
                // The client may drop the socket without reading the QUIT
                // reply; a failed write here is not a test failure.
                if write!(writer, "{reply}\r\n").is_err() || writer.flush().is_err() {
                    break;
                }
                if done {
                    break;
                }
            }
            saw_rcpt
        });

        let request = DialogueRequest {
            host: "old.example".to_string(),
            recipient: Address::from_str("user@old.example").expect("recipient"),
            sender: Address::from_str("probe@scout.example").expect("sender"),
            hello_name: "scout.example".to_string(),
            timeout: Duration::from_secs(5),
            use_tls: false,
        };
        let verdict = helo_dialogue(addr, &request).expect("dialogue");
        let outcome = match verdict {
            DialogueVerdict::Outcome(outcome) => outcome,
            other => panic!("unexpected verdict: {other:?}"),
        };
        assert_eq!(outcome.code, ProbeCode::TempUnavailable);
        assert_eq!(outcome.raw_response_code, Some(550));

        let saw_rcpt = server.join().expect("server thread");
        assert!(!saw_rcpt, "RCPT TO must not be sent after a MAIL FROM refusal");
    }

    #[tokio::test]
    async fn accepted_on_first_host_is_decisive() {
        let dialer = ScriptedDialer::new(vec![verdict(ProbeCode::Accepted, Some(250), "mx1")]);
        let prober = SmtpProber::with_dialer(test_config(), dialer.clone());
        let outcome = prober
            .probe("john.doe", "example.com", &hosts(&["mx1", "mx2"]))
            .await
            .expect("probe");
        assert_eq!(outcome.code, ProbeCode::Accepted);
        assert_eq!(dialer.calls().len(), 1);
    }

    #[tokio::test]
    async fn greylist_gets_exactly_one_retry_then_unreachable() {
        let dialer = ScriptedDialer::new(vec![
            verdict(ProbeCode::Greylisted, Some(450), "mx1"),
            verdict(ProbeCode::Greylisted, Some(450), "mx1"),
        ]);
        let prober = SmtpProber::with_dialer(test_config(), dialer.clone());
        let outcome = prober
            .probe("john.doe", "example.com", &hosts(&["mx1"]))
            .await
            .expect("probe");
        assert_eq!(outcome.code, ProbeCode::Unreachable);
        assert_eq!(outcome.raw_response_code, Some(450));
        assert!(outcome.detail.contains("greylisted"));
        assert_eq!(dialer.calls().len(), 2);
    }

    #[tokio::test]
    async fn greylist_retry_can_succeed() {
        let dialer = ScriptedDialer::new(vec![
            verdict(ProbeCode::Greylisted, Some(451), "mx1"),
            verdict(ProbeCode::Accepted, Some(250), "mx1"),
        ]);
        let prober = SmtpProber::with_dialer(test_config(), dialer.clone());
        let outcome = prober
            .probe("john.doe", "example.com", &hosts(&["mx1"]))
            .await
            .expect("probe");
        assert_eq!(outcome.code, ProbeCode::Accepted);
    }

    #[tokio::test]
    async fn temp_unavailable_advances_to_next_host() {
        let dialer = ScriptedDialer::new(vec![
            verdict(ProbeCode::TempUnavailable, Some(421), "mx1"),
            verdict(ProbeCode::Rejected, Some(550), "mx2"),
        ]);
        let prober = SmtpProber::with_dialer(test_config(), dialer.clone());
        let outcome = prober
            .probe("john.doe", "example.com", &hosts(&["mx1", "mx2"]))
            .await
            .expect("probe");
        assert_eq!(outcome.code, ProbeCode::Rejected);
        assert_eq!(
            dialer.calls(),
            vec![("mx1".to_string(), false), ("mx2".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn exhausting_all_hosts_is_unreachable() {
        let dialer = ScriptedDialer::new(vec![
            Ok(DialogueVerdict::Outcome(ProbeOutcome::unreachable(
                Some("mx1"),
                "connect failed",
            ))),
            Ok(DialogueVerdict::Outcome(ProbeOutcome::unreachable(
                Some("mx2"),
                "connect failed",
            ))),
        ]);
        let prober = SmtpProber::with_dialer(test_config(), dialer.clone());
        let outcome = prober
            .probe("john.doe", "example.com", &hosts(&["mx1", "mx2"]))
            .await
            .expect("probe");
        assert_eq!(outcome.code, ProbeCode::Unreachable);
        assert_eq!(dialer.calls().len(), 2);
    }

    #[tokio::test]
    async fn blocked_provider_skips_the_dial() {
        let dialer = ScriptedDialer::new(vec![]);
        let prober = SmtpProber::with_dialer(test_config(), dialer.clone());
        let outcome = prober
            .probe("someone", "gmail.com", &hosts(&["gmail-smtp-in.l.google.com"]))
            .await
            .expect("probe");
        assert_eq!(outcome.code, ProbeCode::TempUnavailable);
        assert!(outcome.detail.contains("blocks SMTP verification"));
        assert!(dialer.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_host_list_is_unreachable_without_dialing() {
        let dialer = ScriptedDialer::new(vec![]);
        let prober = SmtpProber::with_dialer(test_config(), dialer.clone());
        let outcome = prober
            .probe("someone", "example.com", &[])
            .await
            .expect("probe");
        assert_eq!(outcome.code, ProbeCode::Unreachable);
        assert!(dialer.calls().is_empty());
    }

    #[tokio::test]
    async fn starttls_demand_redials_with_tls() {
        let dialer = ScriptedDialer::new(vec![
            Ok(DialogueVerdict::NeedsStarttls),
            verdict(ProbeCode::Accepted, Some(250), "mx1"),
        ]);
        let prober = SmtpProber::with_dialer(test_config(), dialer.clone());
        let outcome = prober
            .probe("john.doe", "example.com", &hosts(&["mx1"]))
            .await
            .expect("probe");
        assert_eq!(outcome.code, ProbeCode::Accepted);
        assert_eq!(
            dialer.calls(),
            vec![("mx1".to_string(), false), ("mx1".to_string(), true)]
        );
    }
}
