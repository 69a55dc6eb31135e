use std::ops::ControlFlow;
use std::sync::{Mutex as StdMutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_native_tls::TlsStream;

use super::api::TwitchApi;
use super::irc::{is_login_failure, LineBuffer, ServerLine};
use crate::backend::dispatch::EventDispatcher;
use crate::backend::error::{ChatError, Result};
use crate::backend::events::Platform;
use crate::backend::normalize::MessageNormalizer;
use crate::backend::session::{Lifecycle, LoopReporter, Session};
use crate::backend::state::ConnectionState;

const TWITCH_IRC_HOST: &str = "irc.chat.twitch.tv";
const TWITCH_IRC_PORT: u16 = 6697;
const ANONYMOUS_NICK: &str = "justinfan12345";
const CAPABILITIES: &str = "twitch.tv/tags twitch.tv/commands twitch.tv/membership";
const PONG_REPLY: &[u8] = b"PONG :tmi.twitch.tv\r\n";
const READ_BUFFER_SIZE: usize = 2048;

/// Twitch IRC chat connection for one channel at a time
pub struct TwitchConnection {
    api: TwitchApi,
    normalizer: MessageNormalizer,
    lifecycle: Lifecycle,
    session: Mutex<Option<Session>>,
    channel: StdMutex<Option<String>>,
    channel_id: StdMutex<Option<String>>,
}

impl TwitchConnection {
    pub fn new(client_id: String, dispatcher: EventDispatcher, normalizer: MessageNormalizer) -> Self {
        Self {
            api: TwitchApi::new(client_id),
            normalizer,
            lifecycle: Lifecycle::new(Platform::Twitch, dispatcher),
            session: Mutex::new(None),
            channel: StdMutex::new(None),
            channel_id: StdMutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state.get()
    }

    /// Channel login of the current or last session
    pub fn channel(&self) -> Option<String> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Numeric channel id, when the REST lookup succeeded
    pub fn channel_id(&self) -> Option<String> {
        self.channel_id.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Connect to `channel` and start receiving chat.
    ///
    /// An existing session is torn down first. Invalid input is rejected
    /// before any state change.
    pub async fn connect(&self, channel: &str, token: &str) -> Result<()> {
        let (channel, token) = validate_credentials(channel, token)?;

        let mut session = self.session.lock().await;
        self.lifecycle.begin(&mut session).await;
        self.prepare_assets(&channel, &token).await;

        log::info!("Connecting to {}:{}", TWITCH_IRC_HOST, TWITCH_IRC_PORT);
        match open_tls().await {
            Ok(stream) => self.start(&mut session, stream, &channel, &token).await,
            Err(e) => {
                self.lifecycle.fail(&e);
                Err(e)
            }
        }
    }

    /// Same as `connect`, over an already established transport
    #[cfg(test)]
    pub async fn connect_with_stream<S>(&self, stream: S, channel: &str, token: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (channel, token) = validate_credentials(channel, token)?;

        let mut session = self.session.lock().await;
        self.lifecycle.begin(&mut session).await;
        self.start(&mut session, stream, &channel, &token).await
    }

    /// Stop the receive loop. Does nothing when already disconnected.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        self.lifecycle.end(&mut session, "Disconnected from Twitch").await;
    }

    /// Resolve the channel id and load badge sets; failures only cost badge images
    async fn prepare_assets(&self, channel: &str, token: &str) {
        let assets = self.normalizer.assets();

        if let Err(e) = assets.load_global_badges().await {
            log::warn!("Global badges unavailable: {}", e);
        }

        if !self.api.has_client_id() {
            log::debug!("No Twitch client id configured, skipping channel badges");
            return;
        }

        match self.api.get_user_by_login(channel, token).await {
            Ok(user) => {
                if let Err(e) = assets.load_channel_badges(&user.id).await {
                    log::warn!("Channel badges for {} unavailable: {}", channel, e);
                }
                *self.channel_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(user.id);
            }
            Err(e) => log::warn!("Could not resolve channel id for {}: {}", channel, e),
        }
    }

    async fn start<S>(
        &self,
        session: &mut Option<Session>,
        stream: S,
        channel: &str,
        token: &str,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, mut writer) = tokio::io::split(stream);

        if let Err(e) = send_login(&mut writer, channel, token).await {
            self.lifecycle.fail(&e);
            return Err(e);
        }

        *self.channel.lock().unwrap_or_else(PoisonError::into_inner) = Some(channel.to_string());
        self.lifecycle
            .connected(format!("Connected to Twitch channel #{}", channel));

        let normalizer = self.normalizer.clone();
        *session = Some(Session::spawn(|shutdown| {
            let reporter = LoopReporter::new(&self.lifecycle, shutdown);
            receive_loop(reader, writer, reporter, normalizer)
        }));
        Ok(())
    }
}

/// Trim and lowercase the channel, strip `#`, and prefix the token with `oauth:`
fn validate_credentials(channel: &str, token: &str) -> Result<(String, String)> {
    let channel = channel.trim().trim_start_matches('#').to_lowercase();
    if channel.is_empty() {
        return Err(ChatError::Auth("Please enter a Twitch channel name".to_string()));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(ChatError::Auth("No Twitch OAuth token".to_string()));
    }
    let token = if token.starts_with("oauth:") {
        token.to_string()
    } else {
        format!("oauth:{}", token)
    };

    Ok((channel, token))
}

async fn open_tls() -> Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect((TWITCH_IRC_HOST, TWITCH_IRC_PORT)).await?;
    let connector = tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new()?);
    let stream = connector.connect(TWITCH_IRC_HOST, tcp).await?;
    Ok(stream)
}

async fn send_login<W>(writer: &mut W, channel: &str, token: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let commands = [
        format!("PASS {}", token),
        format!("NICK {}", ANONYMOUS_NICK),
        format!("CAP REQ :{}", CAPABILITIES),
        format!("JOIN #{}", channel),
    ];

    for command in commands {
        writer.write_all(format!("{}\r\n", command).as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read, reassemble and dispatch lines until the connection ends or is stopped
async fn receive_loop<R, W>(
    mut reader: R,
    mut writer: W,
    reporter: LoopReporter,
    normalizer: MessageNormalizer,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = LineBuffer::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    let cause = 'session: loop {
        if !reporter.is_connected() {
            break None;
        }

        let read = tokio::select! {
            _ = reporter.stopped() => break None,
            read = reader.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => break Some("Twitch closed the connection".to_string()),
            Ok(n) => n,
            Err(e) => break Some(format!("Twitch chat error: {}", e)),
        };

        for line in lines.push(&buf[..n]) {
            if let ControlFlow::Break(cause) =
                handle_line(&line, &mut writer, &reporter, &normalizer).await
            {
                break 'session cause;
            }
        }
    };

    reporter.finish(cause).await;
}

/// Act on one complete line. `Break(Some(cause))` ends the session with a
/// report, `Break(None)` means it was stopped mid-dispatch.
async fn handle_line<W>(
    line: &str,
    writer: &mut W,
    reporter: &LoopReporter,
    normalizer: &MessageNormalizer,
) -> ControlFlow<Option<String>>
where
    W: AsyncWrite + Unpin,
{
    match ServerLine::parse(line) {
        Some(ServerLine::Ping) => {
            let pong = async {
                writer.write_all(PONG_REPLY).await?;
                writer.flush().await
            };
            if let Err(e) = pong.await {
                return ControlFlow::Break(Some(format!("Failed to answer PING: {}", e)));
            }
        }
        Some(ServerLine::Privmsg(msg)) => {
            let event = normalizer.twitch(&msg.tags, &msg.username, &msg.message);
            normalizer.assets().prefetch(event.asset_keys());
            if !reporter.chat(event).await {
                return ControlFlow::Break(None);
            }
        }
        Some(ServerLine::Notice(text)) if is_login_failure(&text) => {
            return ControlFlow::Break(Some(format!("Twitch login failed: {}", text)));
        }
        Some(ServerLine::Notice(text)) => {
            if !reporter.system(text).await {
                return ControlFlow::Break(None);
            }
        }
        Some(ServerLine::Reconnect) => {
            return ControlFlow::Break(Some("Twitch asked us to reconnect".to_string()));
        }
        Some(ServerLine::Other(command)) => log::trace!("Ignoring {}", command),
        None => log::trace!("Dropping unparsable line: {}", line),
    }
    ControlFlow::Continue(())
}
