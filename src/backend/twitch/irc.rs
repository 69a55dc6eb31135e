use crate::backend::normalize::TagMap;

/// Longest partial line kept while waiting for its CRLF. Twitch caps tags at
/// 8 KiB plus a 512 byte body, so anything past this is garbage.
const MAX_PENDING_BYTES: usize = 64 * 1024;

const LOGIN_FAILED_NOTICES: [&str; 2] = ["Login authentication failed", "Improperly formatted auth"];

/// Reassembles CRLF-terminated lines across socket reads.
///
/// Works on bytes so a multi-byte character split between two reads is only
/// decoded once both halves have arrived.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one read and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(String::from_utf8_lossy(&line).into_owned());
            }
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            log::warn!("Dropping {} bytes without line terminator", self.pending.len());
            self.pending.clear();
        }

        lines
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// A chat message line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Privmsg {
    pub tags: TagMap,
    pub username: String,
    pub channel: String,
    pub message: String,
}

/// The server lines the receive loop acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    Ping,
    Privmsg(Privmsg),
    Notice(String),
    Reconnect,
    Other(String),
}

impl ServerLine {
    /// Parse one line (without CRLF). `None` means the line is malformed and
    /// should be dropped.
    pub fn parse(line: &str) -> Option<ServerLine> {
        if line.starts_with("PING") {
            return Some(ServerLine::Ping);
        }

        let mut rest = line;

        let tags = match rest.strip_prefix('@') {
            Some(tagged) => {
                let (raw, body) = tagged.split_once(' ')?;
                rest = body;
                Some(raw)
            }
            None => None,
        };

        let mut nick = None;
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (prefix, body) = prefixed.split_once(' ')?;
            nick = prefix.split_once('!').map(|(n, _)| n);
            rest = body;
        }

        let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));

        match command {
            "PRIVMSG" => {
                let (channel, message) = params.split_once(" :")?;
                let channel = channel.strip_prefix('#')?;
                let username = nick.filter(|n| !n.is_empty())?;

                Some(ServerLine::Privmsg(Privmsg {
                    tags: tags.map(TagMap::parse).unwrap_or_default(),
                    username: username.to_string(),
                    channel: channel.to_string(),
                    message: message.to_string(),
                }))
            }
            "NOTICE" => {
                let text = params.split_once(" :").map_or(params, |(_, t)| t);
                Some(ServerLine::Notice(text.to_string()))
            }
            "RECONNECT" => Some(ServerLine::Reconnect),
            "" => None,
            other => Some(ServerLine::Other(other.to_string())),
        }
    }
}

pub fn is_login_failure(notice: &str) -> bool {
    LOGIN_FAILED_NOTICES.iter().any(|n| notice.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::normalize::{BadgeTag, EmoteSpan};

    #[test]
    fn test_line_split_across_reads() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b":a!a@a PRIVMSG #c :hel").is_empty());
        assert_eq!(buffer.pending_len(), 22);

        let lines = buffer.push(b"lo\r\nPING :tmi.twitch.tv\r\n:b!b@b PRI");
        assert_eq!(lines, vec![":a!a@a PRIVMSG #c :hello", "PING :tmi.twitch.tv"]);

        let lines = buffer.push(b"VMSG #c :x\r\n");
        assert_eq!(lines, vec![":b!b@b PRIVMSG #c :x"]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let mut buffer = LineBuffer::new();
        let line = "héllo\r\n".as_bytes();
        assert!(buffer.push(&line[..2]).is_empty());
        assert_eq!(buffer.push(&line[2..]), vec!["héllo"]);
    }

    #[test]
    fn test_empty_lines_skipped() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"\r\n\r\nPING\n"), vec!["PING"]);
    }

    #[test]
    fn test_parse_tagged_privmsg() {
        let line = "@badges=broadcaster/1,subscriber/0;color=#8A2BE2;emotes=25:6-10;bits=100 :alice!alice@alice.tmi.twitch.tv PRIVMSG #somechannel :Hello Kappa!";

        let Some(ServerLine::Privmsg(msg)) = ServerLine::parse(line) else {
            panic!("expected PRIVMSG");
        };
        assert_eq!(msg.username, "alice");
        assert_eq!(msg.channel, "somechannel");
        assert_eq!(msg.message, "Hello Kappa!");
        assert_eq!(msg.tags.color.as_deref(), Some("#8A2BE2"));
        assert_eq!(
            msg.tags.badges,
            vec![
                BadgeTag { name: "broadcaster".into(), version: "1".into() },
                BadgeTag { name: "subscriber".into(), version: "0".into() },
            ]
        );
        assert_eq!(
            msg.tags.emotes,
            vec![EmoteSpan { id: "25".into(), start: 6, end: 10 }]
        );
        assert_eq!(msg.tags.bits, 100);
    }

    #[test]
    fn test_parse_untagged_privmsg() {
        let Some(ServerLine::Privmsg(msg)) =
            ServerLine::parse(":bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :a :colon inside")
        else {
            panic!("expected PRIVMSG");
        };
        assert_eq!(msg.username, "bob");
        assert_eq!(msg.message, "a :colon inside");
        assert_eq!(msg.tags, TagMap::default());
    }

    #[test]
    fn test_parse_control_lines() {
        assert_eq!(ServerLine::parse("PING :tmi.twitch.tv"), Some(ServerLine::Ping));
        assert_eq!(
            ServerLine::parse(":tmi.twitch.tv RECONNECT"),
            Some(ServerLine::Reconnect)
        );
        assert_eq!(
            ServerLine::parse(":tmi.twitch.tv NOTICE * :Login authentication failed"),
            Some(ServerLine::Notice("Login authentication failed".to_string()))
        );
        assert_eq!(
            ServerLine::parse(":tmi.twitch.tv 001 justinfan12345 :Welcome, GLHF!"),
            Some(ServerLine::Other("001".to_string()))
        );
    }

    #[test]
    fn test_malformed_lines_dropped() {
        assert_eq!(ServerLine::parse("@only-tags"), None);
        assert_eq!(ServerLine::parse(":prefix-only"), None);
        assert_eq!(ServerLine::parse(":tmi.twitch.tv PRIVMSG #chan :no nick"), None);
        assert_eq!(ServerLine::parse(":a!a@a PRIVMSG chan :no hash"), None);
        assert_eq!(ServerLine::parse(":a!a@a PRIVMSG #chan"), None);
    }

    #[test]
    fn test_login_failure_notice() {
        assert!(is_login_failure("Login authentication failed"));
        assert!(!is_login_failure("This room is now in slow mode."));
    }
}
