use chrono::Local;
use std::sync::Arc;

use super::assets::{is_valid_emote_id, AssetResolver};
use super::events::{BadgeRole, ChatBadge, ChatEvent, Platform, Segment};

/// Case-insensitive keywords that mark a message as a donation
const DONATION_KEYWORDS: [&str; 3] = ["donated", "donation", "cheered"];

const HIGHLIGHT_MARKER: &str = "highlighted-message";

/// One `name/version` entry of the `badges` tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeTag {
    pub name: String,
    pub version: String,
}

/// One `start-end` range of the `emotes` tag; byte offsets, `end` inclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmoteSpan {
    pub id: String,
    pub start: usize,
    pub end: usize,
}

/// The recognized tags of a tag-prefixed line.
///
/// Absent or unparsable tags keep their defaults: no color, no badges, no
/// emotes, zero bits, not highlighted. Unrecognized tags are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    pub color: Option<String>,
    pub badges: Vec<BadgeTag>,
    pub emotes: Vec<EmoteSpan>,
    pub bits: u32,
    pub highlighted: bool,
}

impl TagMap {
    /// Parse `key=value;key=value` (without the leading `@`)
    pub fn parse(raw: &str) -> Self {
        let mut tags = TagMap::default();

        for pair in raw.split(';') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = unescape_tag_value(value);

            match key {
                "color" => tags.color = normalize_color(&value),
                "badges" => tags.badges = parse_badges(&value),
                "emotes" => tags.emotes = parse_emotes(&value),
                "bits" => tags.bits = value.trim().parse().unwrap_or(0),
                "flags" if value.contains(HIGHLIGHT_MARKER) => tags.highlighted = true,
                "msg-id" if value == HIGHLIGHT_MARKER => tags.highlighted = true,
                _ => {}
            }
        }

        tags
    }
}

/// IRCv3 tag value escapes: `\:` `\s` `\\` `\r` `\n`
fn unescape_tag_value(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn normalize_color(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else if value.starts_with('#') {
        Some(value.to_string())
    } else {
        Some(format!("#{}", value))
    }
}

fn parse_badges(value: &str) -> Vec<BadgeTag> {
    value
        .split(',')
        .filter_map(|entry| {
            let (name, version) = entry.split_once('/').unwrap_or((entry, ""));
            if name.is_empty() {
                return None;
            }
            Some(BadgeTag {
                name: name.to_string(),
                version: version.to_string(),
            })
        })
        .collect()
}

fn parse_emotes(value: &str) -> Vec<EmoteSpan> {
    let mut spans = Vec::new();

    for group in value.split('/') {
        let Some((id, ranges)) = group.split_once(':') else {
            continue;
        };
        for range in ranges.split(',') {
            let Some((start, end)) = range.split_once('-') else {
                continue;
            };
            if let (Ok(start), Ok(end)) = (start.parse(), end.parse()) {
                spans.push(EmoteSpan {
                    id: id.to_string(),
                    start,
                    end,
                });
            }
        }
    }

    spans
}

/// Highest-priority role among `badges`, regardless of their order
pub fn badge_priority(badges: &[BadgeTag]) -> Option<BadgeRole> {
    BadgeRole::PRIORITY
        .into_iter()
        .find(|role| badges.iter().any(|b| BadgeRole::from_badge_name(&b.name) == Some(*role)))
}

pub fn mentions_donation(message: &str) -> bool {
    let lower = message.to_lowercase();
    DONATION_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Split `message` into text and emote segments.
///
/// Spans are applied in ascending start order; where spans overlap the last
/// one applied owns the shared bytes. Spans that run past the message or cut
/// through a UTF-8 character are left as text. `resolve` returns the image URL
/// of an emote id, or `None` to keep that span as text.
pub fn substitute_emotes(
    message: &str,
    spans: &[EmoteSpan],
    resolve: impl Fn(&str) -> Option<String>,
) -> Vec<Segment> {
    if message.is_empty() {
        return Vec::new();
    }

    let mut ordered: Vec<(&EmoteSpan, String)> = spans
        .iter()
        .filter(|span| {
            span.start <= span.end
                && span.end < message.len()
                && message.is_char_boundary(span.start)
                && message.is_char_boundary(span.end + 1)
        })
        .filter_map(|span| resolve(&span.id).map(|url| (span, url)))
        .collect();
    ordered.sort_by_key(|(span, _)| span.start);

    // Owner of each byte: index into `ordered`, or None for plain text
    let mut owner: Vec<Option<usize>> = vec![None; message.len()];
    for (index, (span, _)) in ordered.iter().enumerate() {
        for slot in &mut owner[span.start..=span.end] {
            *slot = Some(index);
        }
    }

    let mut segments = Vec::new();
    let mut run_start = 0;
    for pos in 1..=message.len() {
        if pos < message.len() && owner[pos] == owner[run_start] {
            continue;
        }
        let piece = &message[run_start..pos];
        match owner[run_start] {
            None => segments.push(Segment::text(piece)),
            Some(index) => {
                let (span, url) = &ordered[index];
                segments.push(Segment::Emote {
                    id: span.id.clone(),
                    name: piece.to_string(),
                    url: url.clone(),
                });
            }
        }
        run_start = pos;
    }

    segments
}

/// Turns per-platform message data into `ChatEvent`s
#[derive(Clone)]
pub struct MessageNormalizer {
    assets: Arc<AssetResolver>,
}

impl MessageNormalizer {
    pub fn new(assets: Arc<AssetResolver>) -> Self {
        Self { assets }
    }

    pub fn assets(&self) -> &Arc<AssetResolver> {
        &self.assets
    }

    /// Build a Twitch event from a parsed tag map and the PRIVMSG body
    pub fn twitch(&self, tags: &TagMap, username: &str, message: &str) -> ChatEvent {
        let mut badges: Vec<ChatBadge> = tags
            .badges
            .iter()
            .map(|b| ChatBadge {
                name: b.name.clone(),
                version: b.version.clone(),
                url: self.assets.resolve_badge_url(&b.name, &b.version),
            })
            .collect();
        // Stable: badges without a role keep their received order at the end
        badges.sort_by_key(|b| b.role().map_or(BadgeRole::PRIORITY.len(), |r| r as usize));

        let segments = substitute_emotes(message, &tags.emotes, |id| {
            is_valid_emote_id(id).then(|| self.assets.resolve_emote_url(id))
        });

        ChatEvent {
            platform: Platform::Twitch,
            timestamp: Local::now(),
            username: username.to_string(),
            color: tags.color.clone(),
            text: message.to_string(),
            segments,
            badges,
            role: badge_priority(&tags.badges),
            is_donation: tags.bits > 0 || mentions_donation(message),
            is_highlight: tags.highlighted,
            bits: tags.bits,
        }
    }

    /// Build a YouTube event; this source carries no badges, emotes or flags
    pub fn youtube(&self, author: &str, message: &str) -> ChatEvent {
        ChatEvent::plain(Platform::YouTube, author, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::assets::tests::resolver_with;

    fn span(id: &str, start: usize, end: usize) -> EmoteSpan {
        EmoteSpan {
            id: id.to_string(),
            start,
            end,
        }
    }

    fn emote_url(id: &str) -> Option<String> {
        Some(format!("cdn/{}", id))
    }

    fn normalizer() -> MessageNormalizer {
        MessageNormalizer::new(resolver_with(Default::default()))
    }

    #[test]
    fn test_parse_recognized_tags() {
        let tags = TagMap::parse(
            "badge-info=subscriber/8;badges=subscriber/6,premium/1;color=1E90FF;display-name=Alice;emotes=25:0-4,12-16/1902:6-10;bits=50;flags=",
        );

        assert_eq!(tags.color.as_deref(), Some("#1E90FF"));
        assert_eq!(
            tags.badges,
            vec![
                BadgeTag { name: "subscriber".into(), version: "6".into() },
                BadgeTag { name: "premium".into(), version: "1".into() },
            ]
        );
        assert_eq!(
            tags.emotes,
            vec![span("25", 0, 4), span("25", 12, 16), span("1902", 6, 10)]
        );
        assert_eq!(tags.bits, 50);
        assert!(!tags.highlighted);
    }

    #[test]
    fn test_absent_tags_default() {
        let tags = TagMap::parse("color=;badges=;emotes=;id=abc");
        assert_eq!(tags, TagMap::default());
    }

    #[test]
    fn test_highlight_markers() {
        assert!(TagMap::parse("flags=highlighted-message").highlighted);
        assert!(TagMap::parse("msg-id=highlighted-message").highlighted);
        assert!(!TagMap::parse("msg-id=skip-subs-mode-message").highlighted);
    }

    #[test]
    fn test_malformed_emote_ranges_skipped() {
        let tags = TagMap::parse("emotes=25:0-x,2-3/nocolon/7:-1");
        assert_eq!(tags.emotes, vec![span("25", 2, 3)]);
    }

    #[test]
    fn test_tag_value_unescaping() {
        assert_eq!(unescape_tag_value(r"a\sb\:c\\d"), r"a b;c\d");
        assert_eq!(unescape_tag_value("plain"), "plain");
    }

    #[test]
    fn test_priority_ignores_list_order() {
        let badges = vec![
            BadgeTag { name: "subscriber".into(), version: "12".into() },
            BadgeTag { name: "broadcaster".into(), version: "1".into() },
        ];
        assert_eq!(badge_priority(&badges), Some(BadgeRole::Broadcaster));
        assert_eq!(badge_priority(&[]), None);
    }

    #[test]
    fn test_emote_substitution() {
        let segments = substitute_emotes("Hello Kappa!", &[span("25", 6, 10)], emote_url);
        assert_eq!(
            segments,
            vec![
                Segment::text("Hello "),
                Segment::Emote {
                    id: "25".into(),
                    name: "Kappa".into(),
                    url: "cdn/25".into(),
                },
                Segment::text("!"),
            ]
        );
    }

    #[test]
    fn test_spans_applied_in_start_order() {
        let segments = substitute_emotes(
            "Kappa Keepo",
            &[span("1902", 6, 10), span("25", 0, 4)],
            emote_url,
        );
        let ids: Vec<_> = segments
            .iter()
            .map(|s| match s {
                Segment::Emote { id, .. } => id.as_str(),
                Segment::Text { text } => text.as_str(),
            })
            .collect();
        assert_eq!(ids, vec!["25", " ", "1902"]);
    }

    #[test]
    fn test_overlapping_spans_last_applied_wins() {
        let segments =
            substitute_emotes("abcdefgh", &[span("1", 0, 4), span("2", 3, 6)], emote_url);
        assert_eq!(
            segments,
            vec![
                Segment::Emote { id: "1".into(), name: "abc".into(), url: "cdn/1".into() },
                Segment::Emote { id: "2".into(), name: "defg".into(), url: "cdn/2".into() },
                Segment::text("h"),
            ]
        );
    }

    #[test]
    fn test_out_of_range_and_unresolvable_spans_stay_text() {
        let segments = substitute_emotes("héllo", &[span("25", 1, 1), span("9", 3, 40)], emote_url);
        assert_eq!(segments, vec![Segment::text("héllo")]);

        let segments = substitute_emotes("Kappa", &[span("25", 0, 4)], |_| None);
        assert_eq!(segments, vec![Segment::text("Kappa")]);
    }

    #[test]
    fn test_bits_imply_donation() {
        let tags = TagMap::parse("bits=100");
        let event = normalizer().twitch(&tags, "alice", "nice stream");
        assert!(event.is_donation);
        assert_eq!(event.bits, 100);
    }

    #[test]
    fn test_keyword_donation() {
        let event = normalizer().twitch(&TagMap::default(), "bob", "I just DONATED five");
        assert!(event.is_donation);
        assert_eq!(event.bits, 0);

        let event = normalizer().twitch(&TagMap::default(), "bob", "hello");
        assert!(!event.is_donation);
    }

    #[test]
    fn test_twitch_event_badges_sorted_and_resolved() {
        let tags = TagMap::parse("badges=premium/1,subscriber/0,broadcaster/1;color=#FF0000");
        let event = normalizer().twitch(&tags, "alice", "hi");

        let names: Vec<_> = event.badges.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["broadcaster", "subscriber", "premium"]);
        assert_eq!(event.badges[0].url.as_deref(), Some("https://cdn/broadcaster1"));
        assert_eq!(event.badges[2].url, None);
        assert_eq!(event.role, Some(BadgeRole::Broadcaster));
        assert_eq!(event.color.as_deref(), Some("#FF0000"));
        assert_eq!(event.platform, Platform::Twitch);
    }

    #[test]
    fn test_youtube_event_is_plain() {
        let event = normalizer().youtube("carol", "hey");
        assert_eq!(event.platform, Platform::YouTube);
        assert!(event.badges.is_empty());
        assert!(!event.is_donation && !event.is_highlight);
        assert_eq!(event.segments, vec![Segment::text("hey")]);
    }
}
