//! Turns whatever a person pasted into a typed channel or video reference.

use serde::Serialize;
use url::Url;

const VIDEO_ID_LEN: usize = 11;
const RESERVED_PATHS: &[&str] = &["feed", "results", "playlist", "gaming", "premium"];
const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "music.youtube.com", "youtube-nocookie.com"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ParsedInput {
    ChannelId(String),
    Handle(String),
    Username(String),
    CustomName(String),
    VideoId(String),
    Unknown(String),
}

impl ParsedInput {
    pub fn value(&self) -> &str {
        match self {
            ParsedInput::ChannelId(v)
            | ParsedInput::Handle(v)
            | ParsedInput::Username(v)
            | ParsedInput::CustomName(v)
            | ParsedInput::VideoId(v)
            | ParsedInput::Unknown(v) => v,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, ParsedInput::VideoId(_))
    }

    pub fn is_channel(&self) -> bool {
        matches!(
            self,
            ParsedInput::ChannelId(_)
                | ParsedInput::Handle(_)
                | ParsedInput::Username(_)
                | ParsedInput::CustomName(_)
        )
    }
}

/// Classify raw input. An 11-character id-shaped string is always read as a
/// video id, even if it is also a valid handle.
pub fn parse_input(input: &str) -> ParsedInput {
    let trimmed = input.trim();

    if is_video_id(trimmed) {
        return ParsedInput::VideoId(trimmed.to_string());
    }

    if let Some(handle) = trimmed.strip_prefix('@') {
        if !handle.is_empty() && handle.chars().all(is_name_char) {
            return ParsedInput::Handle(handle.to_string());
        }
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = match Url::parse(&with_scheme) {
        Ok(url) => url,
        Err(_) => {
            if !trimmed.is_empty() && trimmed.chars().all(is_name_char) {
                return ParsedInput::Handle(trimmed.to_string());
            }
            return ParsedInput::Unknown(trimmed.to_string());
        }
    };

    let host = url.host_str().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    let host = host.strip_prefix("m.").unwrap_or(host);

    if host == "youtu.be" {
        let id = url
            .path()
            .trim_start_matches('/')
            .split(['?', '&', '/'])
            .next()
            .unwrap_or_default();
        if is_video_id(id) {
            return ParsedInput::VideoId(id.to_string());
        }
    }

    if YOUTUBE_HOSTS.contains(&host) {
        if let Some(parsed) = parse_youtube_path(&url) {
            return parsed;
        }
    }

    ParsedInput::Unknown(trimmed.to_string())
}

fn parse_youtube_path(url: &Url) -> Option<ParsedInput> {
    let path = url.path();

    if path == "/watch" {
        let video = url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned());
        if let Some(id) = video.filter(|id| is_video_id(id)) {
            return Some(ParsedInput::VideoId(id));
        }
    }

    for prefix in ["/embed/", "/shorts/", "/live/"] {
        if let Some(id) = path.strip_prefix(prefix).and_then(video_id_prefix) {
            return Some(ParsedInput::VideoId(id.to_string()));
        }
    }

    if let Some(rest) = path.strip_prefix("/channel/UC") {
        let tail = leading_run(rest, |c| is_word_char(c) || c == '-');
        if !tail.is_empty() {
            return Some(ParsedInput::ChannelId(format!("UC{}", tail)));
        }
    }

    if let Some(handle) = path.strip_prefix("/@").map(|rest| leading_run(rest, is_name_char)) {
        if !handle.is_empty() {
            return Some(ParsedInput::Handle(handle.to_string()));
        }
    }

    if let Some(name) = path.strip_prefix("/c/").map(|rest| leading_run(rest, is_name_char)) {
        if !name.is_empty() {
            return Some(ParsedInput::CustomName(name.to_string()));
        }
    }

    if let Some(name) = path.strip_prefix("/user/").map(|rest| leading_run(rest, is_name_char)) {
        if !name.is_empty() {
            return Some(ParsedInput::Username(name.to_string()));
        }
    }

    let segment = path.strip_prefix('/').unwrap_or(path);
    if !segment.is_empty()
        && segment.chars().all(is_name_char)
        && !RESERVED_PATHS.contains(&segment)
    {
        return Some(ParsedInput::Handle(segment.to_string()));
    }

    None
}

pub fn is_video_id(value: &str) -> bool {
    value.len() == VIDEO_ID_LEN && value.chars().all(is_video_id_char)
}

/// The first 11 characters when they have the id shape; trailing text is ignored.
fn video_id_prefix(value: &str) -> Option<&str> {
    let bytes = value.as_bytes();
    if bytes.len() < VIDEO_ID_LEN {
        return None;
    }
    if bytes[..VIDEO_ID_LEN]
        .iter()
        .all(|b| is_video_id_char(char::from(*b)))
    {
        Some(&value[..VIDEO_ID_LEN])
    } else {
        None
    }
}

fn leading_run(value: &str, pred: impl Fn(char) -> bool) -> &str {
    let end = value
        .char_indices()
        .find(|(_, c)| !pred(*c))
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    &value[..end]
}

fn is_video_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_name_char(c: char) -> bool {
    is_word_char(c) || c == '.' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(v: &str) -> ParsedInput {
        ParsedInput::VideoId(v.to_string())
    }

    fn handle(v: &str) -> ParsedInput {
        ParsedInput::Handle(v.to_string())
    }

    #[test]
    fn resolves_table_of_inputs() {
        let cases: Vec<(&str, ParsedInput)> = vec![
            ("https://youtu.be/dQw4w9WgXcQ", video("dQw4w9WgXcQ")),
            ("https://youtu.be/dQw4w9WgXcQ?t=42", video("dQw4w9WgXcQ")),
            ("youtu.be/dQw4w9WgXcQ", video("dQw4w9WgXcQ")),
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", video("dQw4w9WgXcQ")),
            ("https://m.youtube.com/watch?list=x&v=dQw4w9WgXcQ", video("dQw4w9WgXcQ")),
            ("https://music.youtube.com/watch?v=dQw4w9WgXcQ", video("dQw4w9WgXcQ")),
            ("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ", video("dQw4w9WgXcQ")),
            ("https://youtube.com/shorts/dQw4w9WgXcQ", video("dQw4w9WgXcQ")),
            ("https://youtube.com/live/dQw4w9WgXcQ?feature=share", video("dQw4w9WgXcQ")),
            ("dQw4w9WgXcQ", video("dQw4w9WgXcQ")),
            ("https://www.youtube.com/@MrBeast", handle("MrBeast")),
            ("https://www.youtube.com/@dr.sandra-lee/videos", handle("dr.sandra-lee")),
            (
                "https://youtube.com/channel/UCX6OQ3DkcsbYNE6H8uQQuVA",
                ParsedInput::ChannelId("UCX6OQ3DkcsbYNE6H8uQQuVA".to_string()),
            ),
            (
                "youtube.com/c/DrPimplePopper",
                ParsedInput::CustomName("DrPimplePopper".to_string()),
            ),
            (
                "https://www.youtube.com/user/pewdiepie",
                ParsedInput::Username("pewdiepie".to_string()),
            ),
            ("https://www.youtube.com/drmike", handle("drmike")),
            ("@somehandle", handle("somehandle")),
            ("  @somehandle  ", handle("somehandle")),
            (
                "not a url at all???",
                ParsedInput::Unknown("not a url at all???".to_string()),
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(parse_input(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn eleven_character_handle_is_read_as_video_id() {
        assert_eq!(parse_input("drsandralee"), video("drsandralee"));
    }

    #[test]
    fn reserved_paths_are_not_vanity_handles() {
        for path in RESERVED_PATHS {
            let input = format!("https://www.youtube.com/{}", path);
            assert!(matches!(parse_input(&input), ParsedInput::Unknown(_)), "{}", input);
        }
    }

    #[test]
    fn foreign_hosts_are_unknown() {
        assert!(matches!(
            parse_input("https://vimeo.com/123456"),
            ParsedInput::Unknown(_)
        ));
        assert!(matches!(
            parse_input("https://youtu.be/short"),
            ParsedInput::Unknown(_)
        ));
    }

    #[test]
    fn watch_without_valid_id_is_not_a_video() {
        assert!(!parse_input("https://www.youtube.com/watch?v=tooshort").is_video());
    }

    #[test]
    fn channel_path_requires_uc_prefix() {
        assert!(matches!(
            parse_input("https://www.youtube.com/channel/XX123"),
            ParsedInput::Unknown(_)
        ));
    }

    #[test]
    fn video_and_channel_helpers() {
        assert!(video("dQw4w9WgXcQ").is_video());
        assert!(!video("dQw4w9WgXcQ").is_channel());
        assert!(handle("x").is_channel());
        assert!(ParsedInput::CustomName("x".into()).is_channel());
        assert!(!ParsedInput::Unknown("x".into()).is_channel());
    }

    #[test]
    fn serializes_as_tagged_variant() {
        let json = serde_json::to_value(handle("MrBeast")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "handle", "value": "MrBeast"}));
    }
}
