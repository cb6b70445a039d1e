//! Parsing of hub delivery payloads.
//!
//! The hub posts the channel's Atom feed with a single `entry` for a new or
//! updated video, or an `at:deleted-entry` tombstone when a video is removed.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::domain::FeedEntry;

/// Why a payload produced no entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryError {
    #[error("Entry is not found")]
    NotFound,

    #[error("Entry deleted")]
    Deleted,

    #[error("Entry field is missing: {0}")]
    FieldsMissing(&'static str),
}

impl EntryError {
    pub fn code(&self) -> &'static str {
        match self {
            EntryError::NotFound => "ENTRY_NOT_FOUND",
            EntryError::Deleted => "ENTRY_DELETED",
            EntryError::FieldsMissing(_) => "FIELDS_MISSING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    VideoId,
    ChannelId,
    Title,
    Author,
    Published,
}

#[derive(Default)]
struct EntryFields {
    video_id: Option<String>,
    channel_id: Option<String>,
    title: Option<String>,
    author: Option<String>,
    published: Option<String>,
}

impl EntryFields {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::VideoId => &mut self.video_id,
            Field::ChannelId => &mut self.channel_id,
            Field::Title => &mut self.title,
            Field::Author => &mut self.author,
            Field::Published => &mut self.published,
        }
    }

    fn into_entry(self) -> Result<FeedEntry, EntryError> {
        let id = non_empty(self.video_id).ok_or(EntryError::FieldsMissing("yt:videoId"))?;
        let channel_id =
            non_empty(self.channel_id).ok_or(EntryError::FieldsMissing("yt:channelId"))?;
        let title = self.title.ok_or(EntryError::FieldsMissing("title"))?;
        let channel_title = self.author.ok_or(EntryError::FieldsMissing("author"))?;
        let published_at = self
            .published
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(EntryError::FieldsMissing("published"))?;

        Ok(FeedEntry {
            id,
            title,
            channel_id,
            channel_title,
            published_at,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Before,
    Inside,
    Done,
}

/// Walks the element tree once, tracking only what the first root-level
/// `entry` needs.
struct Walk {
    path: Vec<Vec<u8>>,
    entry: EntryState,
    deleted: bool,
    in_author: bool,
    author_seen: bool,
    capture: Option<(Field, usize, String)>,
    fields: EntryFields,
}

impl Walk {
    fn new() -> Self {
        Self {
            path: Vec::new(),
            entry: EntryState::Before,
            deleted: false,
            in_author: false,
            author_seen: false,
            capture: None,
            fields: EntryFields::default(),
        }
    }

    fn open(&mut self, start: &BytesStart, empty: bool) {
        let name = start.name().as_ref().to_vec();
        let depth = self.path.len();

        match (depth, self.entry) {
            (1, EntryState::Before) if name == b"entry" => self.entry = EntryState::Inside,
            (1, _) if name == b"at:deleted-entry" => self.deleted = true,
            (2, EntryState::Inside) => {
                let field = match name.as_slice() {
                    b"yt:videoId" => Some(Field::VideoId),
                    b"yt:channelId" => Some(Field::ChannelId),
                    b"title" => Some(Field::Title),
                    b"published" => Some(Field::Published),
                    b"author" if !self.author_seen => {
                        self.author_seen = true;
                        self.in_author = !empty;
                        None
                    }
                    _ => None,
                };
                if let Some(field) = field {
                    self.begin(field, depth, empty);
                }
            }
            (3, EntryState::Inside) if self.in_author && name == b"name" => {
                self.begin(Field::Author, depth, empty);
            }
            _ => {}
        }

        if empty {
            if depth == 1 && self.entry == EntryState::Inside {
                self.entry = EntryState::Done;
            }
        } else {
            self.path.push(name);
        }
    }

    fn begin(&mut self, field: Field, depth: usize, empty: bool) {
        if self.fields.slot(field).is_some() {
            return;
        }
        if empty {
            *self.fields.slot(field) = Some(String::new());
        } else if self.capture.is_none() {
            self.capture = Some((field, depth, String::new()));
        }
    }

    fn text(&mut self, text: &str) {
        if let Some((_, _, buf)) = self.capture.as_mut() {
            buf.push_str(text);
        }
    }

    fn close(&mut self) {
        self.path.pop();
        let depth = self.path.len();

        if matches!(self.capture, Some((_, at, _)) if at == depth) {
            if let Some((field, _, value)) = self.capture.take() {
                *self.fields.slot(field) = Some(value);
            }
        }
        if depth == 2 {
            self.in_author = false;
        }
        if depth == 1 && self.entry == EntryState::Inside {
            self.entry = EntryState::Done;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryParser;

impl EntryParser {
    pub fn new() -> Self {
        Self
    }

    /// Extracts the video entry from a delivery body.
    ///
    /// Never panics on arbitrary input; unreadable XML is reported as
    /// [`EntryError::NotFound`].
    pub fn parse(&self, body: &[u8]) -> Result<FeedEntry, EntryError> {
        let mut reader = Reader::from_reader(body);
        reader.config_mut().trim_text(true);

        let mut walk = Walk::new();
        let mut buf = Vec::new();

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => {
                    tracing::debug!(
                        "Unreadable delivery at position {}: {}",
                        reader.buffer_position(),
                        e
                    );
                    return Err(EntryError::NotFound);
                }
            };

            match event {
                Event::Start(e) => walk.open(&e, false),
                Event::Empty(e) => walk.open(&e, true),
                Event::Text(t) => match t.unescape() {
                    Ok(text) => walk.text(&text),
                    Err(_) => return Err(EntryError::NotFound),
                },
                Event::CData(c) => walk.text(&String::from_utf8_lossy(&c)),
                Event::End(_) => walk.close(),
                Event::Eof => break,
                _ => {}
            }

            if walk.entry == EntryState::Done {
                break;
            }
            buf.clear();
        }

        match walk.entry {
            EntryState::Before if walk.deleted => Err(EntryError::Deleted),
            EntryState::Before => Err(EntryError::NotFound),
            EntryState::Inside => Err(EntryError::NotFound),
            EntryState::Done => walk.fields.into_entry(),
        }
    }
}
