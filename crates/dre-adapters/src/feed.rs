//! Syndication feed parsing into raw items, in document order.

use std::sync::LazyLock;

use dre_core::RawFeedItem;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use thiserror::Error;

/// A structurally invalid feed. No partial result is ever returned with it.
#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("malformed feed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },
    #[error("feed document has no root element")]
    Empty,
    #[error("feed document ended with {0} unclosed element(s)")]
    Unclosed(usize),
}

static CDATA_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("static CDATA regex"));

/// Removes literal `<![CDATA[...]]>` wrappers left inside already-unescaped text.
pub fn strip_cdata_markers(text: &str) -> String {
    CDATA_MARKERS.replace_all(text, "$1").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemField {
    Title,
    Link,
    Description,
    PubDate,
}

impl ItemField {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(ItemField::Title),
            b"link" => Some(ItemField::Link),
            b"description" => Some(ItemField::Description),
            b"pubDate" => Some(ItemField::PubDate),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ItemBuilder {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
}

impl ItemBuilder {
    fn set(&mut self, field: ItemField, value: String) {
        let slot = match field {
            ItemField::Title => &mut self.title,
            ItemField::Link => &mut self.link,
            ItemField::Description => &mut self.description,
            ItemField::PubDate => &mut self.pub_date,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    fn build(self) -> RawFeedItem {
        RawFeedItem {
            title: self.title.unwrap_or_default(),
            link: self.link.unwrap_or_default(),
            description: self.description.filter(|d| !d.is_empty()),
            published_at: self.pub_date.filter(|d| !d.is_empty()),
        }
    }
}

/// Accumulates the text of one field. CDATA content is kept verbatim; plain
/// text around it is trimmed and dropped when it is only whitespace.
#[derive(Debug, Default)]
struct FieldText {
    buf: String,
    has_cdata: bool,
}

impl FieldText {
    fn push_text(&mut self, text: &str) {
        if self.has_cdata && text.trim().is_empty() {
            return;
        }
        self.buf.push_str(text);
    }

    fn push_cdata(&mut self, text: &str) {
        if !self.has_cdata && self.buf.trim().is_empty() {
            self.buf.clear();
        }
        self.has_cdata = true;
        self.buf.push_str(text);
    }

    fn finish(self) -> String {
        if self.has_cdata {
            strip_cdata_markers(&self.buf)
        } else {
            strip_cdata_markers(self.buf.trim())
        }
    }
}

/// Parse `xml` into one [`RawFeedItem`] per `item` element.
///
/// `title`, `link`, `description` and `pubDate` are recognised by local name, so
/// namespaced feeds work too. Missing `description`/`pubDate` become `None`;
/// missing `title`/`link` become empty strings.
pub fn parse_feed(xml: &[u8]) -> Result<Vec<RawFeedItem>, FeedParseError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut root_closed = false;
    let mut current: Option<(ItemBuilder, usize)> = None;
    let mut open_field: Option<(ItemField, usize, FieldText)> = None;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => return Err(malformed(&reader, e)),
        };

        match event {
            Event::Start(_) | Event::Empty(_) if root_closed => {
                return Err(malformed(&reader, "element after the document root"));
            }
            Event::Start(e) => {
                depth += 1;
                saw_root = true;
                let local = e.local_name();
                match current.as_ref().map(|(_, item_depth)| *item_depth) {
                    None if local.as_ref() == b"item" => {
                        current = Some((ItemBuilder::default(), depth));
                    }
                    Some(item_depth) if open_field.is_none() && depth == item_depth + 1 => {
                        if let Some(field) = ItemField::from_local_name(local.as_ref()) {
                            open_field = Some((field, depth, FieldText::default()));
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                saw_root = true;
                if depth == 0 {
                    root_closed = true;
                }
                let local = e.local_name();
                match current.as_mut() {
                    None if local.as_ref() == b"item" => items.push(ItemBuilder::default().build()),
                    Some((builder, item_depth)) if open_field.is_none() && depth == *item_depth => {
                        if let Some(field) = ItemField::from_local_name(local.as_ref()) {
                            builder.set(field, String::new());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                let unescaped = e.unescape().map_err(|err| malformed(&reader, err))?;
                if root_closed && !unescaped.trim().is_empty() {
                    return Err(malformed(&reader, "text after the document root"));
                }
                if let Some((_, _, text)) = open_field.as_mut() {
                    text.push_text(&unescaped);
                }
            }
            Event::CData(e) => {
                if root_closed {
                    return Err(malformed(&reader, "CDATA after the document root"));
                }
                if let Some((_, _, text)) = open_field.as_mut() {
                    text.push_cdata(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                if matches!(&open_field, Some((_, field_depth, _)) if *field_depth == depth) {
                    if let (Some((field, _, text)), Some((builder, _))) = (open_field.take(), current.as_mut()) {
                        builder.set(field, text.finish());
                    }
                }
                if matches!(&current, Some((_, item_depth)) if *item_depth == depth) {
                    if let Some((builder, _)) = current.take() {
                        items.push(builder.build());
                    }
                }
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    root_closed = true;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(FeedParseError::Empty);
    }
    if depth != 0 {
        return Err(FeedParseError::Unclosed(depth));
    }
    Ok(items)
}

fn malformed<R>(reader: &Reader<R>, message: impl ToString) -> FeedParseError {
    FeedParseError::Malformed {
        position: reader.buffer_position() as u64,
        message: message.to_string(),
    }
}
