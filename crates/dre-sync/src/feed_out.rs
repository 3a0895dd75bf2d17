//! RSS 2.0 rendering of the active registry.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dre_core::{DetailField, ProcedureRecord};
use dre_storage::write_atomic;
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::registry::ActiveRegistry;

/// Fields rendered into each item's description, in order.
pub const DESCRIPTION_FIELDS: [DetailField; 8] = [
    DetailField::ContractTitle,
    DetailField::ContractingEntity,
    DetailField::Nipc,
    DetailField::District,
    DetailField::BasePrice,
    DetailField::ProposalDeadline,
    DetailField::Platform,
    DetailField::SubmissionUrl,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedChannel {
    pub title: String,
    pub link: String,
    pub description: String,
}

impl Default for FeedChannel {
    fn default() -> Self {
        Self {
            title: "Procedimentos DRE - Ativos".to_string(),
            link: "https://files.diariodarepublica.pt".to_string(),
            description: "Procedimentos de contratação pública ativos publicados no Diário da República"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedGenerator {
    channel: FeedChannel,
}

impl FeedGenerator {
    pub fn new(channel: FeedChannel) -> Self {
        Self { channel }
    }

    /// One `item` per registry entry, in registry order. Output depends only on
    /// the registry content and `generated_at`.
    pub fn render(&self, registry: &ActiveRegistry, generated_at: DateTime<Utc>) -> Result<String> {
        let stamp = generated_at.to_rfc2822();
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .context("writing XML declaration")?;
        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        writer.write_event(Event::Start(rss)).context("opening rss")?;
        writer
            .write_event(Event::Start(BytesStart::new("channel")))
            .context("opening channel")?;

        text_element(&mut writer, "title", &self.channel.title)?;
        text_element(&mut writer, "link", &self.channel.link)?;
        text_element(&mut writer, "description", &self.channel.description)?;
        text_element(&mut writer, "lastBuildDate", &stamp)?;

        for record in registry.values() {
            writer
                .write_event(Event::Start(BytesStart::new("item")))
                .context("opening item")?;
            text_element(&mut writer, "title", &record.basic.entity_name)?;
            text_element(&mut writer, "link", &record.basic.link)?;
            text_element(&mut writer, "guid", &record.basic.link)?;
            text_element(&mut writer, "description", &item_description_html(record))?;
            text_element(&mut writer, "pubDate", &stamp)?;
            writer
                .write_event(Event::End(BytesEnd::new("item")))
                .context("closing item")?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("channel")))
            .context("closing channel")?;
        writer
            .write_event(Event::End(BytesEnd::new("rss")))
            .context("closing rss")?;

        String::from_utf8(writer.into_inner()).context("feed is not valid UTF-8")
    }

    pub async fn write(&self, registry: &ActiveRegistry, generated_at: DateTime<Utc>, path: &Path) -> Result<()> {
        let xml = self.render(registry, generated_at)?;
        write_atomic(path, xml.as_bytes())
            .await
            .with_context(|| format!("writing feed {}", path.display()))
    }
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("opening {name}"))?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .with_context(|| format!("writing {name} text"))?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("closing {name}"))?;
    Ok(())
}

/// Readable HTML for the detail fields of `record`; basic-only records get a
/// pointer to the announcement instead.
pub fn item_description_html(record: &ProcedureRecord) -> String {
    if !record.has_detail() {
        return format!(
            "<p>Procedimento n.º {}</p><p>Detalhes indisponíveis; consulte o anúncio.</p>",
            escape(record.basic.procedure_number.as_str())
        );
    }

    let mut html = String::new();
    for field in DESCRIPTION_FIELDS {
        let value = match field {
            DetailField::District => location(record),
            _ => record.detail_value(field).map(str::to_string),
        };
        let Some(value) = value else {
            continue;
        };
        let label = match field {
            DetailField::District => "Localização",
            _ => field.label(),
        };
        html.push_str(&format!(
            "<p><strong>{}:</strong> {}</p>",
            escape(label),
            escape(value.as_str())
        ));
    }
    if html.is_empty() {
        html.push_str("<p>Sem campos extraídos.</p>");
    }
    html
}

fn location(record: &ProcedureRecord) -> Option<String> {
    let parts: Vec<&str> = [DetailField::District, DetailField::Municipality]
        .into_iter()
        .filter_map(|f| record.detail_value(f))
        .collect();
    (!parts.is_empty()).then(|| parts.join(" / "))
}
