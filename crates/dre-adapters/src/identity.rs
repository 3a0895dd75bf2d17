//! Procedure identity from feed item titles.

use std::sync::LazyLock;

use dre_core::{ProcedureBasic, RawFeedItem, NOT_AVAILABLE};
use regex::Regex;

static PROCEDURE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"n\.º\s*(\d+)/\d{4}").expect("static procedure number regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureIdentity {
    pub procedure_number: String,
    pub entity_name: String,
}

/// First `n.º <digits>/<year>` in the title gives the number (`"N/A"` when
/// absent); the trimmed title is the entity name. The description is accepted
/// for symmetry with the feed item but not consulted.
pub fn extract_identity(title: &str, _description: Option<&str>) -> ProcedureIdentity {
    let procedure_number = PROCEDURE_NUMBER
        .captures(title)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    ProcedureIdentity {
        procedure_number,
        entity_name: title.trim().to_string(),
    }
}

/// Basic record for a feed item; `None` when the item has no link to follow.
pub fn basic_from_item(item: &RawFeedItem) -> Option<ProcedureBasic> {
    let link = item.link.trim();
    if link.is_empty() {
        return None;
    }
    let identity = extract_identity(&item.title, item.description.as_deref());
    Some(ProcedureBasic {
        procedure_number: identity.procedure_number,
        entity_name: identity.entity_name,
        link: link.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_number_from_standard_title() {
        let id = extract_identity(
            "  Anúncio de procedimento n.º 123/2024 - Município de Évora ",
            None,
        );
        assert_eq!(id.procedure_number, "123");
        assert_eq!(id.entity_name, "Anúncio de procedimento n.º 123/2024 - Município de Évora");
    }

    #[test]
    fn first_occurrence_wins() {
        let id = extract_identity("Retificação do n.º 77/2025 ao anúncio n.º 12/2025", None);
        assert_eq!(id.procedure_number, "77");
    }

    #[test]
    fn tolerates_space_after_ordinal() {
        let id = extract_identity("Anúncio de procedimento n.º 4512/2025", None);
        assert_eq!(id.procedure_number, "4512");
    }

    #[test]
    fn missing_pattern_yields_sentinel() {
        for title in [
            "Declaração de retificação de anúncio",
            "Anúncio n.º 12/25 - ano abreviado",
            "",
        ] {
            assert_eq!(extract_identity(title, Some("descr")).procedure_number, NOT_AVAILABLE);
        }
    }

    #[test]
    fn items_without_link_are_skipped() {
        let item = RawFeedItem {
            title: "Anúncio n.º 1/2025".into(),
            link: "  ".into(),
            description: None,
            published_at: None,
        };
        assert!(basic_from_item(&item).is_none());

        let item = RawFeedItem {
            link: " https://x/1 ".into(),
            ..item
        };
        let basic = basic_from_item(&item).unwrap();
        assert_eq!(basic.link, "https://x/1");
        assert_eq!(basic.procedure_number, "1");
    }
}
