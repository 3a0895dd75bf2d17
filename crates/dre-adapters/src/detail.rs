//! Detail-page scraping: render, locate the entity-identification section and
//! apply the profile's field patterns to its text.

use chrono::Utc;
use dre_core::ProcedureDetail;
use dre_storage::{ArtifactStore, StoredArtifact};
use scraper::{ElementRef, Html, Node};
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

use crate::profile::{CompiledProfile, ExtractionProfile, ProfileError};
use crate::render::{PageRenderer, RenderError, RenderPlan, RenderSettings};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("no identification section found on {url}")]
    NotFound { url: String },
    #[error("invalid extraction profile: {0}")]
    Profile(#[from] ProfileError),
}

/// Outcome of one successful scrape.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub detail: ProcedureDetail,
    pub debug_artifact: Option<StoredArtifact>,
}

/// Elements a section can be read from, nearest first.
const CONTAINER_TAGS: [&str; 5] = ["div", "section", "article", "main", "body"];

/// Text under these elements is never part of the visible document.
const IGNORED_TAGS: [&str; 6] = ["head", "title", "script", "style", "noscript", "template"];

pub struct DetailScraper {
    renderer: Box<dyn PageRenderer>,
    profile: CompiledProfile,
    plan: RenderPlan,
    debug_store: Option<ArtifactStore>,
}

impl DetailScraper {
    pub fn new(renderer: Box<dyn PageRenderer>, profile: CompiledProfile, settings: RenderSettings) -> Self {
        let plan = RenderPlan::new(settings, profile.markers().to_vec());
        Self {
            renderer,
            profile,
            plan,
            debug_store: None,
        }
    }

    pub fn from_profile(
        renderer: Box<dyn PageRenderer>,
        profile: &ExtractionProfile,
        settings: RenderSettings,
    ) -> Result<Self, ScrapeError> {
        Ok(Self::new(renderer, profile.compile()?, settings))
    }

    /// Persist every rendered page under `store` (kind `detail`).
    pub fn with_debug_store(mut self, store: ArtifactStore) -> Self {
        self.debug_store = Some(store);
        self
    }

    pub fn profile(&self) -> &CompiledProfile {
        &self.profile
    }

    pub async fn scrape(&self, url: &str) -> Result<ScrapedPage, ScrapeError> {
        let span = info_span!("detail_scrape", url);
        async {
            let html = self.renderer.render(url, &self.plan).await?;
            let debug_artifact = self.store_debug_page(&html).await;

            let detail = extract_detail(&html, &self.profile).ok_or_else(|| ScrapeError::NotFound {
                url: url.to_string(),
            })?;

            let missing = detail.missing_fields();
            if !missing.is_empty() {
                debug!(
                    missing = ?missing.iter().map(|f| f.key()).collect::<Vec<_>>(),
                    "fields without a pattern match"
                );
            }
            Ok(ScrapedPage {
                detail,
                debug_artifact,
            })
        }
        .instrument(span)
        .await
    }

    async fn store_debug_page(&self, html: &str) -> Option<StoredArtifact> {
        let store = self.debug_store.as_ref()?;
        match store
            .store_bytes(Utc::now(), "detail", "html", html.as_bytes())
            .await
        {
            Ok(artifact) => {
                debug!(path = %artifact.relative_path.display(), "rendered page stored");
                Some(artifact)
            }
            Err(err) => {
                warn!(error = %err, "could not persist rendered page");
                None
            }
        }
    }
}

/// Locate the identification section in `html` and extract every profile field.
/// `None` when no marker variant occurs in the visible text.
pub fn extract_detail(html: &str, profile: &CompiledProfile) -> Option<ProcedureDetail> {
    let block = locate_section_text(html, profile)?;
    Some(extract_fields(&block, profile))
}

/// Text of the nearest container enclosing the first marker hit, one trimmed
/// line per text node. Markers are tried in profile order.
pub fn locate_section_text(html: &str, profile: &CompiledProfile) -> Option<String> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    for marker in profile.markers() {
        let anchor = root.descendants().find(|node| match node.value() {
            Node::Text(text) => marker.is_match(text) && !is_hidden(node.parent().and_then(ElementRef::wrap)),
            _ => false,
        });
        let Some(anchor) = anchor else {
            continue;
        };
        let container = anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| CONTAINER_TAGS.contains(&el.value().name()))?;
        return Some(block_text(container));
    }
    None
}

fn is_hidden(parent: Option<ElementRef<'_>>) -> bool {
    let Some(parent) = parent else {
        return false;
    };
    std::iter::once(parent)
        .chain(parent.ancestors().filter_map(ElementRef::wrap))
        .any(|el| IGNORED_TAGS.contains(&el.value().name()))
}

fn block_text(container: ElementRef<'_>) -> String {
    container
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) if !is_hidden(node.parent().and_then(ElementRef::wrap)) => Some(text.trim()),
            _ => None,
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply every field pattern to `block`. A pattern that does not match leaves
/// its field `None` without affecting the others.
pub fn extract_fields(block: &str, profile: &CompiledProfile) -> ProcedureDetail {
    let mut detail = ProcedureDetail::new(block);
    for (field, regex) in profile.fields() {
        let value = regex
            .captures(block)
            .and_then(|caps| caps.get(1))
            .map(|m| collapse_whitespace(m.as_str()))
            .filter(|v| !v.is_empty());
        detail.set(*field, value);
    }
    detail
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FixtureRenderer;
    use dre_core::DetailField;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>IDENTIFICAÇÃO - Diário da República</title>
<script>var label = "1 - IDENTIFICAÇÃO E CONTACTOS DA ENTIDADE ADJUDICANTE";</script></head>
<body>
  <nav><div>Pesquisa</div></nav>
  <div id="anuncio">
    <p><b>1 - IDENTIFICAÇÃO E CONTACTOS DA ENTIDADE ADJUDICANTE</b></p>
    <p>Designação da entidade adjudicante: Município   de Braga</p>
    <p>NIPC: 506901173</p>
    <p>Distrito: Braga</p>
    <p>Concelho: Braga</p>
    <p><span>Endereço Eletrónico:</span> <span>compras@cm-braga.pt</span></p>
    <p>Designação do contrato: Aquisição de serviços de limpeza</p>
    <p>Preço base s/IVA: 125 000,00 EUR</p>
    <p>Prazo para apresentação das propostas: 30-10-2026 17:00</p>
    <p>28 - IDENTIFICAÇÃO DO(S) AUTOR(ES) DE ANÚNCIO</p>
    <p>Nome: Ana Sousa</p>
    <p>Cargo: Diretora Municipal</p>
    <p>Data de Envio do Anúncio: 14-10-2026</p>
  </div>
</body>
</html>"#;

    fn profile() -> CompiledProfile {
        ExtractionProfile::default().compile().unwrap()
    }

    #[test]
    fn extracts_fields_from_enclosing_container() {
        let detail = extract_detail(PAGE, &profile()).expect("section found");
        assert_eq!(detail.nipc.as_deref(), Some("506901173"));
        assert_eq!(detail.contracting_entity.as_deref(), Some("Município de Braga"));
        assert_eq!(detail.email.as_deref(), Some("compras@cm-braga.pt"));
        assert_eq!(detail.contract_title.as_deref(), Some("Aquisição de serviços de limpeza"));
        assert_eq!(detail.proposal_deadline.as_deref(), Some("30-10-2026 17:00"));
        assert_eq!(detail.author_name.as_deref(), Some("Ana Sousa"));
        assert_eq!(detail.author_role.as_deref(), Some("Diretora Municipal"));
        assert_eq!(detail.sent_date.as_deref(), Some("14-10-2026"));
        assert_eq!(detail.parish, None);
        assert!(!detail.full_text.contains("Pesquisa"));
        assert!(detail
            .full_text
            .starts_with("1 - IDENTIFICAÇÃO E CONTACTOS DA ENTIDADE ADJUDICANTE\n"));
    }

    #[test]
    fn nipc_is_exact_and_its_absence_affects_nothing_else() {
        let profile = profile();
        let with = extract_fields("NIPC: 123456789\nDistrito: Lisboa", &profile);
        assert_eq!(with.nipc.as_deref(), Some("123456789"));

        let without = extract_fields("Distrito: Lisboa", &profile);
        assert_eq!(without.nipc, None);
        assert_eq!(without.district, with.district);
        assert_eq!(
            without.missing_fields().len(),
            with.missing_fields().len() + 1
        );
    }

    #[test]
    fn page_without_any_marker_is_not_found() {
        let html = "<html><body><div><p>Anúncio sem secção</p><p>NIPC: 1</p></div></body></html>";
        assert!(extract_detail(html, &profile()).is_none());
    }

    #[test]
    fn markers_in_head_or_scripts_are_ignored() {
        let html = r#"<html><head><title>IDENTIFICAÇÃO</title></head>
<body><script>"IDENTIFICAÇÃO"</script><div><p>NIPC: 1</p></div></body></html>"#;
        assert!(extract_detail(html, &profile()).is_none());
    }

    #[test]
    fn less_specific_marker_is_used_as_fallback() {
        let html = "<html><body><section><h2>Identificação</h2><p>NIPC: 777</p></section></body></html>";
        let detail = extract_detail(html, &profile()).expect("fallback marker");
        assert_eq!(detail.get(DetailField::Nipc), Some("777"));
        assert_eq!(detail.full_text, "Identificação\nNIPC: 777");
    }

    #[test]
    fn whitespace_runs_collapse_to_single_spaces() {
        assert_eq!(collapse_whitespace("  a \t b\u{a0}\n c "), "a b c");
    }

    #[tokio::test]
    async fn scraper_reports_not_found_and_stores_debug_pages() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FixtureRenderer::new()
            .with_page("https://dre/1", PAGE)
            .with_page("https://dre/2", "<html><body><div>vazio</div></body></html>");
        let scraper = DetailScraper::from_profile(
            Box::new(renderer),
            &ExtractionProfile::default(),
            RenderSettings::default(),
        )
        .unwrap()
        .with_debug_store(ArtifactStore::new(dir.path()));

        let page = scraper.scrape("https://dre/1").await.unwrap();
        assert_eq!(page.detail.nipc.as_deref(), Some("506901173"));
        let artifact = page.debug_artifact.expect("debug artifact");
        assert!(artifact.absolute_path.exists());

        assert!(matches!(
            scraper.scrape("https://dre/2").await,
            Err(ScrapeError::NotFound { .. })
        ));
        assert!(matches!(
            scraper.scrape("https://dre/3").await,
            Err(ScrapeError::Render(RenderError::NoPage { .. }))
        ));
    }
}
