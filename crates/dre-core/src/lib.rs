//! Core domain model for the gazette procurement tracker.
//!
//! Records are persisted with the legacy JSON key names (`numero_procedimento`,
//! `entidade`, `preco_base`, ...) so files written by older runs stay readable.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "dre-core";

/// Procedure number used when a title carries no `n.º <digits>/<year>` reference.
pub const NOT_AVAILABLE: &str = "N/A";

/// One `item` element of the upstream feed, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFeedItem {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub published_at: Option<String>,
}

/// Identity-bearing part of a procedure, derived from the feed item alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureBasic {
    #[serde(rename = "numero_procedimento")]
    pub procedure_number: String,
    #[serde(rename = "entidade")]
    pub entity_name: String,
    pub link: String,
}

impl ProcedureBasic {
    pub fn has_procedure_number(&self) -> bool {
        let number = self.procedure_number.trim();
        !number.is_empty() && number != NOT_AVAILABLE
    }

    /// `(procedure number, entity)` when the number is known, the link otherwise.
    pub fn identity_key(&self) -> IdentityKey {
        if self.has_procedure_number() {
            IdentityKey::Procedure {
                number: self.procedure_number.trim().to_string(),
                entity: self.entity_name.trim().to_string(),
            }
        } else {
            IdentityKey::Link(self.link.trim().to_string())
        }
    }
}

/// Deduplication key of the active registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentityKey {
    Procedure { number: String, entity: String },
    Link(String),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Procedure { number, entity } => write!(f, "procedure:{number}|{entity}"),
            IdentityKey::Link(url) => write!(f, "link:{url}"),
        }
    }
}

/// Named fields scraped from the entity-identification section of a detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailField {
    #[serde(rename = "entidade_adjudicante")]
    ContractingEntity,
    Nipc,
    #[serde(rename = "distrito")]
    District,
    #[serde(rename = "concelho")]
    Municipality,
    #[serde(rename = "freguesia")]
    Parish,
    #[serde(rename = "site")]
    Website,
    Email,
    #[serde(rename = "designacao_contrato")]
    ContractTitle,
    #[serde(rename = "descricao")]
    Description,
    #[serde(rename = "preco_base")]
    BasePrice,
    #[serde(rename = "prazo_execucao")]
    ExecutionTerm,
    #[serde(rename = "prazo_apresentacao_propostas")]
    ProposalDeadline,
    #[serde(rename = "fundos_eu")]
    EuFunding,
    #[serde(rename = "plataforma_eletronica")]
    Platform,
    #[serde(rename = "url_procedimento")]
    SubmissionUrl,
    #[serde(rename = "autor_nome")]
    AuthorName,
    #[serde(rename = "autor_cargo")]
    AuthorRole,
    #[serde(rename = "data_envio_anuncio")]
    SentDate,
}

impl DetailField {
    pub const ALL: [DetailField; 18] = [
        DetailField::ContractingEntity,
        DetailField::Nipc,
        DetailField::District,
        DetailField::Municipality,
        DetailField::Parish,
        DetailField::Website,
        DetailField::Email,
        DetailField::ContractTitle,
        DetailField::Description,
        DetailField::BasePrice,
        DetailField::ExecutionTerm,
        DetailField::ProposalDeadline,
        DetailField::EuFunding,
        DetailField::Platform,
        DetailField::SubmissionUrl,
        DetailField::AuthorName,
        DetailField::AuthorRole,
        DetailField::SentDate,
    ];

    /// JSON key used in persisted records.
    pub fn key(self) -> &'static str {
        match self {
            DetailField::ContractingEntity => "entidade_adjudicante",
            DetailField::Nipc => "nipc",
            DetailField::District => "distrito",
            DetailField::Municipality => "concelho",
            DetailField::Parish => "freguesia",
            DetailField::Website => "site",
            DetailField::Email => "email",
            DetailField::ContractTitle => "designacao_contrato",
            DetailField::Description => "descricao",
            DetailField::BasePrice => "preco_base",
            DetailField::ExecutionTerm => "prazo_execucao",
            DetailField::ProposalDeadline => "prazo_apresentacao_propostas",
            DetailField::EuFunding => "fundos_eu",
            DetailField::Platform => "plataforma_eletronica",
            DetailField::SubmissionUrl => "url_procedimento",
            DetailField::AuthorName => "autor_nome",
            DetailField::AuthorRole => "autor_cargo",
            DetailField::SentDate => "data_envio_anuncio",
        }
    }

    /// Human label, as printed on the gazette page.
    pub fn label(self) -> &'static str {
        match self {
            DetailField::ContractingEntity => "Entidade adjudicante",
            DetailField::Nipc => "NIPC",
            DetailField::District => "Distrito",
            DetailField::Municipality => "Concelho",
            DetailField::Parish => "Freguesia",
            DetailField::Website => "Endereço da Entidade",
            DetailField::Email => "Endereço Eletrónico",
            DetailField::ContractTitle => "Designação do contrato",
            DetailField::Description => "Descrição",
            DetailField::BasePrice => "Preço base s/IVA",
            DetailField::ExecutionTerm => "Prazo de execução",
            DetailField::ProposalDeadline => "Prazo para apresentação das propostas",
            DetailField::EuFunding => "Fundos EU",
            DetailField::Platform => "Plataforma eletrónica",
            DetailField::SubmissionUrl => "URL para Apresentação",
            DetailField::AuthorName => "Autor do anúncio",
            DetailField::AuthorRole => "Cargo do autor",
            DetailField::SentDate => "Data de envio do anúncio",
        }
    }
}

impl fmt::Display for DetailField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Structured detail of one procedure. Every field is independently optional;
/// `full_text` is the verbatim text of the section the fields were read from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcedureDetail {
    #[serde(rename = "detalhes_completos")]
    pub full_text: String,
    #[serde(rename = "entidade_adjudicante")]
    pub contracting_entity: Option<String>,
    pub nipc: Option<String>,
    #[serde(rename = "distrito")]
    pub district: Option<String>,
    #[serde(rename = "concelho")]
    pub municipality: Option<String>,
    #[serde(rename = "freguesia")]
    pub parish: Option<String>,
    #[serde(rename = "site")]
    pub website: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "designacao_contrato")]
    pub contract_title: Option<String>,
    #[serde(rename = "descricao")]
    pub description: Option<String>,
    #[serde(rename = "preco_base")]
    pub base_price: Option<String>,
    #[serde(rename = "prazo_execucao")]
    pub execution_term: Option<String>,
    #[serde(rename = "prazo_apresentacao_propostas")]
    pub proposal_deadline: Option<String>,
    #[serde(rename = "fundos_eu")]
    pub eu_funding: Option<String>,
    #[serde(rename = "plataforma_eletronica")]
    pub platform: Option<String>,
    #[serde(rename = "url_procedimento")]
    pub submission_url: Option<String>,
    #[serde(rename = "autor_nome")]
    pub author_name: Option<String>,
    #[serde(rename = "autor_cargo")]
    pub author_role: Option<String>,
    #[serde(rename = "data_envio_anuncio")]
    pub sent_date: Option<String>,
}

impl ProcedureDetail {
    pub fn new(full_text: impl Into<String>) -> Self {
        Self {
            full_text: full_text.into(),
            ..Self::default()
        }
    }

    fn slot(&self, field: DetailField) -> &Option<String> {
        match field {
            DetailField::ContractingEntity => &self.contracting_entity,
            DetailField::Nipc => &self.nipc,
            DetailField::District => &self.district,
            DetailField::Municipality => &self.municipality,
            DetailField::Parish => &self.parish,
            DetailField::Website => &self.website,
            DetailField::Email => &self.email,
            DetailField::ContractTitle => &self.contract_title,
            DetailField::Description => &self.description,
            DetailField::BasePrice => &self.base_price,
            DetailField::ExecutionTerm => &self.execution_term,
            DetailField::ProposalDeadline => &self.proposal_deadline,
            DetailField::EuFunding => &self.eu_funding,
            DetailField::Platform => &self.platform,
            DetailField::SubmissionUrl => &self.submission_url,
            DetailField::AuthorName => &self.author_name,
            DetailField::AuthorRole => &self.author_role,
            DetailField::SentDate => &self.sent_date,
        }
    }

    fn slot_mut(&mut self, field: DetailField) -> &mut Option<String> {
        match field {
            DetailField::ContractingEntity => &mut self.contracting_entity,
            DetailField::Nipc => &mut self.nipc,
            DetailField::District => &mut self.district,
            DetailField::Municipality => &mut self.municipality,
            DetailField::Parish => &mut self.parish,
            DetailField::Website => &mut self.website,
            DetailField::Email => &mut self.email,
            DetailField::ContractTitle => &mut self.contract_title,
            DetailField::Description => &mut self.description,
            DetailField::BasePrice => &mut self.base_price,
            DetailField::ExecutionTerm => &mut self.execution_term,
            DetailField::ProposalDeadline => &mut self.proposal_deadline,
            DetailField::EuFunding => &mut self.eu_funding,
            DetailField::Platform => &mut self.platform,
            DetailField::SubmissionUrl => &mut self.submission_url,
            DetailField::AuthorName => &mut self.author_name,
            DetailField::AuthorRole => &mut self.author_role,
            DetailField::SentDate => &mut self.sent_date,
        }
    }

    pub fn get(&self, field: DetailField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set(&mut self, field: DetailField, value: Option<String>) {
        *self.slot_mut(field) = value;
    }

    pub fn missing_fields(&self) -> Vec<DetailField> {
        DetailField::ALL
            .into_iter()
            .filter(|f| self.slot(*f).is_none())
            .collect()
    }
}

/// Unit stored in snapshots and in the active registry. `detail` is absent when
/// the detail page could not be scraped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureRecord {
    #[serde(flatten)]
    pub basic: ProcedureBasic,
    #[serde(flatten)]
    pub detail: Option<ProcedureDetail>,
}

impl ProcedureRecord {
    pub fn basic_only(basic: ProcedureBasic) -> Self {
        Self {
            basic,
            detail: None,
        }
    }

    pub fn with_detail(basic: ProcedureBasic, detail: ProcedureDetail) -> Self {
        Self {
            basic,
            detail: Some(detail),
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        self.basic.identity_key()
    }

    pub fn has_detail(&self) -> bool {
        self.detail.is_some()
    }

    pub fn detail_value(&self, field: DetailField) -> Option<&str> {
        self.detail.as_ref().and_then(|d| d.get(field))
    }
}
