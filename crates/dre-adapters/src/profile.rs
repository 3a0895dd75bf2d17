//! Section markers and per-field label patterns for detail-page extraction.
//!
//! The built-in profile matches the gazette's current markup. A YAML file can
//! replace the marker list and override or add field rules without touching
//! the extraction code:
//!
//! ```yaml
//! section_markers:
//!   - "1 - IDENTIFICAÇÃO E CONTACTOS DA ENTIDADE ADJUDICANTE"
//! fields:
//!   - field: nipc
//!     pattern: 'NIF:\s*(\d+)'
//! ```

use std::path::Path;

use anyhow::Context;
use dre_core::DetailField;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile has no section markers")]
    NoMarkers,
    #[error("invalid pattern for {field}: {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error("pattern for {field} has no capture group")]
    MissingCapture { field: DetailField },
    #[error("parsing profile YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: DetailField,
    pub pattern: String,
}

/// Ordered marker variants (most specific first) plus one rule per field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionProfile {
    pub section_markers: Vec<String>,
    pub fields: Vec<FieldRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProfileOverrides {
    #[serde(default)]
    section_markers: Vec<String>,
    #[serde(default)]
    fields: Vec<FieldRule>,
}

const DEFAULT_MARKERS: [&str; 3] = [
    "1 - IDENTIFICAÇÃO E CONTACTOS DA ENTIDADE ADJUDICANTE",
    "IDENTIFICAÇÃO E CONTACTOS DA ENTIDADE ADJUDICANTE",
    "IDENTIFICAÇÃO",
];

const DEFAULT_RULES: [(DetailField, &str); 18] = [
    (DetailField::ContractingEntity, r"Designação da entidade adjudicante:\s*(.+)"),
    (DetailField::Nipc, r"NIPC:\s*(\d+)"),
    (DetailField::District, r"Distrito:\s*(.+)"),
    (DetailField::Municipality, r"Concelho:\s*(.+)"),
    (DetailField::Parish, r"Freguesia:\s*(.+)"),
    (DetailField::Website, r"Endereço da Entidade \(URL\):\s*(.+)"),
    (DetailField::Email, r"Endereço Eletrónico:\s*(.+)"),
    (DetailField::ContractTitle, r"Designação do contrato:\s*(.+)"),
    (DetailField::Description, r"Descrição:\s*(.+)"),
    (DetailField::BasePrice, r"Preço base s/IVA:\s*(.+)"),
    (DetailField::ExecutionTerm, r"Prazo de execução do contrato:\s*(.+)"),
    (DetailField::ProposalDeadline, r"Prazo para apresentação das propostas:\s*(.+)"),
    (DetailField::EuFunding, r"Têm fundos EU\?\s*(.+)"),
    (
        DetailField::Platform,
        r"Plataforma eletrónica utilizada pela entidade adjudicante:\s*(.+)",
    ),
    (DetailField::SubmissionUrl, r"URL para Apresentação:\s*(.+)"),
    (
        DetailField::AuthorName,
        r"28 - IDENTIFICAÇÃO DO\(S\) AUTOR\(ES\) DE ANÚNCIO\nNome:\s*(.+)",
    ),
    (DetailField::AuthorRole, r"Cargo:\s*(.+)"),
    (DetailField::SentDate, r"Data de Envio do Anúncio:\s*(\d{1,2}-\d{1,2}-\d{4})"),
];

impl Default for ExtractionProfile {
    fn default() -> Self {
        Self {
            section_markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
            fields: DEFAULT_RULES
                .iter()
                .map(|(field, pattern)| FieldRule {
                    field: *field,
                    pattern: pattern.to_string(),
                })
                .collect(),
        }
    }
}

impl ExtractionProfile {
    /// Default profile with the overrides in `text` applied.
    pub fn from_yaml_str(text: &str) -> Result<Self, ProfileError> {
        let overrides: ProfileOverrides = serde_yaml::from_str(text)?;
        Ok(Self::default().with_overrides(overrides))
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    fn with_overrides(mut self, overrides: ProfileOverrides) -> Self {
        if !overrides.section_markers.is_empty() {
            self.section_markers = overrides.section_markers;
        }
        for rule in overrides.fields {
            match self.fields.iter_mut().find(|r| r.field == rule.field) {
                Some(existing) => existing.pattern = rule.pattern,
                None => self.fields.push(rule),
            }
        }
        self
    }

    /// Compile all patterns; any invalid pattern rejects the whole profile.
    pub fn compile(&self) -> Result<CompiledProfile, ProfileError> {
        if self.section_markers.is_empty() {
            return Err(ProfileError::NoMarkers);
        }

        let markers = self
            .section_markers
            .iter()
            .map(|marker| {
                Regex::new(&format!("(?i){}", regex::escape(marker.trim()))).map_err(|source| {
                    ProfileError::InvalidPattern {
                        field: format!("section marker {marker:?}"),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut fields = Vec::with_capacity(self.fields.len());
        for rule in &self.fields {
            let regex = Regex::new(&rule.pattern).map_err(|source| ProfileError::InvalidPattern {
                field: rule.field.to_string(),
                source,
            })?;
            if regex.captures_len() < 2 {
                return Err(ProfileError::MissingCapture { field: rule.field });
            }
            fields.push((rule.field, regex));
        }

        Ok(CompiledProfile { markers, fields })
    }
}

/// Ready-to-use profile: case-insensitive marker regexes and field regexes.
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    markers: Vec<Regex>,
    fields: Vec<(DetailField, Regex)>,
}

impl CompiledProfile {
    pub fn markers(&self) -> &[Regex] {
        &self.markers
    }

    pub fn fields(&self) -> &[(DetailField, Regex)] {
        &self.fields
    }
}
