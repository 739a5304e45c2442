//! NLU dataset loading
//!
//! A directory holds one TOML file per language, named after the language
//! tag (`en-US.toml`, `es.toml`):
//!
//! ```toml
//! [intents.main.hello]
//! utterances = ["hello", "hi {person}"]
//! slots = { person = "name" }
//!
//! [entities.name]
//! data = [{ value = "Ana", synonyms = ["Anita"] }]
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vap_core::{
    EntityDefinition, EntityValue, IntentDefinition, LanguageTag, NluData, NluDataset,
    SlotDefinition, Utterance,
};

use crate::error::{Result, SkillError};

/// Intent scope uploaded to the registry
const MAIN_SCOPE: &str = "main";

/// Where a session gets its NLU dataset
#[derive(Debug, Clone, PartialEq)]
pub enum NluSource {
    /// A dataset built in code, uploaded as-is
    Dataset(NluDataset),
    /// Per-language TOML files, loaded for the registry's languages
    Directory(PathBuf),
}

impl NluSource {
    /// Produce the dataset to upload for the registry's languages
    pub fn resolve(&self, langs: &[LanguageTag]) -> Result<NluDataset> {
        match self {
            NluSource::Dataset(dataset) => Ok(dataset.clone()),
            NluSource::Directory(dir) => load_dir(dir, langs),
        }
    }
}

impl Default for NluSource {
    fn default() -> Self {
        NluSource::Dataset(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct LangFile {
    #[serde(default)]
    intents: HashMap<String, HashMap<String, IntentEntry>>,
    #[serde(default)]
    entities: HashMap<String, EntityEntry>,
}

#[derive(Debug, Deserialize)]
struct IntentEntry {
    utterances: Vec<String>,
    #[serde(default)]
    slots: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct EntityEntry {
    #[serde(default)]
    strict: bool,
    data: Vec<EntityValue>,
}

/// Languages a directory has files for
pub fn list_languages(dir: &Path) -> Result<Vec<LanguageTag>> {
    let mut langs: Vec<LanguageTag> = lang_files(dir)?.into_iter().map(|(tag, _)| tag).collect();
    langs.sort_by_key(|l| l.to_string());
    Ok(langs)
}

/// Load the files of `dir` whose language matches one of `langs`.
///
/// Files are returned in the order of `langs`; intents and entities are
/// sorted by name.
pub fn load_dir(dir: &Path, langs: &[LanguageTag]) -> Result<NluDataset> {
    let files = lang_files(dir)?;
    let mut dataset = Vec::new();

    for wanted in langs {
        let Some((tag, path)) = files.iter().find(|(tag, _)| tag.matches(wanted)) else {
            debug!("No NLU data for {} in {}", wanted, dir.display());
            continue;
        };
        if dataset.iter().any(|d: &NluData| &d.language == tag) {
            continue;
        }
        dataset.push(load_file(path, tag.clone())?);
    }

    info!(
        "Loaded NLU data for {} of {} languages from {}",
        dataset.len(),
        langs.len(),
        dir.display()
    );
    Ok(dataset)
}

/// Load one language file
pub fn load_file(path: &Path, language: LanguageTag) -> Result<NluData> {
    let text = fs::read_to_string(path).map_err(|e| nlu_error(path, e))?;
    parse_lang_file(&text, language).map_err(|message| SkillError::Nlu {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_lang_file(text: &str, language: LanguageTag) -> std::result::Result<NluData, String> {
    let file: LangFile = toml::from_str(text).map_err(|e| e.to_string())?;

    let mut intents: Vec<IntentDefinition> = file
        .intents
        .get(MAIN_SCOPE)
        .map(|scope| {
            scope
                .iter()
                .map(|(name, entry)| {
                    let mut slots: Vec<SlotDefinition> = entry
                        .slots
                        .iter()
                        .map(|(name, entity)| SlotDefinition {
                            name: name.clone(),
                            entity: entity.clone(),
                        })
                        .collect();
                    slots.sort_by(|a, b| a.name.cmp(&b.name));

                    IntentDefinition {
                        name: name.clone(),
                        utterances: entry.utterances.iter().map(|u| Utterance::from(u.as_str())).collect(),
                        slots,
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    intents.sort_by(|a, b| a.name.cmp(&b.name));

    let mut entities: Vec<EntityDefinition> = file
        .entities
        .into_iter()
        .map(|(name, entry)| EntityDefinition {
            name,
            strict: entry.strict,
            data: entry.data,
        })
        .collect();
    entities.sort_by(|a, b| a.name.cmp(&b.name));

    // Undeclared entities are uploaded as is
    for intent in &intents {
        for slot in intent
            .slots
            .iter()
            .filter(|s| !entities.iter().any(|e| e.name == s.entity))
        {
            warn!(
                language = %language,
                "Slot {:?} of intent {:?} uses undeclared entity {:?}",
                slot.name, intent.name, slot.entity
            );
        }
    }

    Ok(NluData {
        language,
        intents,
        entities,
    })
}

/// `(language, path)` of every `.toml` file named after a language tag
fn lang_files(dir: &Path) -> Result<Vec<(LanguageTag, PathBuf)>> {
    let entries = fs::read_dir(dir).map_err(|e| nlu_error(dir, e))?;
    let mut files = Vec::new();

    for entry in entries {
        let path = entry.map_err(|e| nlu_error(dir, e))?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match stem.parse::<LanguageTag>() {
            Ok(tag) if is_language_code(&tag.language) => files.push((tag, path)),
            _ => debug!("Ignoring {}: not a language tag", path.display()),
        }
    }

    // Exact country matches before country-less files
    files.sort_by_key(|(tag, _)| (tag.country.is_none(), tag.to_string()));
    Ok(files)
}

/// ISO 639 codes are two or three lowercase letters
fn is_language_code(language: &str) -> bool {
    (2..=3).contains(&language.len()) && language.chars().all(|c| c.is_ascii_lowercase())
}

fn nlu_error(path: &Path, e: std::io::Error) -> SkillError {
    SkillError::Nlu {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
