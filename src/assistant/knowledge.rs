//! Keyword tables for the lookup stages of the assistant.
//!
//! Tables are ordered lists. Lookup is substring containment over the folded
//! utterance and the first entry whose keyword occurs wins.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use super::{fold, Role};

const BUILTIN_SOURCE: &str = include_str!("knowledge.toml");

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("table {table}: entry {index} has an empty keyword")]
    EmptyKeyword { table: &'static str, index: usize },
    #[error("table {table}: keyword {keyword:?} has an empty answer")]
    EmptyAnswer {
        table: &'static str,
        keyword: String,
    },
    #[error("table {table}: keyword {keyword:?} appears more than once")]
    DuplicateKeyword {
        table: &'static str,
        keyword: String,
    },
    #[error("fallback text for {0} is empty")]
    EmptyFallback(&'static str),
}

/// Canned answer, optionally different per role.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Answer {
    Fixed(String),
    ByRole { student: String, teacher: String },
}

impl Answer {
    pub fn for_role(&self, role: Role) -> &str {
        match self {
            Answer::Fixed(s) => s,
            Answer::ByRole { student, teacher } => match role {
                Role::Student => student,
                Role::Teacher => teacher,
            },
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Answer::Fixed(s) => s.trim().is_empty(),
            Answer::ByRole { student, teacher } => {
                student.trim().is_empty() || teacher.trim().is_empty()
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    keyword: String,
    answer: Answer,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFallback {
    student: String,
    teacher: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawKnowledge {
    #[serde(default)]
    academic: Vec<RawEntry>,
    #[serde(default)]
    general: Vec<RawEntry>,
    #[serde(default)]
    conversational: Vec<RawEntry>,
    #[serde(default)]
    platform: Vec<RawEntry>,
    fallback: RawFallback,
}

#[derive(Debug, Clone)]
pub struct KnowledgeEntry {
    pub keyword: String,
    folded: String,
    pub answer: Answer,
}

#[derive(Debug, Clone)]
pub struct KnowledgeTable {
    name: &'static str,
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeTable {
    fn build(name: &'static str, raw: Vec<RawEntry>) -> Result<Self, KnowledgeError> {
        let mut entries: Vec<KnowledgeEntry> = Vec::with_capacity(raw.len());
        for (index, e) in raw.into_iter().enumerate() {
            let folded = fold(&e.keyword);
            if folded.is_empty() {
                return Err(KnowledgeError::EmptyKeyword { table: name, index });
            }
            if e.answer.is_blank() {
                return Err(KnowledgeError::EmptyAnswer {
                    table: name,
                    keyword: e.keyword,
                });
            }
            if entries.iter().any(|prev| prev.folded == folded) {
                return Err(KnowledgeError::DuplicateKeyword {
                    table: name,
                    keyword: e.keyword,
                });
            }
            entries.push(KnowledgeEntry {
                keyword: e.keyword,
                folded,
                answer: e.answer,
            });
        }
        Ok(Self { name, entries })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// First entry whose folded keyword is contained in `folded_input`.
    pub fn lookup(&self, folded_input: &str) -> Option<&KnowledgeEntry> {
        self.entries
            .iter()
            .find(|e| folded_input.contains(e.folded.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnowledgeSource {
    Builtin,
    Workspace,
}

impl KnowledgeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeSource::Builtin => "builtin",
            KnowledgeSource::Workspace => "workspace",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    pub academic: KnowledgeTable,
    pub general: KnowledgeTable,
    pub conversational: KnowledgeTable,
    pub platform: KnowledgeTable,
    fallback_student: String,
    fallback_teacher: String,
    source: KnowledgeSource,
}

impl KnowledgeBase {
    pub fn builtin() -> Result<Self, KnowledgeError> {
        Self::from_toml(BUILTIN_SOURCE, KnowledgeSource::Builtin)
    }

    pub fn from_toml(text: &str, source: KnowledgeSource) -> Result<Self, KnowledgeError> {
        let raw: RawKnowledge = toml::from_str(text)?;
        if raw.fallback.student.trim().is_empty() {
            return Err(KnowledgeError::EmptyFallback("student"));
        }
        if raw.fallback.teacher.trim().is_empty() {
            return Err(KnowledgeError::EmptyFallback("teacher"));
        }
        Ok(Self {
            academic: KnowledgeTable::build("academic", raw.academic)?,
            general: KnowledgeTable::build("general", raw.general)?,
            conversational: KnowledgeTable::build("conversational", raw.conversational)?,
            platform: KnowledgeTable::build("platform", raw.platform)?,
            fallback_student: raw.fallback.student,
            fallback_teacher: raw.fallback.teacher,
            source,
        })
    }

    /// Load a workspace override file, if present.
    pub fn from_workspace(workspace: &Path) -> anyhow::Result<Option<Self>> {
        let path = workspace.join("assistant.toml");
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        let kb = Self::from_toml(&text, KnowledgeSource::Workspace)
            .with_context(|| format!("invalid knowledge file {}", path.to_string_lossy()))?;
        Ok(Some(kb))
    }

    pub fn source(&self) -> KnowledgeSource {
        self.source
    }

    pub fn fallback(&self, role: Role) -> &str {
        match role {
            Role::Student => &self.fallback_student,
            Role::Teacher => &self.fallback_teacher,
        }
    }
}
