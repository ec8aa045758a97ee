//! Entity and free-text normalization

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Full legal-form phrases rewritten to their abbreviation before tokenizing.
/// Longest phrases first.
static LEGAL_FORM_PHRASES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\bbesloten vennootschap met beperkte aansprakelijkheid\b", "bv"),
        (r"\bbesloten vennootschap\b", "bv"),
        (r"\bnaamloze vennootschap\b", "nv"),
        (r"\bvennootschap onder firma\b", "vof"),
        (r"\bcommanditaire vennootschap\b", "cv"),
        (r"\bb\.\s+v\.", "bv"),
        (r"\bn\.\s+v\.", "nv"),
        (r"\blimited\b", "ltd"),
        (r"\bincorporated\b", "inc"),
        (r"\bcorporation\b", "corp"),
    ]
    .into_iter()
    .map(|(pattern, abbrev)| (Regex::new(pattern).unwrap(), abbrev))
    .collect()
});

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[,;:()\[\]{}"'!?/\\|\-–—_]+"#).unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Canonical legal-form tokens
const LEGAL_FORMS: &[&str] = &[
    "bv", "nv", "vof", "cv", "ltd", "inc", "llc", "plc", "gmbh", "ag", "sa", "corp", "se",
];

const LEADING_ARTICLES: &[&str] = &["the", "de", "het"];

/// An entity name split into its core name and legal-form token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedEntity {
    /// Lowercase core name, single spaces, no punctuation
    pub core: String,
    /// Canonical legal form, e.g. `bv`, `nv`, `ltd`
    pub legal_form: Option<String>,
}

impl NormalizedEntity {
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.core.split(' ').filter(|t| !t.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }
}

/// Whether a token is a canonical legal form
pub fn is_legal_form(token: &str) -> bool {
    LEGAL_FORMS.contains(&token)
}

/// Normalize free text into lowercase space-separated tokens.
///
/// Legal forms are rewritten to their canonical token ("B.V." → "bv") so that
/// entity names and record text are compared in the same shape.
pub fn normalize_text(text: &str) -> String {
    let mut s = text.to_lowercase();
    for (re, abbrev) in LEGAL_FORM_PHRASES.iter() {
        s = re.replace_all(&s, *abbrev).into_owned();
    }
    let s = SEPARATORS.replace_all(&s, " ");
    let tokens: Vec<String> = WHITESPACE
        .split(s.trim())
        .map(|t| t.replace('.', ""))
        .filter(|t| !t.is_empty())
        .collect();
    tokens.join(" ")
}

/// Normalize an entity name: lowercase, strip legal-form tokens into a separate
/// field, drop a leading article, collapse whitespace.
pub fn normalize_entity(name: &str) -> NormalizedEntity {
    let text = normalize_text(name);
    let mut legal_form = None;
    let mut core: Vec<&str> = Vec::new();

    for token in text.split(' ').filter(|t| !t.is_empty()) {
        if is_legal_form(token) && !core.is_empty() {
            legal_form = Some(token.to_string());
        } else {
            core.push(token);
        }
    }

    if core.len() > 1 && LEADING_ARTICLES.contains(&core[0]) {
        core.remove(0);
    }

    NormalizedEntity {
        core: core.join(" "),
        legal_form,
    }
}
