//! Supported dictionary languages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A language with its own offline dictionary table.
///
/// The set is closed: every variant has a table created by a dictionary
/// migration, and table names are derived by exhaustive matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    /// English.
    #[serde(rename = "en")]
    English,
    /// Spanish.
    #[serde(rename = "es")]
    Spanish,
    /// French.
    #[serde(rename = "fr")]
    French,
    /// German.
    #[serde(rename = "de")]
    German,
    /// Italian.
    #[serde(rename = "it")]
    Italian,
    /// Portuguese.
    #[serde(rename = "pt")]
    Portuguese,
}

impl Language {
    /// Every supported language.
    pub const ALL: [Self; 6] = [
        Self::English,
        Self::Spanish,
        Self::French,
        Self::German,
        Self::Italian,
        Self::Portuguese,
    ];

    /// Two-letter code (`es`).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
            Self::French => "fr",
            Self::German => "de",
            Self::Italian => "it",
            Self::Portuguese => "pt",
        }
    }

    /// Directory name used by the remote shard host (`Spanish`).
    #[must_use]
    pub const fn remote_name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Spanish",
            Self::French => "French",
            Self::German => "German",
            Self::Italian => "Italian",
            Self::Portuguese => "Portuguese",
        }
    }

    /// Dictionary table holding this language's entries.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::English => "dict_en",
            Self::Spanish => "dict_es",
            Self::French => "dict_fr",
            Self::German => "dict_de",
            Self::Italian => "dict_it",
            Self::Portuguese => "dict_pt",
        }
    }

    /// Key of this language's row in the dictionary `meta` table.
    #[must_use]
    pub fn meta_key(self) -> String {
        format!("lang-{}", self.code())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|lang| {
                lang.code().eq_ignore_ascii_case(wanted)
                    || lang.remote_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| Error::UnknownLanguage(s.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code_and_name() {
        assert_eq!("es".parse::<Language>().unwrap(), Language::Spanish);
        assert_eq!(" FR ".parse::<Language>().unwrap(), Language::French);
        assert_eq!("german".parse::<Language>().unwrap(), Language::German);
        assert!(matches!(
            "klingon".parse::<Language>(),
            Err(Error::UnknownLanguage(_))
        ));
    }

    #[test]
    fn test_serde_uses_code() {
        let json = serde_json::to_string(&Language::Portuguese).unwrap();
        assert_eq!(json, "\"pt\"");
        let lang: Language = serde_json::from_str("\"it\"").unwrap();
        assert_eq!(lang, Language::Italian);
    }

    #[test]
    fn test_meta_key() {
        assert_eq!(Language::Spanish.meta_key(), "lang-es");
    }
}
