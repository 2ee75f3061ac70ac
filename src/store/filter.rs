//! Run search filters for stores that evaluate filters locally
//!
//! Only one predicate shape is understood: `tags.<name> = '<value>'`, with
//! the tag name optionally backtick-quoted. Bare names may contain any
//! characters a tag key can, such as `-`, `/` or `.`. The value is taken
//! verbatim: backslashes are not escapes.

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use super::Run;
use crate::{Error, Result};

const TAG_PREFIX: &str = "tags.";

/// A parsed run filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFilter {
    /// Empty filter: every run matches.
    All,
    /// `tags.<key> = '<value>'`
    TagEquals {
        /// Tag name.
        key: String,
        /// Required tag value.
        value: String,
    },
}

impl RunFilter {
    /// Parse a filter string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for anything other than an empty string
    /// or a single tag equality.
    pub fn parse(filter: &str) -> Result<Self> {
        if filter.trim().is_empty() {
            return Ok(Self::All);
        }
        let unsupported = || {
            Error::Unsupported(format!(
                "only filters of the form tags.<name> = '<value>' are supported, got: {filter}"
            ))
        };

        let tokens = Tokenizer::new(&GenericDialect {}, filter)
            .with_unescape(false)
            .tokenize()
            .map_err(|_| unsupported())?;
        Self::tag_equality(&tokens).ok_or_else(unsupported)
    }

    fn tag_equality(tokens: &[Token]) -> Option<Self> {
        let eq = tokens.iter().position(|t| *t == Token::Eq)?;
        let (name_tokens, rest) = (&tokens[..eq], &tokens[eq + 1..]);

        let mut rest = rest
            .iter()
            .filter(|t| !matches!(t, Token::Whitespace(_)));
        let Some(Token::SingleQuotedString(value)) = rest.next() else {
            return None;
        };
        if rest.next().is_some() {
            return None;
        }

        // Rebuild the left-hand side as written; the tokenizer splits bare
        // names at `-`, `/` and `.`.
        let mut name = String::new();
        for token in name_tokens {
            match token {
                Token::Word(word) if word.quote_style.is_some_and(|q| q != '`') => return None,
                Token::Word(_)
                | Token::Number(..)
                | Token::Period
                | Token::Minus
                | Token::Div
                | Token::Colon
                | Token::Whitespace(_) => name.push_str(&token.to_string()),
                _ => return None,
            }
        }
        let key = name.trim().strip_prefix(TAG_PREFIX)?;
        let key = key.strip_prefix('`').unwrap_or(key);
        let key = key.strip_suffix('`').unwrap_or(key);
        if key.is_empty() || key.contains('`') {
            return None;
        }
        Some(Self::TagEquals {
            key: key.to_string(),
            value: value.clone(),
        })
    }

    /// True when `run` satisfies the filter. A missing tag never matches.
    pub fn matches(&self, run: &dyn Run) -> bool {
        match self {
            Self::All => true,
            Self::TagEquals { key, value } => run.get_tag(key).is_ok_and(|v| &v == value),
        }
    }
}
