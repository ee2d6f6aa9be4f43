//! `lbry://` locator parsing and claim name normalization.
//!
//! A locator names either a stream, a channel (`@name`), or a stream inside a
//! channel (`@channel/stream`). Each part may carry one modifier:
//! `#<claim id prefix>`, `:<sequence>` or `$<amount order>`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

/// Characters never allowed in a claim name.
const NAME_PATTERN: &str = r#"[^=&#:$@%?;"/\\<>{}|^~`\[\]\x00-\x20\x{FFFE}\x{FFFF}]+"#;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let part = |group: &str, prefix: &str| {
        format!(
            "(?P<{group}_name>{prefix}{NAME_PATTERN})\
             (?:#(?P<{group}_claim_id>[0-9a-f]{{1,40}})\
             |:(?P<{group}_sequence>[1-9][0-9]*)\
             |\\$(?P<{group}_amount_order>[1-9][0-9]*))?"
        )
    };
    let pattern = format!(
        "^(?:lbry://)?(?:{}/{}|{}|{})$",
        part("channel_with_stream", "@"),
        part("stream_in_channel", ""),
        part("channel", "@"),
        part("stream", ""),
    );
    Regex::new(&pattern).expect("static URL regex compiles")
});

/// Form of a claim name used for grouping: NFD followed by full Unicode
/// case folding.
pub fn normalize_name(name: &str) -> String {
    caseless::default_case_fold_str(&name.nfd().collect::<String>())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("invalid LBRY URL: {0}")]
    Invalid(String),

    #[error("modifier out of range in URL: {0}")]
    ModifierOutOfRange(String),
}

/// Disambiguating modifier on one URL part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Modifier {
    /// Full or partial hex claim id.
    ClaimId(String),
    /// 1-based position by activation order.
    Sequence(u32),
    /// 1-based position by effective amount.
    AmountOrder(u32),
}

/// One half of a locator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub modifier: Option<Modifier>,
}

impl PathSegment {
    pub fn normalized(&self) -> String {
        normalize_name(&self.name)
    }

    /// A segment with nothing but a name.
    pub fn is_bare(&self) -> bool {
        self.modifier.is_none()
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        match &self.modifier {
            Some(Modifier::ClaimId(id)) => write!(f, "#{id}"),
            Some(Modifier::Sequence(n)) => write!(f, ":{n}"),
            Some(Modifier::AmountOrder(n)) => write!(f, "${n}"),
            None => Ok(()),
        }
    }
}

/// A parsed locator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Url {
    pub channel: Option<PathSegment>,
    pub stream: Option<PathSegment>,
}

impl Url {
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let caps = URL_PATTERN
            .captures(raw)
            .ok_or_else(|| UrlError::Invalid(raw.to_string()))?;

        let url = if caps.name("channel_with_stream_name").is_some() {
            Url {
                channel: segment(&caps, "channel_with_stream", raw)?,
                stream: segment(&caps, "stream_in_channel", raw)?,
            }
        } else if caps.name("channel_name").is_some() {
            Url {
                channel: segment(&caps, "channel", raw)?,
                stream: None,
            }
        } else {
            Url {
                channel: None,
                stream: segment(&caps, "stream", raw)?,
            }
        };
        Ok(url)
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }
}

impl FromStr for Url {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Url::parse(s)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lbry://")?;
        match (&self.channel, &self.stream) {
            (Some(channel), Some(stream)) => write!(f, "{channel}/{stream}"),
            (Some(channel), None) => write!(f, "{channel}"),
            (None, Some(stream)) => write!(f, "{stream}"),
            (None, None) => Ok(()),
        }
    }
}

fn segment(caps: &Captures<'_>, group: &str, raw: &str) -> Result<Option<PathSegment>, UrlError> {
    let Some(name) = caps.name(&format!("{group}_name")) else {
        return Ok(None);
    };
    let number = |key: &str| -> Result<Option<u32>, UrlError> {
        caps.name(&format!("{group}_{key}"))
            .map(|m| {
                m.as_str()
                    .parse::<u32>()
                    .map_err(|_| UrlError::ModifierOutOfRange(raw.to_string()))
            })
            .transpose()
    };

    let modifier = if let Some(id) = caps.name(&format!("{group}_claim_id")) {
        Some(Modifier::ClaimId(id.as_str().to_string()))
    } else if let Some(n) = number("sequence")? {
        Some(Modifier::Sequence(n))
    } else {
        number("amount_order")?.map(Modifier::AmountOrder)
    };

    Ok(Some(PathSegment {
        name: name.as_str().to_string(),
        modifier,
    }))
}
