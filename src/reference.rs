//! Parsing and rendering of charm/bundle entity reference URLs.
//!
//! A reference is the canonical syntactic form for a charm or bundle url,
//! e.g. `cs:~user/series/name-42`, `local:name`, or a short
//! `jujucharms.com` path such as `u/user/name/series/42`. See the grammar in
//! spec.md §6; the parsing algorithm mirrors
//! `original_source/jujubundlelib/references.py`.

use std::fmt;

use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::digit1;
use nom::combinator::{all_consuming, opt, verify};
use nom::sequence::{preceded, terminated, tuple};
use nom::IResult;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BundleError;

/// The home of Juju; used to build/parse the long-form jujucharms.com URL.
pub const JUJUCHARMS_URL: &str = "https://jujucharms.com/";

/// A reference's schema: where the entity is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    /// `cs:` — the charm store.
    Cs,
    /// `local:` — a charm/bundle built from local source, never pushed to a store.
    Local,
}

impl Schema {
    fn as_str(self) -> &'static str {
        match self {
            Schema::Cs => "cs",
            Schema::Local => "local",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "cs" => Some(Schema::Cs),
            "local" => Some(Schema::Local),
            _ => None,
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed charm or bundle reference.
///
/// `user` and `series` are absent (`None`) rather than represented by the
/// empty-string sentinel the original Python implementation uses, since
/// that's the idiomatic Rust shape for an optional string field; rendering
/// treats `None` exactly as the original treats `''`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub schema: Schema,
    pub user: Option<String>,
    pub series: Option<String>,
    pub name: String,
    pub revision: Option<u32>,
}

impl Reference {
    /// Parse a reference from its string form.
    ///
    /// When `fully_qualified` is `false`, a missing schema defaults to `cs`,
    /// a missing series to absent, and a missing revision to absent. When
    /// `true`, schema, series and revision are all required.
    pub fn parse(url: &str, fully_qualified: bool) -> Result<Self, BundleError> {
        let err = |msg: String| BundleError::InvalidReference(url.to_string(), msg);

        let (schema_str, remainder) = match url.splitn(2, ':').collect::<Vec<_>>()[..] {
            [schema, remainder] => (schema, remainder),
            _ => {
                if fully_qualified {
                    return Err(err(format!("URL has no schema: {}", url)));
                }
                ("cs", url)
            }
        };
        let schema = Schema::parse(schema_str)
            .ok_or_else(|| err(format!("URL has invalid schema: {}", schema_str)))?;

        let parts: Vec<&str> = remainder.split('/').collect();
        let (user, series, name_revision) = match parts[..] {
            [user_part, series_part, name_rev] => {
                let user = strip_user_sigil(user_part, url)?;
                if schema == Schema::Local {
                    return Err(err(format!("local entity URL with user name: {}", url)));
                }
                (Some(user), Some(series_part), name_rev)
            }
            [first, name_rev] => {
                if let Some(user) = first.strip_prefix('~') {
                    if fully_qualified {
                        return Err(err(format!("URL has no series: {}", url)));
                    }
                    (Some(user.to_string()), None, name_rev)
                } else {
                    (None, Some(first), name_rev)
                }
            }
            [name_rev] if !fully_qualified => (None, None, name_rev),
            _ => return Err(err(format!("URL has invalid form: {}", url))),
        };

        if let Some(user) = &user {
            if !valid_user(user) {
                return Err(err(format!("URL has invalid user name: {}", user)));
            }
        }
        if let Some(series) = &series {
            if !valid_series(series) {
                return Err(err(format!("URL has invalid series: {}", series)));
            }
        }

        let (name, revision) = split_name_revision(name_revision, fully_qualified, url)?;
        if !valid_name(&name) {
            return Err(err(format!("URL has invalid name: {}", name)));
        }

        Ok(Reference {
            schema,
            user,
            series: series.map(String::from),
            name,
            revision,
        })
    }

    /// Parse the short `jujucharms.com` path form, optionally prefixed with
    /// `https://jujucharms.com/`. A reference with no series is a bundle
    /// reference (the sentinel series `"bundle"`).
    pub fn parse_jujucharms_url(url: &str) -> Result<Self, BundleError> {
        let trimmed = url
            .strip_prefix(JUJUCHARMS_URL)
            .unwrap_or(url)
            .trim_start_matches('/')
            .trim_end_matches('/');

        let (_, (user, name, series, revision)) = all_consuming(tuple((
            opt(preceded(tag("u/"), terminated(user_segment, tag("/")))),
            name_segment,
            opt(preceded(tag("/"), series_segment)),
            opt(preceded(tag("/"), digit1)),
        )))(trimmed)
        .map_err(|_| {
            BundleError::InvalidReference(url.to_string(), format!("invalid bundle URL: {}", url))
        })?;

        let revision = revision
            .map(|r| {
                r.parse::<u32>().map_err(|_| {
                    BundleError::InvalidReference(
                        url.to_string(),
                        format!("invalid bundle URL revision: {}", r),
                    )
                })
            })
            .transpose()?;

        Ok(Reference {
            schema: Schema::Cs,
            user: user.map(String::from),
            series: Some(series.unwrap_or("bundle").to_string()),
            name: name.to_string(),
            revision,
        })
    }

    /// The reference rendered without its schema, e.g. `~user/series/name-42`.
    pub fn path(&self) -> String {
        let user = self
            .user
            .as_ref()
            .map(|u| format!("~{}/", u))
            .unwrap_or_default();
        let series = self
            .series
            .as_ref()
            .map(|s| format!("{}/", s))
            .unwrap_or_default();
        let revision = self
            .revision
            .map(|r| format!("-{}", r))
            .unwrap_or_default();
        format!("{}{}{}{}", user, series, self.name, revision)
    }

    /// The reference's jujucharms.com path identifier, e.g. `u/user/name/series/42`.
    /// If `channel` is given, it's appended as a `?channel=` query parameter,
    /// matching `original_source/jujubundlelib/references.py::jujucharms_id`.
    pub fn jujucharms_id(&self, channel: Option<&str>) -> String {
        let user = self
            .user
            .as_ref()
            .map(|u| format!("u/{}/", u))
            .unwrap_or_default();
        let series = if self.is_bundle() {
            String::new()
        } else {
            self.series
                .as_ref()
                .map(|s| format!("/{}", s))
                .unwrap_or_default()
        };
        let revision = self
            .revision
            .map(|r| format!("/{}", r))
            .unwrap_or_default();
        let base = format!("{}{}{}{}", user, self.name, series, revision);
        match channel {
            Some(channel) => format!("{}?channel={}", base, channel),
            None => base,
        }
    }

    /// The full `https://jujucharms.com/...` URL for this entity.
    pub fn jujucharms_url(&self) -> String {
        format!("{}{}", JUJUCHARMS_URL, self.jujucharms_id(None))
    }

    /// Two references are similar if they share schema, user and name.
    pub fn similar(&self, other: &Reference) -> bool {
        self.schema == other.schema && self.user == other.user && self.name == other.name
    }

    pub fn is_bundle(&self) -> bool {
        self.series.as_deref() == Some("bundle")
    }

    pub fn is_local(&self) -> bool {
        self.schema == Schema::Local
    }

    pub fn is_fully_qualified(&self) -> bool {
        self.series.is_some() && self.revision.is_some()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.schema, self.path())
    }
}

impl std::str::FromStr for Reference {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reference::parse(s, false)
    }
}

impl Serialize for Reference {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D>(deserializer: D) -> Result<Reference, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        Reference::parse(&s, false).map_err(|err| Error::custom(err.to_string()))
    }
}

fn strip_user_sigil(part: &str, url: &str) -> Result<String, BundleError> {
    part.strip_prefix('~')
        .map(str::to_string)
        .ok_or_else(|| BundleError::InvalidReference(url.to_string(), format!("URL has invalid user name form: {}", part)))
}

/// Split `name-revision` on the rightmost `-`, falling back to treating the
/// whole segment as the name when the tail after the dash isn't an integer
/// (non-strict mode) or failing (strict/fully-qualified mode).
fn split_name_revision(
    segment: &str,
    fully_qualified: bool,
    url: &str,
) -> Result<(String, Option<u32>), BundleError> {
    let err = |msg: String| BundleError::InvalidReference(url.to_string(), msg);

    match segment.rsplitn(2, '-').collect::<Vec<_>>()[..] {
        [tail, name] => match tail.parse::<u32>() {
            Ok(revision) => Ok((name.to_string(), Some(revision))),
            Err(_) => {
                if fully_qualified {
                    Err(err(format!("URL has invalid revision: {}", tail)))
                } else {
                    Ok((segment.to_string(), None))
                }
            }
        },
        _ => {
            if fully_qualified {
                Err(err(format!("URL has no revision: {}", segment)))
            } else {
                Ok((segment.to_string(), None))
            }
        }
    }
}

/// `[a-z0-9][a-zA-Z0-9+.-]+`
fn valid_user(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    let rest: Vec<char> = chars.collect();
    !rest.is_empty()
        && rest
            .iter()
            .all(|&c| c.is_ascii_alphanumeric() || c == '+' || c == '.' || c == '-')
}

/// `[a-z]+(?:[a-z-]+[a-z])?`
pub(crate) fn valid_series(s: &str) -> bool {
    let bytes = s.as_bytes();
    !bytes.is_empty()
        && bytes[0].is_ascii_lowercase()
        && bytes[bytes.len() - 1].is_ascii_lowercase()
        && bytes.iter().all(|&b| b.is_ascii_lowercase() || b == b'-')
}

/// `[a-z][a-z0-9]*(?:-[a-z0-9]*[a-z][a-z0-9]*)*`
fn valid_name(s: &str) -> bool {
    let mut segments = s.split('-');
    let first_valid = match segments.next() {
        Some(first) => {
            let mut chars = first.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        }
        None => false,
    };
    first_valid
        && segments.all(|seg| {
            !seg.is_empty()
                && seg.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                && seg.chars().any(|c| c.is_ascii_lowercase())
        })
}

fn user_segment(input: &str) -> IResult<&str, &str> {
    verify(take_while1(|c: char| c != '/'), |s: &str| valid_user(s))(input)
}

fn name_segment(input: &str) -> IResult<&str, &str> {
    verify(take_while1(|c: char| c != '/'), |s: &str| valid_name(s))(input)
}

fn series_segment(input: &str) -> IResult<&str, &str> {
    verify(take_while1(|c: char| c != '/'), |s: &str| valid_series(s))(input)
}
