//! Selector descriptors and text matching
//!
//! A [`Selector`] describes how to find elements; it never holds element
//! references. Pages return raw candidates for the selector's kind, and
//! [`Selector::refine`] applies name/text matching in one place so every
//! `Page` implementation resolves selectors identically.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use super::ElementSnapshot;
use crate::common::normalize_whitespace;

/// How a string in a scenario is compared against observed text
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawTextMatch")]
pub enum TextMatch {
    /// Plain string; meaning depends on context (substring for lookups,
    /// whole value for assertions)
    Plain(String),
    /// Substring match
    Contains { text: String, ignore_case: bool },
    /// Regular expression, compiled at load time
    Pattern { regex: Regex, ignore_case: bool },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTextMatch {
    Plain(String),
    Contains {
        contains: String,
        #[serde(default)]
        ignore_case: bool,
    },
    Regex {
        regex: String,
        #[serde(default)]
        ignore_case: bool,
    },
}

impl TryFrom<RawTextMatch> for TextMatch {
    type Error = String;

    fn try_from(raw: RawTextMatch) -> Result<Self, Self::Error> {
        match raw {
            RawTextMatch::Plain(s) => Ok(TextMatch::Plain(s)),
            RawTextMatch::Contains {
                contains,
                ignore_case,
            } => Ok(TextMatch::Contains {
                text: contains,
                ignore_case,
            }),
            RawTextMatch::Regex { regex, ignore_case } => TextMatch::pattern(&regex, ignore_case),
        }
    }
}

impl TextMatch {
    pub fn plain(s: impl Into<String>) -> Self {
        TextMatch::Plain(s.into())
    }

    pub fn contains(s: impl Into<String>, ignore_case: bool) -> Self {
        TextMatch::Contains {
            text: s.into(),
            ignore_case,
        }
    }

    /// Compile a regex text match
    pub fn pattern(pattern: &str, ignore_case: bool) -> Result<Self, String> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| format!("invalid regex '{}': {}", pattern, e))?;
        Ok(TextMatch::Pattern { regex, ignore_case })
    }

    /// Lookup semantics: plain strings match case-insensitively as a
    /// whitespace-normalized substring
    pub fn matches_loose(&self, haystack: &str) -> bool {
        match self {
            TextMatch::Plain(needle) => normalize_whitespace(haystack)
                .to_lowercase()
                .contains(&normalize_whitespace(needle).to_lowercase()),
            other => other.matches_structured(haystack),
        }
    }

    /// Assertion semantics: plain strings must equal the whole value
    ///
    /// With `normalize` set, whitespace runs are collapsed on both sides
    /// first (rendered text); values and attributes compare verbatim.
    pub fn matches_whole(&self, haystack: &str, normalize: bool) -> bool {
        match self {
            TextMatch::Plain(expected) if normalize => {
                normalize_whitespace(haystack) == normalize_whitespace(expected)
            }
            TextMatch::Plain(expected) => haystack == expected,
            other => other.matches_structured(haystack),
        }
    }

    fn matches_structured(&self, haystack: &str) -> bool {
        match self {
            TextMatch::Contains {
                text,
                ignore_case: true,
            } => haystack.to_lowercase().contains(&text.to_lowercase()),
            TextMatch::Contains { text, .. } => haystack.contains(text.as_str()),
            TextMatch::Pattern { regex, .. } => regex.is_match(haystack),
            TextMatch::Plain(s) => haystack == s,
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatch::Plain(s) => write!(f, "{:?}", s),
            TextMatch::Contains { text, ignore_case } => {
                write!(f, "containing {:?}", text)?;
                if *ignore_case {
                    f.write_str(" (any case)")?;
                }
                Ok(())
            }
            TextMatch::Pattern { regex, ignore_case } => {
                write!(f, "/{}/{}", regex.as_str(), if *ignore_case { "i" } else { "" })
            }
        }
    }
}

/// What a selector looks for
#[derive(Debug, Clone)]
pub enum By {
    /// ARIA role, optionally filtered by accessible name
    Role {
        role: String,
        name: Option<TextMatch>,
    },
    /// Element identifier
    Id(String),
    /// Raw CSS selector
    Css(String),
    /// `data-testid` attribute
    TestId(String),
    /// Text content; the innermost matching element wins
    Text(TextMatch),
    /// Form control by its label text
    Label(TextMatch),
    /// Input by placeholder text
    Placeholder(TextMatch),
    /// Resolve `inner` inside the first iframe matching `frame`
    Frame { frame: String, inner: Box<Selector> },
}

/// A selector descriptor as written in scenario files
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "SelectorSpec")]
pub struct Selector {
    pub by: By,
    /// Match names and text exactly instead of by substring
    pub exact: bool,
    /// Pick one match; negative indexes count from the end
    pub nth: Option<i64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectorSpec {
    role: Option<String>,
    name: Option<TextMatch>,
    id: Option<String>,
    css: Option<String>,
    test_id: Option<String>,
    text: Option<TextMatch>,
    label: Option<TextMatch>,
    placeholder: Option<TextMatch>,
    frame: Option<String>,
    inner: Option<Box<Selector>>,
    #[serde(default)]
    exact: bool,
    nth: Option<i64>,
}

impl TryFrom<SelectorSpec> for Selector {
    type Error = String;

    fn try_from(spec: SelectorSpec) -> Result<Self, Self::Error> {
        let kinds = [
            spec.role.is_some(),
            spec.id.is_some(),
            spec.css.is_some(),
            spec.test_id.is_some(),
            spec.text.is_some(),
            spec.label.is_some(),
            spec.placeholder.is_some(),
            spec.frame.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if kinds != 1 {
            return Err(format!(
                "selector needs exactly one of role, id, css, test_id, text, label, placeholder, frame (found {})",
                kinds
            ));
        }
        if spec.name.is_some() && spec.role.is_none() {
            return Err("'name' is only valid together with 'role'".to_string());
        }
        if spec.inner.is_some() != spec.frame.is_some() {
            return Err("'frame' and 'inner' must be used together".to_string());
        }

        let by = if let Some(role) = spec.role {
            By::Role {
                role,
                name: spec.name,
            }
        } else if let Some(id) = spec.id {
            By::Id(id)
        } else if let Some(css) = spec.css {
            By::Css(css)
        } else if let Some(test_id) = spec.test_id {
            By::TestId(test_id)
        } else if let Some(text) = spec.text {
            By::Text(text)
        } else if let Some(label) = spec.label {
            By::Label(label)
        } else if let Some(placeholder) = spec.placeholder {
            By::Placeholder(placeholder)
        } else if let (Some(frame), Some(inner)) = (spec.frame, spec.inner) {
            By::Frame { frame, inner }
        } else {
            unreachable!("exactly one selector kind is set")
        };

        Ok(Selector {
            by,
            exact: spec.exact,
            nth: spec.nth,
        })
    }
}

/// Outcome of resolving a selector to a single element
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Nothing matched (or `nth` was out of range)
    Missing,
    /// More than one element matched and no `nth` was given
    Ambiguous(usize),
    /// Exactly one element
    Found(ElementSnapshot),
}

impl Selector {
    fn new(by: By) -> Self {
        Self {
            by,
            exact: false,
            nth: None,
        }
    }

    pub fn role(role: impl Into<String>, name: Option<&str>) -> Self {
        Self::new(By::Role {
            role: role.into(),
            name: name.map(TextMatch::plain),
        })
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::new(By::Id(id.into()))
    }

    pub fn css(css: impl Into<String>) -> Self {
        Self::new(By::Css(css.into()))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(By::Text(TextMatch::plain(text)))
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::new(By::Label(TextMatch::plain(text)))
    }

    pub fn in_frame(frame: impl Into<String>, inner: Selector) -> Self {
        Self::new(By::Frame {
            frame: frame.into(),
            inner: Box::new(inner),
        })
    }

    pub fn with_nth(mut self, nth: i64) -> Self {
        self.nth = Some(nth);
        self
    }

    pub fn with_exact(mut self) -> Self {
        self.exact = true;
        self
    }

    /// CSS selectors of the frames to enter, outermost first
    pub fn frame_chain(&self) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self;
        while let By::Frame { frame, inner } = &current.by {
            chain.push(frame.as_str());
            current = inner;
        }
        chain
    }

    /// The selector evaluated inside the innermost frame
    pub fn leaf(&self) -> &Selector {
        match &self.by {
            By::Frame { inner, .. } => inner.leaf(),
            _ => self,
        }
    }

    /// `nth` of this selector, falling back to the one inside a frame
    pub fn effective_nth(&self) -> Option<i64> {
        match (&self.by, self.nth) {
            (_, Some(n)) => Some(n),
            (By::Frame { inner, .. }, None) => inner.effective_nth(),
            _ => None,
        }
    }

    fn text_matches(&self, pattern: &TextMatch, observed: &str) -> bool {
        if self.exact {
            pattern.matches_whole(observed, true)
        } else {
            pattern.matches_loose(observed)
        }
    }

    /// Filter raw candidates down to the elements this selector means
    ///
    /// Candidates come from a page in document order. For text selectors a
    /// matching element is dropped when one of its descendants also matches,
    /// so a lookup lands on the element that actually holds the text.
    pub fn refine(&self, candidates: Vec<ElementSnapshot>) -> Vec<ElementSnapshot> {
        let leaf = self.leaf();
        let keep: Vec<bool> = candidates
            .iter()
            .map(|c| match &leaf.by {
                By::Role {
                    name: Some(name), ..
                } => leaf.text_matches(name, &c.name),
                By::Text(text) => leaf.text_matches(text, &c.text),
                By::Label(label) => leaf.text_matches(label, &c.name),
                By::Placeholder(placeholder) => c
                    .attributes
                    .get("placeholder")
                    .is_some_and(|p| leaf.text_matches(placeholder, p)),
                _ => true,
            })
            .collect();

        let keep = if matches!(leaf.by, By::Text(_)) {
            innermost(&candidates, keep)
        } else {
            keep
        };

        candidates
            .into_iter()
            .zip(keep)
            .filter_map(|(c, k)| k.then_some(c))
            .collect()
    }

    /// Pick the single element an act or assertion works on
    pub fn resolve(&self, matches: Vec<ElementSnapshot>) -> Resolution {
        let len = matches.len();
        match self.effective_nth() {
            Some(n) => {
                let index = if n < 0 { len as i64 + n } else { n };
                if index < 0 {
                    return Resolution::Missing;
                }
                match matches.into_iter().nth(index as usize) {
                    Some(el) => Resolution::Found(el),
                    None => Resolution::Missing,
                }
            }
            None => match len {
                0 => Resolution::Missing,
                1 => matches
                    .into_iter()
                    .next()
                    .map_or(Resolution::Missing, Resolution::Found),
                n => Resolution::Ambiguous(n),
            },
        }
    }
}

/// Clear every kept candidate that has a kept descendant
fn innermost(candidates: &[ElementSnapshot], mut keep: Vec<bool>) -> Vec<bool> {
    let matched: Vec<usize> = (0..candidates.len()).filter(|i| keep[*i]).collect();
    for i in matched {
        let mut ancestor = candidates[i].parent;
        while let Some(a) = ancestor {
            if a >= candidates.len() {
                break;
            }
            keep[a] = false;
            ancestor = candidates[a].parent;
        }
    }
    keep
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.by {
            By::Role { role, name } => {
                write!(f, "role={}", role)?;
                if let Some(name) = name {
                    write!(f, "[name={}]", name)?;
                }
            }
            By::Id(id) => write!(f, "#{}", id)?,
            By::Css(css) => write!(f, "css={}", css)?,
            By::TestId(id) => write!(f, "test_id={}", id)?,
            By::Text(text) => write!(f, "text={}", text)?,
            By::Label(text) => write!(f, "label={}", text)?,
            By::Placeholder(text) => write!(f, "placeholder={}", text)?,
            By::Frame { frame, inner } => write!(f, "{} >> {}", frame, inner)?,
        }
        if self.exact {
            f.write_str(" (exact)")?;
        }
        if let Some(n) = self.nth {
            write!(f, " >> nth={}", n)?;
        }
        Ok(())
    }
}
