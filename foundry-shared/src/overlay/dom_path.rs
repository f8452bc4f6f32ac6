/// CSS-like paths identifying an element in the rendered page
///
/// A path is a list of segments from an ancestor down to the element:
///
/// ```
/// use foundry_shared::overlay::dom_path::{DomPath, DomSegment};
///
/// let path = DomPath::new(vec![
///     DomSegment::new("main").with_id("app"),
///     DomSegment::new("div").with_class("card").nth_of_type(2),
///     DomSegment::new("button"),
/// ]);
///
/// assert_eq!(path.to_string(), "main#app > div.card:nth-of-type(2) > button");
/// assert_eq!(path.to_string().parse::<DomPath>().unwrap(), path);
/// ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

const NTH_PREFIX: &str = ":nth-of-type(";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomPathError {
    #[error("DOM path is empty")]
    Empty,

    #[error("Invalid DOM path segment `{0}`")]
    InvalidSegment(String),
}

/// One element in a [`DomPath`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DomSegment {
    /// Lowercase tag name
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,

    /// 1-based position among siblings with the same tag
    pub index: Option<usize>,
}

impl DomSegment {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn nth_of_type(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for DomSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)?;
        if let Some(id) = &self.id {
            write!(f, "#{}", id)?;
        }
        for class in &self.classes {
            write!(f, ".{}", class)?;
        }
        if let Some(index) = self.index {
            write!(f, "{}{})", NTH_PREFIX, index)?;
        }
        Ok(())
    }
}

impl FromStr for DomSegment {
    type Err = DomPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomPathError::InvalidSegment(s.to_string());

        let (selector, index) = match s.find(NTH_PREFIX) {
            Some(pos) => {
                let digits = s[pos + NTH_PREFIX.len()..]
                    .strip_suffix(')')
                    .ok_or_else(invalid)?;
                let index: usize = digits.parse().map_err(|_| invalid())?;
                if index == 0 {
                    return Err(invalid());
                }
                (&s[..pos], Some(index))
            }
            None => (s, None),
        };

        let tag_end = selector.find(['#', '.']).unwrap_or(selector.len());
        let tag = &selector[..tag_end];
        if !is_ident(tag) {
            return Err(invalid());
        }

        let mut segment = DomSegment::new(tag);
        segment.index = index;

        let mut rest = &selector[tag_end..];
        while let Some(marker) = rest.chars().next() {
            let body = &rest[1..];
            let end = body.find(['#', '.']).unwrap_or(body.len());
            let name = &body[..end];
            if !is_ident(name) {
                return Err(invalid());
            }

            match marker {
                '#' if segment.id.is_none() => segment.id = Some(name.to_string()),
                '.' => segment.classes.push(name.to_string()),
                _ => return Err(invalid()),
            }
            rest = &body[end..];
        }

        Ok(segment)
    }
}

/// Path from an ancestor to an element, rendered with ` > ` separators
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DomPath(Vec<DomSegment>);

impl DomPath {
    pub fn new(segments: Vec<DomSegment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[DomSegment] {
        &self.0
    }

    pub fn push(&mut self, segment: DomSegment) {
        self.0.push(segment);
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The element the path points at
    pub fn leaf(&self) -> Option<&DomSegment> {
        self.0.last()
    }

    /// Whether `self` names an ancestor of (or the same element as) `other`
    pub fn is_prefix_of(&self, other: &DomPath) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for DomPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" > ")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for DomPath {
    type Err = DomPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DomPathError::Empty);
        }

        s.split('>')
            .map(|part| part.trim().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(DomPath)
    }
}

impl Serialize for DomPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DomPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_rendering() {
        assert_eq!(DomSegment::new("DIV").to_string(), "div");
        assert_eq!(
            DomSegment::new("a")
                .with_id("home")
                .with_class("nav")
                .with_class("active")
                .to_string(),
            "a#home.nav.active"
        );
        assert_eq!(DomSegment::new("li").nth_of_type(3).to_string(), "li:nth-of-type(3)");
    }

    #[test]
    fn test_parse_segment() {
        let segment: DomSegment = "div#root.card.wide:nth-of-type(2)".parse().unwrap();
        assert_eq!(segment.tag, "div");
        assert_eq!(segment.id.as_deref(), Some("root"));
        assert_eq!(segment.classes, vec!["card", "wide"]);
        assert_eq!(segment.index, Some(2));
    }

    #[test]
    fn test_parse_rejects_malformed_segments() {
        for bad in [
            "",
            "#only-id",
            "div#",
            "div..x",
            "div#a#b",
            "div:nth-of-type(0)",
            "div:nth-of-type(x)",
            "div:nth-of-type(2",
            "di v",
        ] {
            assert!(bad.parse::<DomSegment>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_parse_path() {
        let path: DomPath = "body > main#app >div.card".parse().unwrap();
        assert_eq!(path.depth(), 3);
        assert_eq!(path.leaf().unwrap().classes, vec!["card"]);
        assert_eq!(path.to_string(), "body > main#app > div.card");

        assert_eq!("  ".parse::<DomPath>(), Err(DomPathError::Empty));
        assert!("body > > div".parse::<DomPath>().is_err());
    }

    #[test]
    fn test_prefix() {
        let parent: DomPath = "body > main".parse().unwrap();
        let child: DomPath = "body > main > button".parse().unwrap();
        assert!(parent.is_prefix_of(&child));
        assert!(child.is_prefix_of(&child));
        assert!(!child.is_prefix_of(&parent));
    }

    #[test]
    fn test_serde_as_string() {
        let path: DomPath = "main > button.primary".parse().unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"main > button.primary\"");
        assert_eq!(serde_json::from_str::<DomPath>(&json).unwrap(), path);
        assert!(serde_json::from_str::<DomPath>("\"\"").is_err());
    }
}
