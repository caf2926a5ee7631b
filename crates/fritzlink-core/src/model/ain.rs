// Actor identification numbers.
//
// The gateway prints AINs with embedded spaces ("08761 0116993") but
// accepts them with or without, and different firmware surfaces the
// same actor both ways. Identity therefore ignores whitespace while the
// raw rendering is preserved for display and for the wire, where the
// gateway echoes whatever form was registered.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An actor identification number.
///
/// Equality, ordering, and hashing ignore embedded whitespace;
/// `Display` and [`as_str`](Ain::as_str) keep the raw form.
#[derive(Debug, Clone)]
pub struct Ain {
    raw: String,
}

impl Ain {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The AIN exactly as the gateway reported it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The whitespace-stripped form used for identity.
    pub fn normalized(&self) -> String {
        self.normalized_chars().collect()
    }

    fn normalized_chars(&self) -> impl Iterator<Item = char> + '_ {
        self.raw.chars().filter(|c| !c.is_whitespace())
    }
}

impl PartialEq for Ain {
    fn eq(&self, other: &Self) -> bool {
        self.normalized_chars().eq(other.normalized_chars())
    }
}

impl Eq for Ain {}

impl PartialOrd for Ain {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ain {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.normalized_chars().cmp(other.normalized_chars())
    }
}

impl Hash for Ain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.normalized_chars() {
            c.hash(state);
        }
    }
}

impl fmt::Display for Ain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for Ain {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Ain {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl Serialize for Ain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Ain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashSet;

    use super::*;

    #[test]
    fn identity_ignores_whitespace() {
        let spaced = Ain::new("08761 0116993");
        let packed = Ain::new("087610116993");
        assert_eq!(spaced, packed);
        assert_eq!(spaced.normalized(), "087610116993");

        let mut set = HashSet::new();
        set.insert(spaced);
        assert!(set.contains(&packed));
    }

    #[test]
    fn display_preserves_the_raw_form() {
        let ain = Ain::new("08761 0116993");
        assert_eq!(ain.to_string(), "08761 0116993");
        assert_eq!(ain.as_str(), "08761 0116993");
    }

    #[test]
    fn distinct_ains_stay_distinct() {
        assert_ne!(Ain::new("08761 0116993"), Ain::new("08761 0116994"));
    }

    #[test]
    fn ordering_follows_the_normalized_form() {
        let mut ains = vec![Ain::new("2"), Ain::new(" 1 0"), Ain::new("11")];
        ains.sort();
        assert_eq!(
            ains.iter().map(Ain::normalized).collect::<Vec<_>>(),
            vec!["10", "11", "2"]
        );
    }
}
