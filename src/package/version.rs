//! Loose version comparison for installed packages.
//!
//! Installer-reported versions are not guaranteed to be semver. A version is
//! split into runs of digits and runs of other characters (dots separate
//! components and are dropped), digits compare numerically, everything else
//! compares as text. Numeric components sort before textual ones so the
//! ordering stays total.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Component {
    Number(u64),
    Text(String),
}

/// A version string ordered component by component (e.g. "1.2.10" > "1.2.9").
#[derive(Debug, Clone)]
pub struct LooseVersion {
    raw: String,
    components: Vec<Component>,
}

impl LooseVersion {
    pub fn parse(raw: &str) -> Self {
        let mut components = Vec::new();
        let mut current = String::new();
        let mut digits = false;

        let mut flush = |current: &mut String, digits: bool| {
            if current.is_empty() {
                return;
            }
            let component = if digits {
                // Runs too long for u64 still compare sensibly as text.
                current
                    .parse::<u64>()
                    .map(Component::Number)
                    .unwrap_or_else(|_| Component::Text(current.clone()))
            } else {
                Component::Text(current.clone())
            };
            components.push(component);
            current.clear();
        };

        for c in raw.trim().chars() {
            if c == '.' {
                flush(&mut current, digits);
                continue;
            }
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != digits {
                flush(&mut current, digits);
            }
            digits = is_digit;
            current.push(c);
        }
        flush(&mut current, digits);

        Self {
            raw: raw.to_string(),
            components,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for LooseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialEq for LooseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for LooseVersion {}

impl PartialOrd for LooseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LooseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

/// Compare two raw version strings with loose ordering.
pub fn compare(a: &str, b: &str) -> Ordering {
    LooseVersion::parse(a).cmp(&LooseVersion::parse(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_components_compare_numerically() {
        assert_eq!(compare("1.2.10", "1.2.9"), Ordering::Greater);
        assert_eq!(compare("0.10", "0.9"), Ordering::Greater);
    }

    #[test]
    fn test_ordering_chain() {
        let versions = ["1.0.0", "1.2.0", "1.2.10", "2.0.0"];
        for pair in versions.windows(2) {
            assert_eq!(compare(pair[0], pair[1]), Ordering::Less, "{:?}", pair);
        }
        // transitivity across the whole chain
        assert_eq!(compare("1.0.0", "2.0.0"), Ordering::Less);
        assert_eq!(compare("1.0.0", "1.2.10"), Ordering::Less);
    }

    #[test]
    fn test_equal_versions() {
        assert_eq!(compare("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(LooseVersion::parse("1.00"), LooseVersion::parse("1.0"));
    }

    #[test]
    fn test_longer_version_is_greater_when_prefix_matches() {
        assert_eq!(compare("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare("1.0.post1", "1.0"), Ordering::Greater);
    }

    #[test]
    fn test_mixed_components() {
        assert_eq!(compare("3.2.3.post2", "3.2.3.post10"), Ordering::Less);
        assert_eq!(compare("1.0a1", "1.0a2"), Ordering::Less);
        // numbers sort before text at the same position
        assert_eq!(compare("1.0.1", "1.0.dev"), Ordering::Less);
    }

    #[test]
    fn test_sorting_is_total() {
        let mut versions: Vec<LooseVersion> = ["2.0.0", "1.2.10", "1.0.0", "1.2.0", "1.0rc1"]
            .iter()
            .map(|v| LooseVersion::parse(v))
            .collect();
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
        assert_eq!(sorted, vec!["1.0.0", "1.0rc1", "1.2.0", "1.2.10", "2.0.0"]);
    }
}
