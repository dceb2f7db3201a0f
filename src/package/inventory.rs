//! Snapshots of installed packages and the changes between two of them.

use log::{info, warn};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::version;

/// Installed package name -> version, captured at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    packages: BTreeMap<String, String>,
}

/// How a package differs between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    New,
    Upgraded { from: String },
    Downgraded { from: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageChange {
    pub name: String,
    pub version: String,
    pub kind: ChangeKind,
}

impl Inventory {
    /// Parse installer listing output.
    ///
    /// Each line looks like `name (version)` or `name (version, annotation)`,
    /// e.g. `functools32 (3.2.3.post2)` or `gym (0.1.6, /www/gym)`.
    /// Lines that do not match are skipped.
    pub fn parse(listing: &str) -> Self {
        listing.lines().filter_map(parse_line).collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.packages.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.packages.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Packages that are new, upgraded or downgraded compared to `before`.
    /// Unchanged packages are left out. Packages that disappeared are ignored.
    pub fn changes_since(&self, before: &Inventory) -> Vec<PackageChange> {
        let mut changes = Vec::new();
        for (name, version) in &self.packages {
            let kind = match before.get(name) {
                None => {
                    info!("Installed new package: \"{} ({})\"", name, version);
                    ChangeKind::New
                }
                Some(previous) => match version::compare(previous, version) {
                    Ordering::Less => {
                        info!(
                            "Upgraded package \"{}\" from \"{}\" to \"{}\"",
                            name, previous, version
                        );
                        ChangeKind::Upgraded {
                            from: previous.to_string(),
                        }
                    }
                    Ordering::Greater => {
                        warn!(
                            "Package \"{}\" downgraded from \"{}\" to \"{}\". Are you sure that is what you want?",
                            name, previous, version
                        );
                        ChangeKind::Downgraded {
                            from: previous.to_string(),
                        }
                    }
                    Ordering::Equal => continue,
                },
            };
            changes.push(PackageChange {
                name: name.clone(),
                version: version.clone(),
                kind,
            });
        }
        changes
    }
}

impl FromIterator<(String, String)> for Inventory {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            packages: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Inventory {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect()
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let (name, rest) = line.split_once(" (")?;
    let name = name.trim();
    if name.is_empty() || name.contains('(') {
        return None;
    }
    let end = rest.find([' ', ',', ')']).unwrap_or(rest.len());
    Some((name.to_string(), rest[..end].to_string()))
}
