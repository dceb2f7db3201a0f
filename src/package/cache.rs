//! Persisted package cache.
//!
//! One JSON object per line: `{"name": .., "version": .., "source": ..}`.
//! Lines are independent so one unreadable line never hides the others.

use anyhow::{Context, Result};
use log::debug;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

use super::PackageRecord;

/// One line of the cache file.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLine {
    Record(PackageRecord),
    /// A line that could not be decoded, with the reason.
    Corrupt { line: String, reason: String },
}

/// Lazy iterator over the lines of the cache file.
pub struct CacheLines {
    lines: Option<Lines<BufReader<Box<dyn Read + Send>>>>,
}

impl CacheLines {
    fn empty() -> Self {
        Self { lines: None }
    }
}

impl Iterator for CacheLines {
    type Item = CacheLine;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    return Some(CacheLine::Corrupt {
                        line: String::new(),
                        reason: e.to_string(),
                    });
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(match serde_json::from_str::<PackageRecord>(&line) {
                Ok(record) => CacheLine::Record(record),
                Err(e) => CacheLine::Corrupt {
                    line,
                    reason: e.to_string(),
                },
            });
        }
    }
}

/// Reads and rewrites the cache file through the runtime.
pub struct PackageCache<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
}

impl<'a, R: Runtime> PackageCache<'a, R> {
    pub fn new(runtime: &'a R, path: PathBuf) -> Self {
        Self { runtime, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the cache line by line. A missing file yields nothing.
    /// Call again to start over.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Result<CacheLines> {
        if !self.runtime.exists(&self.path) {
            debug!("No package cache at {:?}", self.path);
            return Ok(CacheLines::empty());
        }
        let reader = self
            .runtime
            .open(&self.path)
            .with_context(|| format!("Failed to open package cache {:?}", self.path))?;
        Ok(CacheLines {
            lines: Some(BufReader::new(reader).lines()),
        })
    }

    /// Rewrite the whole cache from `records`.
    #[tracing::instrument(skip(self, records))]
    pub fn save<'r, I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'r PackageRecord>,
    {
        let mut content = String::new();
        for record in records {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }

        self.runtime
            .write(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to save package cache to {:?}", self.path))
    }
}
