// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tag derivation and order-independent tag hashing.

use crate::envelope::Envelope;
use sha2::{Digest, Sha256};
use std::fmt;

/// Ordered `key=value` tags of a series.
///
/// The order is the order the tags were derived in and only shows up in the rendered line;
/// series identity goes through [`TagSet::hash`], which ignores it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    values: Vec<String>,
}

/// Grouping identifier of a tag set. Not meant as a security hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagsHash([u8; 32]);

impl TagSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the tags of an envelope: `deployment`, `job`, `index` and `ip` first, then every
    /// free-form tag. Empty values are skipped.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let mut tags = Self::new();
        tags.push("deployment", envelope.deployment.as_deref().unwrap_or_default());
        tags.push("job", envelope.job.as_deref().unwrap_or_default());
        tags.push("index", envelope.index.as_deref().unwrap_or_default());
        tags.push("ip", envelope.ip.as_deref().unwrap_or_default());
        for (key, value) in &envelope.tags {
            tags.push(key, value);
        }
        tags
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut tags = Self::new();
        for (key, value) in pairs {
            tags.push(key, value);
        }
        tags
    }

    /// Appends `key=value` unless `value` is empty.
    pub fn push(&mut self, key: &str, value: &str) {
        if !value.is_empty() {
            self.values.push(format!("{key}={value}"));
        }
    }

    /// Digest of every tag, sorted first so insertion order never changes the result.
    #[must_use]
    pub fn hash(&self) -> TagsHash {
        let mut sorted: Vec<&str> = self.values.iter().map(String::as_str).collect();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        for tag in sorted {
            hasher.update(Sha256::digest(tag.as_bytes()));
        }
        TagsHash(hasher.finalize().into())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tag) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(tag)?;
        }
        Ok(())
    }
}
