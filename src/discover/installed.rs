//! Registries of packages already installed through each channel.
//!
//! Built from the captured text of `conda list` / `pip list`; the commands
//! themselves are run by the caller.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::model::{Channel, PackageName};
use crate::traits::DiscoveryError;

#[derive(Debug, Clone)]
pub struct InstalledRegistry {
    channel: Channel,
    names: HashSet<PackageName>,
}

impl InstalledRegistry {
    pub fn empty(channel: Channel) -> Self {
        Self {
            channel,
            names: HashSet::new(),
        }
    }

    pub fn from_names<I, S>(channel: Channel, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            channel,
            names: names
                .into_iter()
                .filter_map(|name| PackageName::new(name.as_ref()))
                .collect(),
        }
    }

    /// Parses listing output: the first column of every row, skipping
    /// `#` comment headers, the `Package Version` header and `---` rules.
    pub fn from_listing(channel: Channel, listing: &str) -> Self {
        let names = listing
            .lines()
            .filter_map(|line| {
                let first = line.split_whitespace().next()?;
                if first.starts_with('#') || first.starts_with('-') || first == "Package" {
                    debug!(line = line.trim(), channel = %channel, "skipping listing header");
                    return None;
                }
                PackageName::new(first)
            })
            .collect();

        Self { channel, names }
    }

    pub fn from_listing_file(channel: Channel, path: &Path) -> Result<Self, DiscoveryError> {
        if !path.is_file() {
            return Err(DiscoveryError::NotFound(path.to_path_buf()));
        }
        let listing = fs::read_to_string(path).map_err(|source| DiscoveryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_listing(channel, &listing))
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn contains(&self, name: &PackageName) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Assigns scanned imports to a channel using the installed registries.
#[derive(Debug, Clone)]
pub struct Classifier {
    primary: InstalledRegistry,
    secondary: InstalledRegistry,
    unlisted: Option<Channel>,
}

impl Classifier {
    /// Names found in neither registry go to the secondary channel, whose
    /// package index can be queried directly.
    pub fn new(primary: InstalledRegistry, secondary: InstalledRegistry) -> Self {
        Self {
            primary,
            secondary,
            unlisted: Some(Channel::Secondary),
        }
    }

    /// Channel for names in neither registry; `None` drops them.
    pub fn with_unlisted(mut self, unlisted: Option<Channel>) -> Self {
        self.unlisted = unlisted;
        self
    }

    /// The primary registry wins when a name is installed through both channels.
    pub fn classify(&self, name: &PackageName) -> Option<Channel> {
        if self.primary.contains(name) {
            Some(Channel::Primary)
        } else if self.secondary.contains(name) {
            Some(Channel::Secondary)
        } else {
            self.unlisted
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(
            InstalledRegistry::empty(Channel::Primary),
            InstalledRegistry::empty(Channel::Secondary),
        )
    }
}
