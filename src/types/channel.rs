//! Defines the sample channels a kit can be sequenced from and the two
//! organism groups (sample types) the pipeline understands.

use std::fmt;
use std::str::FromStr;

/// The origin of a sample within a kit.
///
/// Every raw file belongs to exactly one channel, and every merged taxon row
/// carries one proportion column per channel, in the order of [`Channel::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Forward read.
    Forward,
    /// Reverse read.
    Reverse,
    /// Soil sample.
    Soil,
    /// Fruit or flower sample.
    Fruit,
    /// Leaf sample.
    Leaf,
}

impl Channel {
    /// All channels in output column order.
    pub const ALL: [Channel; 5] = [
        Channel::Forward,
        Channel::Reverse,
        Channel::Soil,
        Channel::Fruit,
        Channel::Leaf,
    ];

    /// The short code used in filenames and output headers.
    ///
    /// # Examples
    ///
    /// ```
    /// use kit_data_merger::Channel;
    ///
    /// assert_eq!(Channel::Fruit.code(), "Fr");
    /// assert_eq!(Channel::Leaf.code(), "L");
    /// ```
    pub fn code(&self) -> &'static str {
        match self {
            Channel::Forward => "F",
            Channel::Reverse => "R",
            Channel::Soil => "S",
            Channel::Fruit => "Fr",
            Channel::Leaf => "L",
        }
    }

    /// Slot of this channel inside a per-taxon frequency vector.
    pub(crate) fn index(&self) -> usize {
        match self {
            Channel::Forward => 0,
            Channel::Reverse => 1,
            Channel::Soil => 2,
            Channel::Fruit => 3,
            Channel::Leaf => 4,
        }
    }

    /// Parses a channel code case-insensitively ("fr", "FR" and "Fr" are all [`Channel::Fruit`]).
    pub fn from_code(code: &str) -> Option<Channel> {
        match code.to_ascii_uppercase().as_str() {
            "F" => Some(Channel::Forward),
            "R" => Some(Channel::Reverse),
            "S" => Some(Channel::Soil),
            "FR" => Some(Channel::Fruit),
            "L" => Some(Channel::Leaf),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The organism group a batch of raw files belongs to.
///
/// The two groups are laid out differently on disk and encode their
/// taxonomy differently, see [`crate::filter_samples`] and [`crate::merge_samples`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    /// Flat layout; frequencies are stored under a column named after the file.
    Bacteria,
    /// One folder per sequencing run with an `ASV` subfolder; `id`/`taxon`/`freq` columns.
    Fungi,
}

impl SampleType {
    pub fn name(&self) -> &'static str {
        match self {
            SampleType::Bacteria => "Bacteria",
            SampleType::Fungi => "Fungi",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bacteria" => Ok(SampleType::Bacteria),
            "fungi" => Ok(SampleType::Fungi),
            other => Err(format!("unknown sample type '{other}', expected Bacteria or Fungi")),
        }
    }
}
