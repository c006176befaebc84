//! Decides which raw files are kit sample files.
//!
//! A sample file name starts with `S<kit id>_<channel>`, e.g. `S12_F_rarefied.csv`
//! or `S7_Fr.txt`. Matching ignores case; this is the only rule both the
//! filter and the merger use to tell sample files apart from everything else.

use crate::types::channel::Channel;
use once_cell::sync::Lazy;
use regex::Regex;

static SAMPLE_FILE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^S(\d+)_(Fr|R|S|F|L)(.*)").expect("sample file pattern is a valid regex")
});

/// The parts of a classified sample file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFileName {
    /// Numeric kit identifier, digits exactly as they appear in the name.
    pub kit_id: String,
    pub channel: Channel,
    /// Everything after the channel code, extension included.
    pub rest: String,
}

impl SampleFileName {
    /// The staging name: `S<kit>_<channel><REST>`.
    ///
    /// The remainder is upper-cased unless the channel is [`Channel::Fruit`],
    /// whose mixed-case `Fr` code would otherwise become ambiguous.
    ///
    /// # Examples
    ///
    /// ```
    /// use kit_data_merger::classify;
    ///
    /// let name = classify("s99_fr_extra.txt").unwrap();
    /// assert_eq!(name.canonical_name(), "S99_Fr_extra.txt");
    /// assert_eq!(classify("s3_l_raw.csv").unwrap().canonical_name(), "S3_L_RAW.CSV");
    /// ```
    pub fn canonical_name(&self) -> String {
        let rest = if self.channel == Channel::Fruit {
            self.rest.clone()
        } else {
            self.rest.to_uppercase()
        };
        format!("S{}_{}{}", self.kit_id, self.channel.code(), rest)
    }
}

/// Classifies a file name into kit id and channel.
///
/// Returns `None` when the name is not a sample file; callers skip such files.
pub fn classify(file_name: &str) -> Option<SampleFileName> {
    let captures = SAMPLE_FILE_PATTERN.captures(file_name)?;
    let kit_id = captures.get(1)?.as_str().to_string();
    let channel = Channel::from_code(captures.get(2)?.as_str())?;
    let rest = captures
        .get(3)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    Some(SampleFileName {
        kit_id,
        channel,
        rest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_case_fruit_file_keeps_fr_code() {
        let name = classify("s99_fr_extra.txt").unwrap();
        assert_eq!(name.kit_id, "99");
        assert_eq!(name.channel, Channel::Fruit);
        assert_eq!(name.channel.code(), "Fr");
    }

    #[test]
    fn every_channel_is_recognised() {
        let cases = [
            ("S7_F.csv", Channel::Forward),
            ("S7_R.csv", Channel::Reverse),
            ("S7_S.csv", Channel::Soil),
            ("S7_Fr.csv", Channel::Fruit),
            ("S7_L.csv", Channel::Leaf),
        ];
        for (file, channel) in cases {
            let name = classify(file).unwrap();
            assert_eq!(name.kit_id, "7", "{file}");
            assert_eq!(name.channel, channel, "{file}");
        }
    }

    #[test]
    fn non_sample_names_are_rejected() {
        for file in ["readme.txt", "S_7_F.csv", "S7F.csv", "7_F.csv", "xS7_F.csv", "S7_X.csv", ""] {
            assert_eq!(classify(file), None, "{file}");
        }
    }

    #[test]
    fn classification_is_stable() {
        for file in ["S12_L_A.csv", "s5_FR", "readme.md", "S001_S"] {
            assert_eq!(classify(file), classify(file));
        }
    }

    #[test]
    fn canonical_name_reclassifies_to_same_kit_and_channel() {
        for file in ["s12_f_run1.tsv", "S3_Fr_x.csv", "s44_s"] {
            let first = classify(file).unwrap();
            let second = classify(&first.canonical_name()).unwrap();
            assert_eq!(first.kit_id, second.kit_id);
            assert_eq!(first.channel, second.channel);
        }
    }

    #[test]
    fn leading_zeros_are_kept() {
        assert_eq!(classify("S007_L.csv").unwrap().kit_id, "007");
    }
}
