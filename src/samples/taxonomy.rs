//! Taxon keys and their expansion into rank columns.
//!
//! A taxon key identifies one taxon inside a kit and carries its full
//! lineage, so that rows for the same taxon coming from different channel
//! files land in the same merged row.
//!
//! * Fungi: `id__<id>;Kingdom__<k>;Philum__<p>;Class__<c>;Order__<o>;Family__<f>;Genus__<g>;Species__<s>`
//! * Bacteria: `<id>;<k>;<p>;<c>;<o>;<f>;<g>;<s>`

use crate::types::channel::SampleType;

/// Output header of each taxonomic rank, in lineage order.
pub const RANK_COLUMNS: [&str; 7] = [
    "Kingdom", "Philum", "Class", "Order", "Family", "Genus", "Species",
];

/// Rendered in place of a rank (or id) that is absent from the lineage.
pub const MISSING_RANK: &str = "__";

/// Taxonomy value marking a row without any classification.
pub const NO_TAXONOMY: &str = "No_Taxonomy";

/// A taxon key expanded into its id and rank columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub id: String,
    pub ranks: [String; 7],
}

/// Builds the key for one row of a raw sample file.
pub fn taxon_key(sample_type: SampleType, id: &str, taxonomy: &str) -> String {
    match sample_type {
        SampleType::Fungi => format!("id__{id};{taxonomy}"),
        // The first space separated token is a redundant root rank.
        SampleType::Bacteria => {
            let lineage: Vec<&str> = taxonomy.split(' ').skip(1).collect();
            format!("{id};{}", lineage.join(" "))
        }
    }
}

/// Splits a taxon key back into id and rank values.
///
/// Underscores inside values become spaces; empty or absent ranks render as
/// [`MISSING_RANK`].
///
/// # Examples
///
/// ```
/// use kit_data_merger::{parse_lineage, SampleType};
///
/// let lineage = parse_lineage(SampleType::Fungi, "id__T1;Kingdom__Fungi;Philum__Asco_mycota");
/// assert_eq!(lineage.id, "T1");
/// assert_eq!(lineage.ranks[0], "Fungi");
/// assert_eq!(lineage.ranks[1], "Asco mycota");
/// assert_eq!(lineage.ranks[2], "__");
/// ```
pub fn parse_lineage(sample_type: SampleType, key: &str) -> Lineage {
    let tokens: Vec<&str> = key.split(';').collect();

    let id = match sample_type {
        // An explicitly empty Fungi id stays empty; only a missing one is a sentinel.
        SampleType::Fungi => token_value(sample_type, &tokens, 0)
            .unwrap_or(MISSING_RANK)
            .to_string(),
        SampleType::Bacteria => render(token_value(sample_type, &tokens, 0)),
    };
    let ranks =
        std::array::from_fn(|rank| render(token_value(sample_type, &tokens, rank + 1)));
    Lineage { id, ranks }
}

fn token_value<'a>(sample_type: SampleType, tokens: &[&'a str], index: usize) -> Option<&'a str> {
    let token: &'a str = tokens.get(index).copied()?;
    match sample_type {
        SampleType::Fungi => token.split("__").nth(1),
        SampleType::Bacteria => Some(token),
    }
}

fn render(raw: Option<&str>) -> String {
    match raw {
        Some(value) if !value.is_empty() => value.replace('_', " "),
        _ => MISSING_RANK.to_string(),
    }
}
