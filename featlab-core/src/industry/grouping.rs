//! Industry membership: industry key → ordered instrument indices.
//!
//! Built once per (run, level) from the instrument master and reused for every
//! date, so aggregation never re-filters the feature table.

use crate::domain::{IndustryLabels, IndustryLevel, InstrumentFeatures, InstrumentMaster};
use std::collections::{BTreeMap, HashMap};

/// One industry group at one level.
#[derive(Debug, Clone, PartialEq)]
pub struct IndustryGroup {
    pub labels: IndustryLabels,
    /// Indices into the feature slice the groups were built from, ascending.
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndustryGroups {
    groups: Vec<IndustryGroup>,
}

/// Per-code membership view of the master.
///
/// A code listed under several markets uses its first non-fund row; a code
/// listed only as a fund is excluded from industry membership.
pub(crate) struct Membership<'a> {
    by_code: HashMap<&'a str, Option<&'a InstrumentMaster>>,
}

impl<'a> Membership<'a> {
    pub(crate) fn new(master: &'a [InstrumentMaster]) -> Self {
        let mut by_code: HashMap<&str, Option<&InstrumentMaster>> = HashMap::new();
        for row in master {
            let entry = by_code.entry(row.code.as_str()).or_insert(None);
            if entry.is_none() && !row.is_fund() {
                *entry = Some(row);
            }
        }
        Self { by_code }
    }

    pub(crate) fn is_fund(&self, code: &str) -> bool {
        matches!(self.by_code.get(code), Some(None))
    }

    /// Classification row for a code; `None` for codes absent from the master.
    pub(crate) fn classification(&self, code: &str) -> Option<&'a InstrumentMaster> {
        self.by_code.get(code).copied().flatten()
    }
}

impl IndustryGroups {
    /// Group non-fund instruments by their classification at `level`.
    ///
    /// Instruments without a master row fall into the `Unknown` industry.
    /// Groups are ordered by (large, mid, small) label.
    pub fn build(
        features: &[InstrumentFeatures],
        master: &[InstrumentMaster],
        level: IndustryLevel,
    ) -> Self {
        let membership = Membership::new(master);
        let mut by_labels: BTreeMap<(String, String, String), IndustryGroup> = BTreeMap::new();

        for (idx, f) in features.iter().enumerate() {
            let code = f.instrument_id.as_str();
            if membership.is_fund(code) {
                continue;
            }
            let labels = match membership.classification(code) {
                Some(m) => level.labels(&m.industry_large, &m.industry_mid, &m.industry_small),
                None => level.labels("", "", ""),
            };
            by_labels
                .entry((labels.large.clone(), labels.mid.clone(), labels.small.clone()))
                .or_insert_with(|| IndustryGroup {
                    labels,
                    members: Vec::new(),
                })
                .members
                .push(idx);
        }

        Self {
            groups: by_labels.into_values().collect(),
        }
    }

    pub fn groups(&self) -> &[IndustryGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
