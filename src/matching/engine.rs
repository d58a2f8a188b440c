// src/matching/engine.rs - Priority cascade over an indexed reference set
use std::collections::HashMap;

use crate::matching::distance::{distance_km, within_name_radius, within_proximity_box};
use crate::matching::normalize::{meaningful_tokens, normalize_name, outward_code};
use crate::models::stats_models::MatchMethod;
use crate::models::{DirectoryRecord, GeoPoint};

/// Shared meaningful tokens needed for an outward-code fuzzy match.
pub const MIN_SHARED_TOKENS: usize = 2;

/// Comparison keys of one record. Built by the same function for references
/// and candidates so both sides are always normalized identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKeys {
    pub name: String,
    pub postcode: Option<String>,
    pub outward: Option<String>,
}

impl MatchKeys {
    pub fn of(record: &DirectoryRecord) -> Self {
        let postcode = record.normalized_postcode();
        let outward = postcode
            .as_deref()
            .and_then(outward_code)
            .map(str::to_string);
        Self {
            name: normalize_name(&record.name),
            postcode,
            outward,
        }
    }
}

/// Records being matched against, with lookup indices. Index lists are kept
/// in ascending order, which is survivorship order: existing records were
/// loaded first and new records are appended in the order they were seen.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    records: Vec<DirectoryRecord>,
    keys: Vec<MatchKeys>,
    by_postcode: HashMap<String, Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
    by_outward: HashMap<String, Vec<usize>>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<DirectoryRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.push(record);
        }
        set
    }

    pub fn push(&mut self, record: DirectoryRecord) -> usize {
        let index = self.records.len();
        self.keys.push(MatchKeys::of(&record));
        self.records.push(record);
        self.index(index);
        index
    }

    /// Mutate a record in place and refresh its index entries.
    pub fn update<F>(&mut self, index: usize, f: F)
    where
        F: FnOnce(&mut DirectoryRecord),
    {
        self.unindex(index);
        f(&mut self.records[index]);
        self.keys[index] = MatchKeys::of(&self.records[index]);
        self.index(index);
    }

    pub fn get(&self, index: usize) -> Option<&DirectoryRecord> {
        self.records.get(index)
    }

    pub fn keys(&self, index: usize) -> Option<&MatchKeys> {
        self.keys.get(index)
    }

    pub fn records(&self) -> &[DirectoryRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<DirectoryRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn with_postcode(&self, normalized: &str) -> &[usize] {
        self.by_postcode.get(normalized).map(Vec::as_slice).unwrap_or(&[])
    }

    fn with_name(&self, normalized: &str) -> &[usize] {
        self.by_name.get(normalized).map(Vec::as_slice).unwrap_or(&[])
    }

    fn with_outward(&self, outward: &str) -> &[usize] {
        self.by_outward.get(outward).map(Vec::as_slice).unwrap_or(&[])
    }

    fn index(&mut self, index: usize) {
        let keys = self.keys[index].clone();
        if let Some(pc) = keys.postcode {
            insert_sorted(self.by_postcode.entry(pc).or_default(), index);
        }
        if !keys.name.is_empty() {
            insert_sorted(self.by_name.entry(keys.name).or_default(), index);
        }
        if let Some(outward) = keys.outward {
            insert_sorted(self.by_outward.entry(outward).or_default(), index);
        }
    }

    fn unindex(&mut self, index: usize) {
        let keys = &self.keys[index];
        if let Some(pc) = &keys.postcode {
            remove_from(&mut self.by_postcode, pc, index);
        }
        remove_from(&mut self.by_name, &keys.name, index);
        if let Some(outward) = &keys.outward {
            remove_from(&mut self.by_outward, outward, index);
        }
    }
}

fn insert_sorted(list: &mut Vec<usize>, index: usize) {
    if let Err(pos) = list.binary_search(&index) {
        list.insert(pos, index);
    }
}

fn remove_from(map: &mut HashMap<String, Vec<usize>>, key: &str, index: usize) {
    if let Some(list) = map.get_mut(key) {
        list.retain(|&i| i != index);
        if list.is_empty() {
            map.remove(key);
        }
    }
}

/// Which cascade tiers to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTiers {
    pub postcode: bool,
    pub name: bool,
    pub outward_fuzzy: bool,
    pub proximity: bool,
}

impl MatchTiers {
    /// Full cascade used when reconciling a source batch.
    pub const ALL: MatchTiers = MatchTiers {
        postcode: true,
        name: true,
        outward_fuzzy: true,
        proximity: true,
    };

    /// Postcode and name only. Coordinate refinement uses this: a building
    /// coordinate is only trusted when the identity evidence is textual.
    pub const IDENTITY: MatchTiers = MatchTiers {
        postcode: true,
        name: true,
        outward_fuzzy: false,
        proximity: false,
    };
}

impl Default for MatchTiers {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched { index: usize, method: MatchMethod },
    /// Several references fit equally; `candidates` is in survivorship order.
    Ambiguous { candidates: Vec<usize>, method: MatchMethod },
    Unmatched,
}

impl MatchOutcome {
    /// Index to merge into, taking the first candidate for an ambiguous match.
    pub fn resolved_index(&self) -> Option<usize> {
        match self {
            MatchOutcome::Matched { index, .. } => Some(*index),
            MatchOutcome::Ambiguous { candidates, .. } => candidates.first().copied(),
            MatchOutcome::Unmatched => None,
        }
    }

    pub fn method(&self) -> Option<MatchMethod> {
        match self {
            MatchOutcome::Matched { method, .. } | MatchOutcome::Ambiguous { method, .. } => {
                Some(*method)
            }
            MatchOutcome::Unmatched => None,
        }
    }
}

/// Find the reference describing the same place as `candidate`.
///
/// Tiers run in order and the first success wins:
/// 1. exact normalized postcode (narrowed by name when several share it)
/// 2. exact normalized name (nearest to `expected_centroid` when duplicated)
/// 3. same outward code and at least two shared meaningful name tokens
/// 4. coordinates within the proximity box
pub fn find_match(
    candidate: &DirectoryRecord,
    references: &ReferenceSet,
    expected_centroid: Option<GeoPoint>,
    tiers: MatchTiers,
) -> MatchOutcome {
    let keys = MatchKeys::of(candidate);

    if tiers.postcode {
        if let Some(outcome) = match_by_postcode(&keys, references) {
            return outcome;
        }
    }
    if tiers.name {
        if let Some(outcome) = match_by_name(&keys, references, expected_centroid) {
            return outcome;
        }
    }
    if tiers.outward_fuzzy {
        if let Some(outcome) = match_by_outward_tokens(&keys, references) {
            return outcome;
        }
    }
    if tiers.proximity {
        if let Some(point) = candidate.coordinates() {
            if let Some(outcome) = match_by_proximity(point, references) {
                return outcome;
            }
        }
    }
    MatchOutcome::Unmatched
}

fn match_by_postcode(keys: &MatchKeys, references: &ReferenceSet) -> Option<MatchOutcome> {
    let postcode = keys.postcode.as_deref()?;
    match references.with_postcode(postcode) {
        [] => None,
        [only] => Some(MatchOutcome::Matched {
            index: *only,
            method: MatchMethod::PostcodeExact,
        }),
        several => {
            let same_name = several.iter().copied().find(|&i| {
                !keys.name.is_empty()
                    && references.keys(i).map(|k| k.name == keys.name).unwrap_or(false)
            });
            Some(match same_name {
                Some(index) => MatchOutcome::Matched {
                    index,
                    method: MatchMethod::PostcodeName,
                },
                None => MatchOutcome::Ambiguous {
                    candidates: several.to_vec(),
                    method: MatchMethod::PostcodeFirst,
                },
            })
        }
    }
}

fn match_by_name(
    keys: &MatchKeys,
    references: &ReferenceSet,
    expected_centroid: Option<GeoPoint>,
) -> Option<MatchOutcome> {
    if keys.name.is_empty() {
        return None;
    }
    match references.with_name(&keys.name) {
        [] => None,
        [only] => Some(MatchOutcome::Matched {
            index: *only,
            method: MatchMethod::NameUnique,
        }),
        several => {
            let centroid = expected_centroid?;
            let (index, distance) = several
                .iter()
                .filter_map(|&i| {
                    let point = references.get(i)?.coordinates()?;
                    Some((i, distance_km(centroid, point)))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))?;
            within_name_radius(distance).then_some(MatchOutcome::Matched {
                index,
                method: MatchMethod::NameNearest,
            })
        }
    }
}

fn match_by_outward_tokens(keys: &MatchKeys, references: &ReferenceSet) -> Option<MatchOutcome> {
    let outward = keys.outward.as_deref()?;
    let candidate_tokens = meaningful_tokens(&keys.name);
    if candidate_tokens.len() < MIN_SHARED_TOKENS {
        return None;
    }
    references
        .with_outward(outward)
        .iter()
        .copied()
        .find(|&i| {
            references
                .keys(i)
                .map(|k| {
                    meaningful_tokens(&k.name)
                        .intersection(&candidate_tokens)
                        .count()
                        >= MIN_SHARED_TOKENS
                })
                .unwrap_or(false)
        })
        .map(|index| MatchOutcome::Matched {
            index,
            method: MatchMethod::OutwardFuzzy,
        })
}

fn match_by_proximity(point: GeoPoint, references: &ReferenceSet) -> Option<MatchOutcome> {
    references
        .records()
        .iter()
        .position(|r| {
            r.coordinates()
                .map(|other| within_proximity_box(point, other))
                .unwrap_or(false)
        })
        .map(|index| MatchOutcome::Matched {
            index,
            method: MatchMethod::CoordProximity,
        })
}
