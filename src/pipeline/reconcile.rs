// src/pipeline/reconcile.rs - Per-candidate reconciliation against the directory
use indicatif::ProgressBar;
use log::debug;
use serde_json::Value;

use super::context::ReconciliationContext;
use crate::matching::distance::accept_refinement;
use crate::matching::engine::{find_match, MatchOutcome, MatchTiers};
use crate::matching::exclusion::{classify, ExclusionReason};
use crate::matching::normalize::{format_postcode, normalize_name};
use crate::models::stats_models::{MatchMethod, ReviewItem, SkipReason, SourceSummary};
use crate::models::record::round_coord;
use crate::models::{CandidateRecord, DirectoryRecord};
use crate::sources::SourceBatch;
use crate::utils::progress_bars::logging::{ReconcileLogger, StageKind};

/// Presentation keys every directory entry carries; new entries get them
/// empty so downstream templating sees a uniform shape.
fn presentation_placeholders() -> [(&'static str, Value); 4] {
    [
        ("slug", Value::Null),
        ("color1", Value::Null),
        ("color2", Value::Null),
        ("tags", Value::String(String::new())),
    ]
}

/// Where a candidate is in its one pass through the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateState {
    Unseen,
    Matched(MatchMethod),
    Unmatched,
    Merged { index: usize, method: MatchMethod },
    Appended { index: usize },
    Excluded(ExclusionReason),
    Skipped(SkipReason),
}

impl CandidateState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CandidateState::Merged { .. }
                | CandidateState::Appended { .. }
                | CandidateState::Excluded(_)
                | CandidateState::Skipped(_)
        )
    }

    fn allows(&self, next: &CandidateState) -> bool {
        use CandidateState::*;
        matches!(
            (self, next),
            (Unseen, Matched(_) | Unmatched | Excluded(_) | Skipped(_))
                | (Matched(_), Merged { .. })
                | (Unmatched, Appended { .. })
        )
    }

    fn advance(self, next: CandidateState) -> CandidateState {
        debug_assert!(self.allows(&next), "illegal transition {:?} -> {:?}", self, next);
        next
    }
}

/// Reconcile every candidate of `batch`, in order, and record its summary on
/// the context.
pub fn reconcile_batch(ctx: &mut ReconciliationContext, batch: SourceBatch, bar: &ProgressBar) -> SourceSummary {
    let logger = ReconcileLogger::new(StageKind::Source(batch.source));
    logger.log_start(ctx.run_id(), batch.len(), "candidates");

    let mut summary = SourceSummary::new(batch.source);
    summary.skipped_malformed += batch.rejected;
    bar.set_length(batch.len() as u64);

    for candidate in batch.candidates {
        summary.received += 1;
        let state = reconcile_candidate(ctx, candidate, &mut summary);
        debug_assert!(state.is_terminal());
        bar.inc(1);
    }
    bar.finish_and_clear();

    logger.log_source_summary(&summary);
    ctx.push_summary(summary.clone());
    summary
}

/// Drive one candidate to a terminal state, updating `summary`.
pub fn reconcile_candidate(
    ctx: &mut ReconciliationContext,
    mut candidate: CandidateRecord,
    summary: &mut SourceSummary,
) -> CandidateState {
    let state = CandidateState::Unseen;

    if !candidate.record.has_name() {
        summary.skipped_malformed += 1;
        return state.advance(CandidateState::Skipped(SkipReason::MissingName));
    }
    candidate.record.name = candidate.record.name.trim().to_string();

    if let Some(raw) = candidate.record.postcode.take() {
        match format_postcode(&raw) {
            Some(formatted) => candidate.record.postcode = Some(formatted),
            None => {
                debug!("Clearing invalid postcode '{}' on '{}'", raw, candidate.record.name);
                summary.invalid_postcodes_cleared += 1;
            }
        }
    }

    let classification = classify(&candidate);
    if let Some(reason) = classification.reason.filter(|_| classification.excluded) {
        debug!("Excluding '{}': {}", candidate.record.name, reason);
        *summary.excluded.entry(reason.label()).or_insert(0) += 1;
        return state.advance(CandidateState::Excluded(reason));
    }

    let mut record = candidate.record;
    record.category = classification.category;
    let outcome = find_match(&record, ctx.references(), record.coordinates(), MatchTiers::ALL);

    match outcome {
        MatchOutcome::Matched { index, method } => {
            let state = state.advance(CandidateState::Matched(method));
            merge_at(ctx, index, &record);
            *summary.merged.entry(method).or_insert(0) += 1;
            state.advance(CandidateState::Merged { index, method })
        }
        MatchOutcome::Ambiguous { candidates, method } if !candidates.is_empty() => {
            let state = state.advance(CandidateState::Matched(method));
            let index = candidates[0];
            let item = review_item(ctx, &record, &candidates);
            ctx.push_review(item);
            summary.ambiguous += 1;
            merge_at(ctx, index, &record);
            *summary.merged.entry(method).or_insert(0) += 1;
            state.advance(CandidateState::Merged { index, method })
        }
        MatchOutcome::Ambiguous { .. } | MatchOutcome::Unmatched => {
            let state = state.advance(CandidateState::Unmatched);
            append(ctx, state, record, summary)
        }
    }
}

fn append(
    ctx: &mut ReconciliationContext,
    state: CandidateState,
    mut record: DirectoryRecord,
    summary: &mut SourceSummary,
) -> CandidateState {
    for (key, empty) in presentation_placeholders() {
        record.extra.entry(key.to_string()).or_insert(empty);
    }
    record.latitude = record.latitude.map(round_coord);
    record.longitude = record.longitude.map(round_coord);
    *summary.appended_by_category.entry(record.category).or_insert(0) += 1;
    summary.appended += 1;
    let index = ctx.references_mut().push(record);
    state.advance(CandidateState::Appended { index })
}

fn merge_at(ctx: &mut ReconciliationContext, index: usize, incoming: &DirectoryRecord) {
    ctx.references_mut().update(index, |target| {
        merge_record(target, incoming);
    });
}

/// Fill gaps in `target` from `incoming`. Never overwrites a present value
/// except a coordinate of lower precision, and only when the better one lies
/// within the refinement radius. Records with a canonical page are left
/// untouched.
pub fn merge_record(target: &mut DirectoryRecord, incoming: &DirectoryRecord) -> bool {
    if target.has_canonical_page {
        return false;
    }
    let mut changed = false;
    for (slot, value) in [
        (&mut target.address, &incoming.address),
        (&mut target.postcode, &incoming.postcode),
        (&mut target.city, &incoming.city),
        (&mut target.phone, &incoming.phone),
        (&mut target.website, &incoming.website),
    ] {
        if slot.is_none() && value.is_some() {
            *slot = value.clone();
            changed = true;
        }
    }
    if let (Some(point), Some(precision)) = (incoming.coordinates(), incoming.effective_precision()) {
        let better = match target.effective_precision() {
            None => true,
            Some(current) => precision > current,
        };
        if better && accept_refinement(target.coordinates(), point) {
            target.set_coordinates(point, precision);
            changed = true;
        }
    }
    changed
}

fn review_item(ctx: &ReconciliationContext, record: &DirectoryRecord, candidates: &[usize]) -> ReviewItem {
    let names: Vec<String> = candidates
        .iter()
        .filter_map(|&i| ctx.references().get(i))
        .map(|r| r.name.clone())
        .collect();
    let chosen_name = names.first().cloned().unwrap_or_default();
    ReviewItem {
        source: record.source_tag,
        candidate_name: record.name.clone(),
        candidate_postcode: record.postcode.clone(),
        name_similarity: strsim::jaro_winkler(&normalize_name(&record.name), &normalize_name(&chosen_name)),
        chosen_name,
        alternatives: names.into_iter().skip(1).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, GeoPoint, LocationPrecision, SourceAttributes, SourceTag};

    fn existing(name: &str, postcode: &str) -> DirectoryRecord {
        let mut r = DirectoryRecord::new(name, SourceTag::ExistingDirectory);
        r.postcode = Some(postcode.to_string());
        r
    }

    fn candidate(name: &str, postcode: Option<&str>) -> CandidateRecord {
        let mut r = DirectoryRecord::new(name, SourceTag::OpenStreetMap);
        r.postcode = postcode.map(str::to_string);
        CandidateRecord::new(r)
    }

    fn summary() -> SourceSummary {
        SourceSummary::new(SourceTag::OpenStreetMap)
    }

    #[test]
    fn test_postcode_match_merges_into_existing() {
        let mut ctx = ReconciliationContext::new("run", vec![existing("Masjid Noor", "BD3 0DT")]);
        let mut s = summary();
        let mut c = candidate("Noor Mosque Bradford", Some("bd30dt"));
        c.record.city = Some("Bradford".to_string());

        let state = reconcile_candidate(&mut ctx, c, &mut s);

        assert_eq!(state, CandidateState::Merged { index: 0, method: MatchMethod::PostcodeExact });
        assert_eq!(ctx.references().len(), 1);
        assert_eq!(ctx.references().get(0).and_then(|r| r.city.as_deref()), Some("Bradford"));
        assert_eq!(s.merged.get(&MatchMethod::PostcodeExact), Some(&1));
    }

    #[test]
    fn test_canonical_record_is_not_modified() {
        let mut noor = existing("Masjid Noor", "BD3 0DT");
        noor.has_canonical_page = true;
        let before = noor.clone();
        let mut ctx = ReconciliationContext::new("run", vec![noor]);
        let mut c = candidate("Masjid Noor", Some("BD3 0DT"));
        c.record.city = Some("Bradford".to_string());
        c.record.set_coordinates(GeoPoint::new(53.795, -1.73), LocationPrecision::Building);

        reconcile_candidate(&mut ctx, c, &mut summary());

        assert_eq!(ctx.references().get(0), Some(&before));
    }

    #[test]
    fn test_sect_keyword_excludes() {
        let mut ctx = ReconciliationContext::new("run", vec![]);
        let mut s = summary();
        let state = reconcile_candidate(&mut ctx, candidate("Hussainiya Islamic Centre", Some("B11 1AA")), &mut s);

        assert!(matches!(state, CandidateState::Excluded(_)));
        assert!(ctx.references().is_empty());
        assert_eq!(s.total_excluded(), 1);
    }

    #[test]
    fn test_unmatched_prayer_room_is_appended() {
        let mut ctx = ReconciliationContext::new("run", vec![existing("Masjid Noor", "BD3 0DT")]);
        let mut s = summary();
        let state = reconcile_candidate(&mut ctx, candidate("University Prayer Room", Some("LS2 9JT")), &mut s);

        assert_eq!(state, CandidateState::Appended { index: 1 });
        let appended = ctx.references().get(1).unwrap();
        assert_eq!(appended.category, Category::PrayerRoom);
        assert_eq!(appended.source_tag, SourceTag::OpenStreetMap);
        assert!(!appended.has_canonical_page);
        assert_eq!(appended.extra.get("slug"), Some(&Value::Null));
        assert_eq!(s.appended_by_category.get(&Category::PrayerRoom), Some(&1));
    }

    #[test]
    fn test_missing_name_is_skipped() {
        let mut ctx = ReconciliationContext::new("run", vec![]);
        let mut s = summary();
        let state = reconcile_candidate(&mut ctx, candidate("   ", Some("BD3 0DT")), &mut s);
        assert_eq!(state, CandidateState::Skipped(SkipReason::MissingName));
        assert_eq!(s.skipped_malformed, 1);
        assert!(ctx.references().is_empty());
    }

    #[test]
    fn test_invalid_postcode_cleared_and_counted() {
        let mut ctx = ReconciliationContext::new("run", vec![]);
        let mut s = summary();
        reconcile_candidate(&mut ctx, candidate("Darul Uloom", Some("12345")), &mut s);
        assert_eq!(s.invalid_postcodes_cleared, 1);
        assert_eq!(ctx.references().get(0).and_then(|r| r.postcode.clone()), None);
    }

    #[test]
    fn test_ambiguous_match_goes_to_review() {
        let mut ctx = ReconciliationContext::new(
            "run",
            vec![existing("Khizra Mosque", "M1 3TA"), existing("Makki Masjid", "M1 3TA")],
        );
        let mut s = summary();
        let state = reconcile_candidate(&mut ctx, candidate("Darul Ihsan", Some("M1 3TA")), &mut s);

        assert_eq!(state, CandidateState::Merged { index: 0, method: MatchMethod::PostcodeFirst });
        assert_eq!(s.ambiguous, 1);
        assert_eq!(ctx.review().len(), 1);
        let item = &ctx.review()[0];
        assert_eq!(item.chosen_name, "Khizra Mosque");
        assert_eq!(item.alternatives, vec!["Makki Masjid".to_string()]);
        assert!(item.name_similarity < 1.0);
    }

    #[test]
    fn test_later_candidates_see_earlier_appends() {
        let mut ctx = ReconciliationContext::new("run", vec![]);
        let mut s = summary();
        reconcile_candidate(&mut ctx, candidate("Madni Masjid", Some("BD5 7BJ")), &mut s);
        let state = reconcile_candidate(&mut ctx, candidate("Madni Jamia Masjid", Some("BD5 7BJ")), &mut s);
        assert_eq!(state, CandidateState::Merged { index: 0, method: MatchMethod::PostcodeExact });
        assert_eq!(ctx.references().len(), 1);
    }

    #[test]
    fn test_multi_faith_listing_excluded() {
        let mut ctx = ReconciliationContext::new("run", vec![]);
        let mut s = SourceSummary::new(SourceTag::CommunityListing);
        let record = DirectoryRecord::new("Hospital Chapel", SourceTag::CommunityListing);
        let attributes = SourceAttributes { multi_faith: true, ..SourceAttributes::default() };
        let state = reconcile_candidate(&mut ctx, CandidateRecord::with_attributes(record, attributes), &mut s);
        assert_eq!(state, CandidateState::Excluded(ExclusionReason::MultiFaith));
        assert_eq!(s.excluded.get("multi_faith"), Some(&1));
    }

    #[test]
    fn test_merge_prefers_more_precise_coordinates() {
        let mut target = DirectoryRecord::new("Masjid Noor", SourceTag::ExistingDirectory);
        target.set_coordinates(GeoPoint::new(53.79, -1.73), LocationPrecision::PostcodeCentroid);
        let mut incoming = DirectoryRecord::new("Masjid Noor", SourceTag::OpenStreetMap);
        incoming.set_coordinates(GeoPoint::new(53.7951, -1.7302), LocationPrecision::Building);

        assert!(merge_record(&mut target, &incoming));
        assert_eq!(target.coordinates(), Some(GeoPoint::new(53.7951, -1.7302)));

        let mut vague = DirectoryRecord::new("Masjid Noor", SourceTag::CommunityListing);
        vague.set_coordinates(GeoPoint::new(53.0, -1.0), LocationPrecision::Approximate);
        assert!(!merge_record(&mut target, &vague));
        assert_eq!(target.location_precision, Some(LocationPrecision::Building));
    }

    #[test]
    fn test_merge_ignores_distant_building() {
        let mut target = DirectoryRecord::new("Jamia Ghausia", SourceTag::ExistingDirectory);
        target.set_coordinates(GeoPoint::new(53.0, -1.8), LocationPrecision::PostcodeCentroid);
        let mut incoming = DirectoryRecord::new("Jamia Ghausia", SourceTag::OpenStreetMap);
        incoming.set_coordinates(GeoPoint::new(53.108, -1.8), LocationPrecision::Building);

        assert!(!merge_record(&mut target, &incoming));
        assert_eq!(target.coordinates(), Some(GeoPoint::new(53.0, -1.8)));
    }

    #[test]
    fn test_batch_counts_every_candidate() {
        let mut ctx = ReconciliationContext::new("run", vec![existing("Masjid Noor", "BD3 0DT")]);
        let mut batch = SourceBatch::new(SourceTag::OpenStreetMap);
        batch.rejected = 2;
        batch.candidates = vec![
            candidate("Masjid Noor", Some("BD3 0DT")),
            candidate("Imambargah Hussaini", None),
            candidate("", None),
            candidate("Makki Masjid", Some("M13 0TA")),
        ];

        let s = reconcile_batch(&mut ctx, batch, &ProgressBar::hidden());

        assert_eq!(s.received, 4);
        assert_eq!(s.total_merged(), 1);
        assert_eq!(s.total_excluded(), 1);
        assert_eq!(s.skipped_malformed, 3);
        assert_eq!(s.appended, 1);
        assert_eq!(ctx.summaries().len(), 1);
        assert_eq!(ctx.references().len(), 2);
    }
}
