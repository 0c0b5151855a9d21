// When a draft is over.

use crate::models::Draft;

/// Total picks in a capped draft, `None` when `max_rounds` is 0.
pub fn total_picks(draft: &Draft) -> Option<i64> {
    (draft.max_rounds > 0).then(|| draft.num_teams * draft.max_rounds)
}

/// Whether the draft is complete once `pick_count` picks exist.
///
/// With a round cap the pick count alone decides, even against a status of
/// `Completed`. Without a cap only an explicit completion counts.
pub fn is_draft_complete(draft: &Draft, pick_count: i64) -> bool {
    match total_picks(draft) {
        Some(total) => pick_count >= total,
        None => draft.status.is_completed(),
    }
}
