// The draft-turn engine. Everything under here is pure: no I/O, no logging.

pub mod completion;
pub mod order;
pub mod sequencer;
pub mod status;

pub use completion::{is_draft_complete, total_picks};
pub use order::{current_position, current_team, round_of, OrderError, Seat};
pub use sequencer::{
    ensure_player_available, is_duplicate_player, validate_pick, PickError, ProposedPick,
};
pub use status::{DraftStatus, TransitionError};
