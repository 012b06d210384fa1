mod engine;
mod round;
mod summary;
mod transcript;

pub use engine::{CancelToken, DebateEngine};
pub use round::RoundOrchestrator;
pub use summary::{ModeratorReport, Summarizer, fallback_report, parse_points, parse_report};
pub use transcript::{council_members, full_transcript, round_context};
