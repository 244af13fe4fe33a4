//! Cassette core: interaction list, record-mode policy and the
//! match/consume/record state machine

mod engine;
mod mode;

pub use engine::{Cassette, CassetteOptions};
pub use mode::RecordMode;

use crate::http::{Request, Response};

/// One captured request/response pair.
///
/// The played counter only ever increases during a session; it resets only
/// when the cassette is reloaded from disk. Consumed interactions stay in
/// the list so diagnostics and `all_played` can see the full history.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    /// The stored request, post-filtering
    pub request: Request,
    /// The response served when the request matches
    pub response: Response,
    played: u64,
}

impl Interaction {
    /// Create an unplayed interaction
    #[must_use]
    pub fn new(request: Request, response: Response) -> Self {
        Self {
            request,
            response,
            played: 0,
        }
    }

    /// How many times this interaction has been served this session
    #[must_use]
    pub fn played(&self) -> u64 {
        self.played
    }

    pub(crate) fn mark_played(&mut self) {
        self.played += 1;
    }
}
