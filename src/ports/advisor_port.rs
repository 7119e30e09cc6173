//! Confidence advisor port trait.

use crate::domain::advice::Advice;
use crate::domain::error::TraderError;
use crate::domain::position::Position;
use crate::domain::symbol::Quote;

/// What the advisor is asked about: an entry candidate or a held position.
#[derive(Debug, Clone)]
pub struct AdviceRequest<'a> {
    pub quote: &'a Quote,
    pub position: Option<&'a Position>,
}

pub trait AdvisorPort {
    fn advise(&self, request: &AdviceRequest) -> Result<Advice, TraderError>;
}
