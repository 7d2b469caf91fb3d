use crate::models::MatchStatus;

impl MatchStatus {
    /// Statuses reachable from this one in a single step
    pub fn successors(self) -> &'static [MatchStatus] {
        match self {
            MatchStatus::Pending => &[MatchStatus::Accepted, MatchStatus::Rejected],
            MatchStatus::Accepted => &[MatchStatus::Mutual, MatchStatus::Rejected],
            MatchStatus::Rejected => &[MatchStatus::Accepted],
            MatchStatus::Mutual => &[MatchStatus::Completed, MatchStatus::Ended],
            MatchStatus::Completed | MatchStatus::Ended => &[],
        }
    }

    /// Whether `self -> next` is a legal edge; same-status requests are not
    #[inline]
    pub fn can_transition_to(self, next: MatchStatus) -> bool {
        self.successors().contains(&next)
    }

    /// Whether a brand-new match record may start in this status
    ///
    /// A record is created as `pending` or may skip straight to one of
    /// `pending`'s successors.
    #[inline]
    pub fn is_valid_initial(self) -> bool {
        self == MatchStatus::Pending || MatchStatus::Pending.can_transition_to(self)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}
