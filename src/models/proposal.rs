use chrono::{DateTime, Utc};
use serde::Serialize;

pub type ProposalId = u64;

/// Client-side lifecycle of a proposal, derived from the `closed` flag and
/// the voting deadline. Never stored on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Open,
    Expired,
    Closed,
}

impl EffectiveStatus {
    pub fn derive(closed: bool, end_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if closed {
            Self::Closed
        } else if now > end_time {
            Self::Expired
        } else {
            Self::Open
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Expired => "expired",
            Self::Closed => "closed",
        }
    }
}

/// A proposal as the contract reports it, already range-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRecord {
    pub id: ProposalId,
    pub title: String,
    pub description: String,
    pub yes_votes: u64,
    pub no_votes: u64,
    pub created_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub closed: bool,
}

impl ProposalRecord {
    pub fn status_at(&self, now: DateTime<Utc>) -> EffectiveStatus {
        EffectiveStatus::derive(self.closed, self.end_time, now)
    }
}

/// A proposal enriched for the requesting account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub description: String,
    pub yes_votes: u64,
    pub no_votes: u64,
    pub created_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub closed: bool,
    pub has_voted: bool,
    /// Status as of the fetch that produced this value.
    pub status: EffectiveStatus,
}

impl Proposal {
    pub fn from_record(record: ProposalRecord, has_voted: bool, now: DateTime<Utc>) -> Self {
        let status = record.status_at(now);
        Self {
            id: record.id,
            title: record.title,
            description: record.description,
            yes_votes: record.yes_votes,
            no_votes: record.no_votes,
            created_at: record.created_at,
            end_time: record.end_time,
            closed: record.closed,
            has_voted,
            status,
        }
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> EffectiveStatus {
        EffectiveStatus::derive(self.closed, self.end_time, now)
    }

    pub fn can_vote_at(&self, now: DateTime<Utc>) -> bool {
        !self.has_voted && self.status_at(now) == EffectiveStatus::Open
    }

    pub fn can_close_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == EffectiveStatus::Expired
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn status_is_exactly_one_state() {
        let end = at(1_000);
        for closed in [false, true] {
            for offset in [-10, -1, 0, 1, 10] {
                let now = end + Duration::seconds(offset);
                let status = EffectiveStatus::derive(closed, end, now);
                let expected = if closed {
                    EffectiveStatus::Closed
                } else if offset > 0 {
                    EffectiveStatus::Expired
                } else {
                    EffectiveStatus::Open
                };
                assert_eq!(status, expected, "closed={closed} offset={offset}");
            }
        }
    }

    #[test]
    fn deadline_itself_is_still_open() {
        assert_eq!(
            EffectiveStatus::derive(false, at(50), at(50)),
            EffectiveStatus::Open
        );
    }

    fn proposal(closed: bool, has_voted: bool) -> Proposal {
        let record = ProposalRecord {
            id: 0,
            title: "t".to_string(),
            description: "d".to_string(),
            yes_votes: 0,
            no_votes: 0,
            created_at: at(0),
            end_time: at(100),
            closed,
        };
        Proposal::from_record(record, has_voted, at(10))
    }

    #[test]
    fn voted_proposal_never_offers_vote() {
        let voted = proposal(false, true);
        for now in [at(10), at(100), at(200)] {
            assert!(!voted.can_vote_at(now));
        }
        assert!(proposal(false, false).can_vote_at(at(10)));
        assert!(!proposal(true, false).can_vote_at(at(10)));
    }

    #[test]
    fn only_expired_proposals_can_be_closed() {
        let open = proposal(false, false);
        assert!(!open.can_close_at(at(100)));
        assert!(open.can_close_at(at(101)));
        assert!(!proposal(true, false).can_close_at(at(101)));
    }
}
