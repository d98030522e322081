pub use crate::config::*;

use chrono::{DateTime, Utc};
use log::info;
use snafu::prelude::*;

use crate::store::{ActorIdentity, ProtocolStore};

/// A builder for new protocols, as submitted from the field.
///
/// ```
/// use chrono::NaiveDate;
/// use protocol_count::builder::Submission;
/// use protocol_count::store::Anonymous;
/// use protocol_count::{Ballot, WardId};
/// # use protocol_count::CountingError;
///
/// let ballot = Ballot {
///     voting_date: NaiveDate::from_ymd_opt(2015, 5, 10).unwrap(),
///     no: 1,
/// };
/// let protocol = Submission::new(ballot, WardId::new("146501", 12))
///     .counts(1200, 800, 798, 790)
///     .options(&[400, 390])
///     .client_id("phone-42")
///     .build(&Anonymous)?;
///
/// assert!(!protocol.verified);
/// assert!(protocol.approvals.is_empty());
/// # Ok::<(), CountingError>(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Submission {
    pub(crate) ballot: Ballot,
    pub(crate) ward: WardId,
    pub(crate) client_id: Option<String>,
    pub(crate) voters_entitled_count: u64,
    pub(crate) ballots_given_count: u64,
    pub(crate) votes_cast_count: u64,
    pub(crate) votes_valid_count: u64,
    pub(crate) votes_count_per_option: Vec<u64>,
    pub(crate) comment: Option<String>,
}

impl Submission {
    pub fn new(ballot: Ballot, ward: WardId) -> Submission {
        Submission {
            ballot,
            ward,
            client_id: None,
            voters_entitled_count: 0,
            ballots_given_count: 0,
            votes_cast_count: 0,
            votes_valid_count: 0,
            votes_count_per_option: Vec::new(),
            comment: None,
        }
    }

    pub fn client_id(self, client_id: &str) -> Submission {
        Submission {
            client_id: Some(client_id.to_string()),
            ..self
        }
    }

    /// The scalar counts: voters entitled to vote, ballots given, votes cast, valid votes.
    pub fn counts(self, entitled: u64, given: u64, cast: u64, valid: u64) -> Submission {
        Submission {
            voters_entitled_count: entitled,
            ballots_given_count: given,
            votes_cast_count: cast,
            votes_valid_count: valid,
            ..self
        }
    }

    /// The votes per option, in the order of the options on the ballot.
    pub fn options(self, votes: &[u64]) -> Submission {
        Submission {
            votes_count_per_option: votes.to_vec(),
            ..self
        }
    }

    pub fn comment(self, comment: &str) -> Submission {
        let c = comment.trim();
        Submission {
            comment: if c.is_empty() {
                None
            } else {
                Some(c.to_string())
            },
            ..self
        }
    }

    /// Checks that the counts are consistent with each other.
    pub fn validate(&self) -> CountingResult<()> {
        ensure!(
            !self.ward.community_code.trim().is_empty(),
            InvalidArgumentSnafu {
                reason: "the community code may not be empty"
            }
        );
        ensure!(
            self.ballots_given_count <= self.voters_entitled_count,
            InvalidArgumentSnafu {
                reason: format!(
                    "{} ballots given for {} entitled voters",
                    self.ballots_given_count, self.voters_entitled_count
                )
            }
        );
        ensure!(
            self.votes_cast_count <= self.ballots_given_count,
            InvalidArgumentSnafu {
                reason: format!(
                    "{} votes cast for {} ballots given",
                    self.votes_cast_count, self.ballots_given_count
                )
            }
        );
        ensure!(
            self.votes_valid_count <= self.votes_cast_count,
            InvalidArgumentSnafu {
                reason: format!(
                    "{} valid votes for {} votes cast",
                    self.votes_valid_count, self.votes_cast_count
                )
            }
        );
        ensure!(
            !self.votes_count_per_option.is_empty(),
            InvalidArgumentSnafu {
                reason: "no votes per option"
            }
        );
        let options_total: u64 = self.votes_count_per_option.iter().sum();
        ensure!(
            options_total <= self.votes_valid_count,
            InvalidArgumentSnafu {
                reason: format!(
                    "{} votes for the options but only {} valid votes",
                    options_total, self.votes_valid_count
                )
            }
        );
        Ok(())
    }

    /// Creates the protocol, timestamped now.
    pub fn build(self, identity: &dyn ActorIdentity) -> CountingResult<Protocol> {
        self.build_at(identity, Utc::now())
    }

    /// Creates the protocol. An authenticated submitter approves its own protocol.
    pub fn build_at(
        self,
        identity: &dyn ActorIdentity,
        now: DateTime<Utc>,
    ) -> CountingResult<Protocol> {
        self.validate()?;
        let approvals = identity.actor_id().into_iter().collect();
        Ok(Protocol {
            id: ProtocolId::new(),
            client_id: self.client_id,
            ballot: self.ballot,
            ward: self.ward,
            voters_entitled_count: self.voters_entitled_count,
            ballots_given_count: self.ballots_given_count,
            votes_cast_count: self.votes_cast_count,
            votes_valid_count: self.votes_valid_count,
            votes_count_per_option: self.votes_count_per_option,
            comment: self.comment,
            verified: false,
            approvals,
            deprecations: Default::default(),
            image_ids: Default::default(),
            creation_time: now,
            update_time: now,
            revision: 0,
        })
    }
}

/// Validates a submission and stores the new protocol.
pub fn submit<S: ProtocolStore + ?Sized>(
    store: &S,
    submission: Submission,
    identity: &dyn ActorIdentity,
) -> CountingResult<Protocol> {
    let protocol = submission.build(identity)?;
    let stored = store.insert(protocol)?;
    info!(
        "Protocol {} submitted for ward {} in ballot {}",
        stored.id, stored.ward, stored.ballot
    );
    Ok(stored)
}
