// ********* Input data structures ***********

use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use snafu::prelude::*;
use uuid::Uuid;

/// The stable identifier of an authenticated actor (reviewer, submitter).
pub type ActorId = String;

/// One election round: a voting date and the number of the ballot on that date
/// (first round, second round, ...).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct Ballot {
    pub voting_date: NaiveDate,
    pub no: u32,
}

impl Display for Ballot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.voting_date, self.no)
    }
}

/// The identity of a polling ward: the community it belongs to and its number
/// inside that community.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct WardId {
    pub community_code: String,
    pub no: u32,
}

impl WardId {
    pub fn new(community_code: &str, no: u32) -> WardId {
        WardId {
            community_code: community_code.to_string(),
            no,
        }
    }
}

impl Display for WardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.community_code, self.no)
    }
}

/// A position in degrees.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> CountingResult<GeoPoint> {
        let p = GeoPoint {
            latitude,
            longitude,
        };
        ensure!(
            p.is_valid(),
            InvalidArgumentSnafu {
                reason: format!("invalid coordinates ({}, {})", latitude, longitude)
            }
        );
        Ok(p)
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A polling ward, as provided by the reference data.
#[derive(PartialEq, Debug, Clone)]
pub struct Ward {
    pub community_code: String,
    pub no: u32,
    pub location: Option<GeoPoint>,
}

impl Ward {
    pub fn id(&self) -> WardId {
        WardId::new(&self.community_code, self.no)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct ProtocolId(pub Uuid);

impl ProtocolId {
    pub fn new() -> ProtocolId {
        ProtocolId(Uuid::new_v4())
    }
}

impl Default for ProtocolId {
    fn default() -> Self {
        ProtocolId::new()
    }
}

impl Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ProtocolId {
    type Err = CountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Uuid::parse_str(s.trim()) {
            Ok(u) => Ok(ProtocolId(u)),
            Err(e) => InvalidArgumentSnafu {
                reason: format!("invalid protocol id {:?}: {}", s, e),
            }
            .fail(),
        }
    }
}

/// One field submission of the counted results for one ward in one ballot.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Protocol {
    pub id: ProtocolId,
    /// Correlation id chosen by the submitting client.
    pub client_id: Option<String>,
    pub ballot: Ballot,
    pub ward: WardId,
    pub voters_entitled_count: u64,
    pub ballots_given_count: u64,
    pub votes_cast_count: u64,
    pub votes_valid_count: u64,
    /// Votes for each option, in the order of the options on the ballot.
    pub votes_count_per_option: Vec<u64>,
    pub comment: Option<String>,
    /// Informational. Only set by administrators, never by the verification workflow.
    pub verified: bool,
    pub approvals: BTreeSet<ActorId>,
    pub deprecations: BTreeSet<ActorId>,
    pub image_ids: BTreeSet<Uuid>,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    /// Bumped by the store on every successful write.
    pub revision: u64,
}

impl Protocol {
    pub fn is_same_ward(&self, other: &Protocol) -> bool {
        self.ward == other.ward
    }

    /// Approvals minus deprecations.
    pub fn net_endorsement(&self) -> i64 {
        self.approvals.len() as i64 - self.deprecations.len() as i64
    }
}

// ******** Output data structures *********

/// Vote counts for a single ward, or summed over a whole ballot.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct BallotResult {
    pub voters_entitled_count: u64,
    pub ballots_given_count: u64,
    pub votes_cast_count: u64,
    pub votes_valid_count: u64,
    pub votes_count_per_option: Vec<u64>,
}

impl BallotResult {
    /// The neutral element for a ballot with `num_options` options.
    pub fn zero(num_options: usize) -> BallotResult {
        BallotResult {
            votes_count_per_option: vec![0; num_options],
            ..Default::default()
        }
    }

    /// Adds `other` to this result, element-wise.
    ///
    /// The option vectors must have the same length, and no count may overflow.
    /// On error, `self` is left untouched.
    pub fn accumulate(&mut self, other: &BallotResult, ward: &WardId) -> CountingResult<()> {
        ensure!(
            self.votes_count_per_option.len() == other.votes_count_per_option.len(),
            ShapeMismatchSnafu {
                expected: self.votes_count_per_option.len(),
                found: other.votes_count_per_option.len(),
                ward: ward.to_string(),
            }
        );
        let add = |a: u64, b: u64| {
            a.checked_add(b).context(InvalidArgumentSnafu {
                reason: format!("vote count overflow in ward {}", ward),
            })
        };
        // Everything is computed before `self` is touched.
        let voters_entitled_count = add(self.voters_entitled_count, other.voters_entitled_count)?;
        let ballots_given_count = add(self.ballots_given_count, other.ballots_given_count)?;
        let votes_cast_count = add(self.votes_cast_count, other.votes_cast_count)?;
        let votes_valid_count = add(self.votes_valid_count, other.votes_valid_count)?;
        let votes_count_per_option = self
            .votes_count_per_option
            .iter()
            .zip(other.votes_count_per_option.iter())
            .map(|(a, b)| add(*a, *b))
            .collect::<CountingResult<Vec<u64>>>()?;
        *self = BallotResult {
            voters_entitled_count,
            ballots_given_count,
            votes_cast_count,
            votes_valid_count,
            votes_count_per_option,
        };
        Ok(())
    }
}

impl From<&Protocol> for BallotResult {
    fn from(protocol: &Protocol) -> Self {
        BallotResult {
            voters_entitled_count: protocol.voters_entitled_count,
            ballots_given_count: protocol.ballots_given_count,
            votes_cast_count: protocol.votes_cast_count,
            votes_valid_count: protocol.votes_valid_count,
            votes_count_per_option: protocol.votes_count_per_option.clone(),
        }
    }
}

/// The result retained for one ward.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct WardTally {
    pub ward: WardId,
    /// Number of protocols submitted for this ward.
    pub submissions: usize,
    pub selected: ProtocolId,
    pub result: BallotResult,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BallotTally {
    pub ballot: Option<Ballot>,
    pub total: BallotResult,
    /// Ordered by ward.
    pub wards: Vec<WardTally>,
    /// Wards for which competing protocols had to be resolved.
    pub contested_wards: Vec<WardId>,
    pub protocol_count: usize,
}

/// The decision of a reviewer about a protocol.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Decision {
    Approval,
    Deprecation,
}

impl Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Approval => write!(f, "APPROVAL"),
            Decision::Deprecation => write!(f, "DEPRECATION"),
        }
    }
}

impl FromStr for Decision {
    type Err = CountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "APPROVAL" => Ok(Decision::Approval),
            "DEPRECATION" => Ok(Decision::Deprecation),
            _ => InvalidArgumentSnafu {
                reason: format!("unknown decision {:?}", s),
            }
            .fail(),
        }
    }
}

/// Errors surfaced by the counting core.
#[derive(Eq, PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum CountingError {
    #[snafu(display("{entity} {key} not found"))]
    NotFound { entity: String, key: String },

    #[snafu(display("invalid argument: {reason}"))]
    InvalidArgument { reason: String },

    #[snafu(display(
        "ward {ward} reports {found} options but {expected} were expected"
    ))]
    ShapeMismatch {
        expected: usize,
        found: usize,
        ward: String,
    },

    #[snafu(display(
        "protocol {id} was modified concurrently (expected revision {expected}, found {found})"
    ))]
    Conflict {
        id: ProtocolId,
        expected: u64,
        found: u64,
    },
}

pub type CountingResult<T> = Result<T, CountingError>;

// ********* Configuration **********

/// How competing protocols for the same ward are ranked.
///
/// In both modes a verified protocol always wins over an unverified one, and the
/// lowest protocol id settles any remaining tie.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SelectionMode {
    /// Net endorsement first, then the most recent update.
    ApprovalsFirst,
    /// Most recent update first, then net endorsement.
    LatestFirst,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CountingRules {
    pub selection_mode: SelectionMode,
}

impl CountingRules {
    pub const DEFAULT_RULES: CountingRules = CountingRules {
        selection_mode: SelectionMode::ApprovalsFirst,
    };
}

impl Default for CountingRules {
    fn default() -> Self {
        CountingRules::DEFAULT_RULES
    }
}
