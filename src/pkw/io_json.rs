// Primitives for reading and writing the JSON files: protocols, submissions and wards.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use protocol_count::builder::Submission;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pkw::*;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BallotResultJs {
    #[serde(rename = "votersEntitledCount")]
    pub voters_entitled_count: u64,
    #[serde(rename = "ballotsGivenCount")]
    pub ballots_given_count: u64,
    #[serde(rename = "votesCastCount")]
    pub votes_cast_count: u64,
    #[serde(rename = "votesValidCount")]
    pub votes_valid_count: u64,
    #[serde(rename = "votesCountPerOption")]
    pub votes_count_per_option: Vec<u64>,
}

impl From<&BallotResult> for BallotResultJs {
    fn from(r: &BallotResult) -> Self {
        BallotResultJs {
            voters_entitled_count: r.voters_entitled_count,
            ballots_given_count: r.ballots_given_count,
            votes_cast_count: r.votes_cast_count,
            votes_valid_count: r.votes_valid_count,
            votes_count_per_option: r.votes_count_per_option.clone(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolRecord {
    pub id: Uuid,
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
    #[serde(rename = "votingDate")]
    pub voting_date: NaiveDate,
    #[serde(rename = "ballotNo")]
    pub ballot_no: u32,
    #[serde(rename = "communityCode")]
    pub community_code: String,
    #[serde(rename = "wardNo")]
    pub ward_no: u32,
    #[serde(rename = "ballotResult")]
    pub ballot_result: BallotResultJs,
    pub comment: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub approvals: BTreeSet<String>,
    #[serde(default)]
    pub deprecations: BTreeSet<String>,
    #[serde(rename = "imageIds", default)]
    pub image_ids: BTreeSet<Uuid>,
    #[serde(rename = "creationTime")]
    pub creation_time: DateTime<Utc>,
    #[serde(rename = "updateTime")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revision: u64,
}

impl From<&Protocol> for ProtocolRecord {
    fn from(p: &Protocol) -> Self {
        ProtocolRecord {
            id: p.id.0,
            client_id: p.client_id.clone(),
            voting_date: p.ballot.voting_date,
            ballot_no: p.ballot.no,
            community_code: p.ward.community_code.clone(),
            ward_no: p.ward.no,
            ballot_result: BallotResultJs::from(&BallotResult::from(p)),
            comment: p.comment.clone(),
            verified: p.verified,
            approvals: p.approvals.clone(),
            deprecations: p.deprecations.clone(),
            image_ids: p.image_ids.clone(),
            creation_time: p.creation_time,
            update_time: Some(p.update_time),
            revision: p.revision,
        }
    }
}

impl From<ProtocolRecord> for Protocol {
    fn from(r: ProtocolRecord) -> Self {
        Protocol {
            id: ProtocolId(r.id),
            client_id: r.client_id,
            ballot: Ballot {
                voting_date: r.voting_date,
                no: r.ballot_no,
            },
            ward: WardId {
                community_code: r.community_code,
                no: r.ward_no,
            },
            voters_entitled_count: r.ballot_result.voters_entitled_count,
            ballots_given_count: r.ballot_result.ballots_given_count,
            votes_cast_count: r.ballot_result.votes_cast_count,
            votes_valid_count: r.ballot_result.votes_valid_count,
            votes_count_per_option: r.ballot_result.votes_count_per_option,
            comment: r.comment,
            verified: r.verified,
            approvals: r.approvals,
            deprecations: r.deprecations,
            image_ids: r.image_ids,
            creation_time: r.creation_time,
            // A protocol that was never updated carries its creation time.
            update_time: r.update_time.unwrap_or(r.creation_time),
            revision: r.revision,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
    #[serde(rename = "votingDate")]
    pub voting_date: NaiveDate,
    #[serde(rename = "ballotNo")]
    pub ballot_no: u32,
    #[serde(rename = "communityCode")]
    pub community_code: String,
    #[serde(rename = "wardNo")]
    pub ward_no: u32,
    #[serde(rename = "ballotResult")]
    pub ballot_result: BallotResultJs,
    pub comment: Option<String>,
}

impl From<SubmissionRecord> for Submission {
    fn from(r: SubmissionRecord) -> Self {
        let ballot = Ballot {
            voting_date: r.voting_date,
            no: r.ballot_no,
        };
        let br = &r.ballot_result;
        let mut s = Submission::new(ballot, WardId::new(&r.community_code, r.ward_no))
            .counts(
                br.voters_entitled_count,
                br.ballots_given_count,
                br.votes_cast_count,
                br.votes_valid_count,
            )
            .options(&br.votes_count_per_option);
        if let Some(c) = &r.client_id {
            s = s.client_id(c);
        }
        if let Some(c) = &r.comment {
            s = s.comment(c);
        }
        s
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct WardRecord {
    #[serde(rename = "communityCode")]
    pub community_code: String,
    pub no: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl WardRecord {
    fn to_ward(&self, lineno: usize) -> PkwResult<Ward> {
        let location = match (self.latitude, self.longitude) {
            (None, None) => None,
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon).context(CountingSnafu {})?),
            _ => {
                return WardWrongValueSnafu {
                    lineno,
                    content: format!("incomplete location for {}", self.community_code),
                }
                .fail()
            }
        };
        Ok(Ward {
            community_code: self.community_code.clone(),
            no: self.no,
            location,
        })
    }
}

impl From<&Ward> for WardRecord {
    fn from(w: &Ward) -> Self {
        WardRecord {
            community_code: w.community_code.clone(),
            no: w.no,
            latitude: w.location.map(|l| l.latitude),
            longitude: w.location.map(|l| l.longitude),
        }
    }
}

/// Reads the protocol store. A missing file is an empty store.
pub fn read_protocols(path: &str) -> PkwResult<Vec<Protocol>> {
    if !Path::new(path).exists() {
        warn!(
            "read_protocols: {} does not exist, starting from an empty store",
            path
        );
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let records: Vec<ProtocolRecord> =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_protocols: {} protocols in {}", records.len(), path);
    Ok(records.into_iter().map(Protocol::from).collect())
}

pub fn write_protocols(path: &str, protocols: &[Protocol]) -> PkwResult<()> {
    let records: Vec<ProtocolRecord> = protocols.iter().map(ProtocolRecord::from).collect();
    let js = serde_json::to_string_pretty(&records).context(ParsingJsonSnafu { path })?;
    // Readers never see a half-written store.
    let tmp_path = format!("{}.tmp", path);
    fs::write(&tmp_path, js).context(WritingFileSnafu { path: tmp_path.as_str() })?;
    fs::rename(&tmp_path, path).context(WritingFileSnafu { path })?;
    debug!("write_protocols: {} protocols in {}", records.len(), path);
    Ok(())
}

pub fn read_submission(path: &str) -> PkwResult<Submission> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let record: SubmissionRecord =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_submission: {:?}", record);
    Ok(Submission::from(record))
}

pub fn read_json_wards(path: &str) -> PkwResult<Vec<Ward>> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let records: Vec<WardRecord> =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    let mut res: Vec<Ward> = Vec::new();
    for (idx, r) in records.iter().enumerate() {
        res.push(r.to_ward(idx + 1)?);
    }
    Ok(res)
}
