use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use rocket::{
    futures::TryStreamExt, http::Status, response::status::Custom, serde::json::Json, Route, State,
};
use serde::{Deserialize, Serialize};

use crate::cipher::VoteSealer;
use crate::error::{Error, Result};
use crate::model::{
    api::session::SessionToken,
    db::{Candidate, Election, NewVote, Vote},
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::common::{active_election_by_id, candidate_by_id, election_by_id, parse_id};

pub fn routes() -> Vec<Route> {
    routes![cast, mine, results]
}

/// Cast a vote. The candidate identifier is sealed before it is stored, so
/// the database never holds it in the clear; the unique index on
/// `(election_id, voter_uid)` enforces one vote per voter per election.
#[post("/api/votes", data = "<request>", format = "json")]
async fn cast(
    token: SessionToken,
    request: Json<CastVoteRequest>,
    sealer: &State<VoteSealer>,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<NewVote>,
) -> Result<Custom<Json<VoteResponse>>> {
    let election_id = parse_id(&request.election_id)?;
    let candidate_id = parse_id(&request.candidate_id)?;

    // The election must exist and be accepting votes right now.
    active_election_by_id(election_id, &elections).await?;

    // The candidate must exist and actually run in this election.
    let candidate = candidate_by_id(candidate_id, &candidates).await?;
    if candidate.election_id != election_id {
        return Err(Error::Status(
            Status::BadRequest,
            format!("Candidate {candidate_id} does not run in election {election_id}"),
        ));
    }

    let vote = NewVote {
        election_id,
        voter_uid: token.uid,
        candidate_sealed: sealer.seal(&candidate_id.to_string())?,
        cast_at: Utc::now(),
    };

    if let Err(e) = votes.insert_one(&vote, None).await {
        if is_duplicate_key_error(&e) {
            return Err(Error::Status(
                Status::Conflict,
                format!("Already voted in election {election_id}"),
            ));
        }
        return Err(e.into());
    }

    Ok(Custom(
        Status::Created,
        Json(VoteResponse {
            election_id: election_id.to_string(),
            candidate_id: candidate_id.to_string(),
            cast_at: vote.cast_at,
        }),
    ))
}

/// The caller's own vote in the given election, opened back to the clear
/// candidate identifier.
#[get("/api/votes/mine/<election_id>")]
async fn mine(
    token: SessionToken,
    election_id: Id,
    sealer: &State<VoteSealer>,
    votes: Coll<Vote>,
) -> Result<Json<VoteResponse>> {
    let vote = votes
        .find_one(
            doc! { "election_id": election_id, "voter_uid": &token.uid },
            None,
        )
        .await?
        .ok_or_else(|| Error::not_found(format!("Vote in election {election_id}")))?;

    let candidate_id = sealer.open(&vote.candidate_sealed)?;

    Ok(Json(VoteResponse {
        election_id: election_id.to_string(),
        candidate_id,
        cast_at: vote.cast_at,
    }))
}

/// Tally the votes of an election. Every stored value is opened under the
/// process key; a value that fails authentication is logged and skipped,
/// never counted and never written back.
#[get("/api/elections/<election_id>/results")]
async fn results(
    _token: SessionToken,
    election_id: Id,
    sealer: &State<VoteSealer>,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
) -> Result<Json<ElectionResults>> {
    election_by_id(election_id, &elections).await?;

    let votes: Vec<Vote> = votes
        .find(doc! { "election_id": election_id }, None)
        .await?
        .try_collect()
        .await?;
    let (tally, rejected) = tally_sealed(
        sealer,
        votes.iter().map(|v| (v.id, v.candidate_sealed.as_str())),
    );

    // Attach candidate names; a tally for an unknown candidate keeps its
    // raw identifier.
    let names: HashMap<String, String> = candidates
        .find(doc! { "election_id": election_id }, None)
        .await?
        .try_collect::<Vec<Candidate>>()
        .await?
        .into_iter()
        .map(|c| (c.id.to_string(), c.candidate.name))
        .collect();

    let mut tallies: Vec<CandidateTally> = tally
        .into_iter()
        .map(|(candidate_id, vote_count)| CandidateTally {
            name: names.get(&candidate_id).cloned(),
            candidate_id,
            votes: vote_count,
        })
        .collect();
    tallies.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.candidate_id.cmp(&b.candidate_id)));

    let total = tallies.iter().map(|t| t.votes).sum();
    Ok(Json(ElectionResults {
        election_id: election_id.to_string(),
        total,
        rejected,
        tallies,
    }))
}

/// Open every sealed candidate value and count the ones that verify.
///
/// A value that fails authentication is logged and counted as rejected,
/// never tallied; the stored document is left untouched.
fn tally_sealed<'a>(
    sealer: &VoteSealer,
    votes: impl IntoIterator<Item = (Id, &'a str)>,
) -> (HashMap<String, u64>, u64) {
    let mut tally: HashMap<String, u64> = HashMap::new();
    let mut rejected = 0u64;
    for (vote_id, sealed) in votes {
        match sealer.open(sealed) {
            Ok(candidate_id) => *tally.entry(candidate_id).or_default() += 1,
            Err(e) => {
                warn!("Discarding unverifiable vote {vote_id}: {e}");
                rejected += 1;
            }
        }
    }
    (tally, rejected)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CastVoteRequest {
    election_id: String,
    candidate_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub election_id: String,
    pub candidate_id: String,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResults {
    pub election_id: String,
    /// Votes counted.
    pub total: u64,
    /// Stored votes that failed authentication and were discarded.
    pub rejected: u64,
    pub tallies: Vec<CandidateTally>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTally {
    pub candidate_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub votes: u64,
}

#[cfg(test)]
mod tests {
    use data_encoding::BASE64;

    use crate::cipher::KEY_LEN;

    use super::*;

    fn sealer(key_byte: u8) -> VoteSealer {
        VoteSealer::from_base64_key(&BASE64.encode(&[key_byte; KEY_LEN])).unwrap()
    }

    fn vote_id(suffix: u8) -> Id {
        format!("641f2b7d8e1c4a00123456{suffix:02x}").parse().unwrap()
    }

    #[test]
    fn tally_counts_verifiable_votes() {
        let sealer = sealer(7);
        let sealed = [
            (vote_id(1), sealer.seal("candidate-a").unwrap()),
            (vote_id(2), sealer.seal("candidate-a").unwrap()),
            (vote_id(3), sealer.seal("candidate-b").unwrap()),
        ];

        let (tally, rejected) =
            tally_sealed(&sealer, sealed.iter().map(|(id, s)| (*id, s.as_str())));

        assert_eq!(0, rejected);
        assert_eq!(Some(&2), tally.get("candidate-a"));
        assert_eq!(Some(&1), tally.get("candidate-b"));
    }

    #[test]
    fn unverifiable_vote_is_rejected_never_counted() {
        let sealer = sealer(7);
        // Sealed under a different key, so it fails authentication here.
        let foreign = self::sealer(8).seal("candidate-a").unwrap();
        let sealed = [
            (vote_id(1), sealer.seal("candidate-a").unwrap()),
            (vote_id(2), foreign),
            (vote_id(3), "not a sealed value".to_string()),
        ];

        let (tally, rejected) =
            tally_sealed(&sealer, sealed.iter().map(|(id, s)| (*id, s.as_str())));

        assert_eq!(2, rejected);
        assert_eq!(Some(&1), tally.get("candidate-a"));
        assert_eq!(1, tally.values().sum::<u64>());
    }
}
