use chrono::Utc;
use rocket::http::Status;

use crate::error::{Error, Result};
use crate::model::{
    db::{Candidate, Election},
    mongodb::{Coll, Id},
};

/// Parse a client-supplied document ID, failing with a 400 rather than a
/// serde error deep inside a request body.
pub fn parse_id(value: &str) -> Result<Id> {
    value.parse::<Id>().map_err(|_| {
        Error::Status(
            Status::BadRequest,
            format!("'{value}' is not a valid ID"),
        )
    })
}

/// Look up an election by ID.
pub async fn election_by_id(election_id: Id, elections: &Coll<Election>) -> Result<Election> {
    elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))
}

/// Look up an election by ID, requiring that it is currently accepting votes.
pub async fn active_election_by_id(election_id: Id, elections: &Coll<Election>) -> Result<Election> {
    let election = election_by_id(election_id, elections).await?;
    if !election.is_active(Utc::now()) {
        return Err(Error::Status(
            Status::BadRequest,
            format!("Election {election_id} is not currently active"),
        ));
    }
    Ok(election)
}

/// Look up a candidate by ID.
pub async fn candidate_by_id(candidate_id: Id, candidates: &Coll<Candidate>) -> Result<Candidate> {
    candidates
        .find_one(candidate_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))
}
