use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, http::Status, response::status::Custom, serde::json::Json, Route};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::session::{AdminSession, SessionToken},
    db::{Candidate, CandidateCore, Comment, Election, NewCandidate, Rating},
    mongodb::{Coll, Id},
};

use super::common::{candidate_by_id, election_by_id, parse_id};

pub fn routes() -> Vec<Route> {
    routes![for_election, detail, create, update, delete]
}

#[get("/api/elections/<election_id>/candidates")]
async fn for_election(
    _token: SessionToken,
    election_id: Id,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<CandidateResponse>>> {
    let candidates: Vec<Candidate> = candidates
        .find(doc! { "election_id": election_id }, None)
        .await?
        .try_collect()
        .await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

#[get("/api/candidates/<candidate_id>")]
async fn detail(
    _token: SessionToken,
    candidate_id: Id,
    candidates: Coll<Candidate>,
) -> Result<Json<CandidateResponse>> {
    let candidate = candidate_by_id(candidate_id, &candidates).await?;
    Ok(Json(candidate.into()))
}

#[post("/api/candidates", data = "<request>", format = "json")]
async fn create(
    _session: AdminSession,
    request: Json<CandidateRequest>,
    candidates: Coll<NewCandidate>,
    elections: Coll<Election>,
) -> Result<Custom<Json<CandidateResponse>>> {
    let core = request.0.into_core()?;
    // The election must exist before anyone can run in it.
    election_by_id(core.election_id, &elections).await?;

    let new_id: Id = candidates
        .insert_one(&core, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Safe because the ID comes directly from the database.
        .into();
    Ok(Custom(
        Status::Created,
        Json(Candidate { id: new_id, candidate: core }.into()),
    ))
}

#[put("/api/candidates/<candidate_id>", data = "<request>", format = "json")]
async fn update(
    _session: AdminSession,
    candidate_id: Id,
    request: Json<CandidateRequest>,
    candidates: Coll<Candidate>,
) -> Result<Json<CandidateResponse>> {
    let core = request.0.into_core()?;
    let replacement = Candidate { id: candidate_id, candidate: core };
    let result = candidates
        .replace_one(candidate_id.as_doc(), &replacement, None)
        .await?;
    if result.matched_count == 0 {
        return Err(Error::not_found(format!("Candidate {candidate_id}")));
    }
    Ok(Json(replacement.into()))
}

#[delete("/api/candidates/<candidate_id>")]
async fn delete(
    _session: AdminSession,
    candidate_id: Id,
    candidates: Coll<Candidate>,
    ratings: Coll<Rating>,
    comments: Coll<Comment>,
) -> Result<Status> {
    let result = candidates.delete_one(candidate_id.as_doc(), None).await?;
    if result.deleted_count == 0 {
        return Err(Error::not_found(format!("Candidate {candidate_id}")));
    }
    ratings
        .delete_many(doc! { "candidate_id": candidate_id }, None)
        .await?;
    comments
        .delete_many(doc! { "candidate_id": candidate_id }, None)
        .await?;
    Ok(Status::NoContent)
}

/// A candidate as accepted from the back-office UI.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateRequest {
    election_id: String,
    name: String,
    party: String,
    bio: String,
    #[serde(default)]
    photo_url: Option<String>,
}

impl CandidateRequest {
    fn into_core(self) -> Result<CandidateCore> {
        if self.name.trim().is_empty() {
            return Err(Error::Status(
                Status::BadRequest,
                "Candidate name must not be empty".to_string(),
            ));
        }
        Ok(CandidateCore {
            election_id: parse_id(&self.election_id)?,
            name: self.name,
            party: self.party,
            bio: self.bio,
            photo_url: self.photo_url,
        })
    }
}

/// A candidate as returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResponse {
    pub id: String,
    pub election_id: String,
    pub name: String,
    pub party: String,
    pub bio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl From<Candidate> for CandidateResponse {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.to_string(),
            election_id: candidate.candidate.election_id.to_string(),
            name: candidate.candidate.name,
            party: candidate.candidate.party,
            bio: candidate.candidate.bio,
            photo_url: candidate.candidate.photo_url,
        }
    }
}
