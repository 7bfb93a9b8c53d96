use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, Document};
use rocket::{futures::TryStreamExt, http::Status, response::status::Custom, serde::json::Json, Route};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::session::{AdminSession, SessionToken},
    db::{Candidate, Comment, Election, ElectionCore, NewElection, Rating, Vote},
    mongodb::{Coll, Id},
};

use super::common::election_by_id;

pub fn routes() -> Vec<Route> {
    routes![list, detail, create, update, delete]
}

#[get("/api/elections")]
async fn list(_token: SessionToken, elections: Coll<Election>) -> Result<Json<Vec<ElectionResponse>>> {
    let elections: Vec<Election> = elections.find(None, None).await?.try_collect().await?;
    Ok(Json(elections.into_iter().map(Into::into).collect()))
}

#[get("/api/elections/<election_id>")]
async fn detail(
    _token: SessionToken,
    election_id: Id,
    elections: Coll<Election>,
) -> Result<Json<ElectionResponse>> {
    let election = election_by_id(election_id, &elections).await?;
    Ok(Json(election.into()))
}

#[post("/api/elections", data = "<request>", format = "json")]
async fn create(
    _session: AdminSession,
    request: Json<ElectionRequest>,
    elections: Coll<NewElection>,
) -> Result<Custom<Json<ElectionResponse>>> {
    let core = request.0.into_core()?;
    let new_id: Id = elections
        .insert_one(&core, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Safe because the ID comes directly from the database.
        .into();
    Ok(Custom(
        Status::Created,
        Json(Election { id: new_id, election: core }.into()),
    ))
}

#[put("/api/elections/<election_id>", data = "<request>", format = "json")]
async fn update(
    _session: AdminSession,
    election_id: Id,
    request: Json<ElectionRequest>,
    elections: Coll<Election>,
) -> Result<Json<ElectionResponse>> {
    let core = request.0.into_core()?;
    let result = elections
        .replace_one(election_id.as_doc(), &Election { id: election_id, election: core.clone() }, None)
        .await?;
    if result.matched_count == 0 {
        return Err(Error::not_found(format!("Election {election_id}")));
    }
    Ok(Json(Election { id: election_id, election: core }.into()))
}

#[delete("/api/elections/<election_id>")]
async fn delete(
    _session: AdminSession,
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    ratings: Coll<Rating>,
    comments: Coll<Comment>,
) -> Result<Status> {
    let result = elections.delete_one(election_id.as_doc(), None).await?;
    if result.deleted_count == 0 {
        return Err(Error::not_found(format!("Election {election_id}")));
    }

    // Candidates, votes, and the candidates' ratings and comments make no
    // sense without their election. Collect the candidate IDs before the
    // candidates themselves go.
    let candidate_ids: Vec<Id> = candidates
        .find(doc! { "election_id": election_id }, None)
        .await?
        .try_collect::<Vec<Candidate>>()
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    if !candidate_ids.is_empty() {
        ratings
            .delete_many(by_candidates_filter(&candidate_ids), None)
            .await?;
        comments
            .delete_many(by_candidates_filter(&candidate_ids), None)
            .await?;
    }

    candidates
        .delete_many(doc! { "election_id": election_id }, None)
        .await?;
    votes
        .delete_many(doc! { "election_id": election_id }, None)
        .await?;
    Ok(Status::NoContent)
}

/// Filter matching every document keyed to one of the given candidates.
fn by_candidates_filter(candidate_ids: &[Id]) -> Document {
    let ids: Vec<Bson> = candidate_ids.iter().map(|id| Bson::from(*id)).collect();
    doc! { "candidate_id": { "$in": ids } }
}

/// An election as accepted from the back-office UI.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElectionRequest {
    name: String,
    description: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl ElectionRequest {
    fn into_core(self) -> Result<ElectionCore> {
        if self.name.trim().is_empty() {
            return Err(Error::Status(
                Status::BadRequest,
                "Election name must not be empty".to_string(),
            ));
        }
        if self.end_time <= self.start_time {
            return Err(Error::Status(
                Status::BadRequest,
                "Election must end after it starts".to_string(),
            ));
        }
        Ok(ElectionCore {
            name: self.name,
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
        })
    }
}

/// An election as returned to clients: IDs as hex strings, datetimes as
/// RFC 3339 rather than BSON.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_active: bool,
}

impl From<Election> for ElectionResponse {
    fn from(election: Election) -> Self {
        let is_active = election.is_active(Utc::now());
        Self {
            id: election.id.to_string(),
            name: election.election.name,
            description: election.election.description,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            is_active,
        }
    }
}
