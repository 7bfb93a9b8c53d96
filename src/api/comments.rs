use chrono::{DateTime, Utc};
use mongodb::{bson::doc, options::FindOptions};
use rocket::{
    futures::TryStreamExt, http::Status, response::status::Custom, serde::json::Json, Route,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::session::SessionToken,
    db::{Candidate, Comment, CommentCore, NewComment},
    mongodb::{Coll, Id},
};

use super::common::{candidate_by_id, parse_id};

/// Upper bound on comment length, matching the UI's limit.
const MAX_BODY_LEN: usize = 2000;

/// How many comments a single page returns.
const PAGE_SIZE: i64 = 100;

pub fn routes() -> Vec<Route> {
    routes![post_comment, for_candidate]
}

#[post("/api/comments", data = "<request>", format = "json")]
async fn post_comment(
    token: SessionToken,
    request: Json<CommentRequest>,
    candidates: Coll<Candidate>,
    comments: Coll<NewComment>,
) -> Result<Custom<Json<CommentResponse>>> {
    let comment = request.0.into_core(token.uid)?;
    candidate_by_id(comment.candidate_id, &candidates).await?;

    let new_id: Id = comments
        .insert_one(&comment, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Safe because the ID comes directly from the database.
        .into();

    Ok(Custom(
        Status::Created,
        Json(Comment { id: new_id, comment }.into()),
    ))
}

/// Latest comments on a candidate, newest first.
#[get("/api/candidates/<candidate_id>/comments")]
async fn for_candidate(
    _token: SessionToken,
    candidate_id: Id,
    candidates: Coll<Candidate>,
    comments: Coll<Comment>,
) -> Result<Json<Vec<CommentResponse>>> {
    candidate_by_id(candidate_id, &candidates).await?;

    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .limit(PAGE_SIZE)
        .build();
    let comments: Vec<Comment> = comments
        .find(doc! { "candidate_id": candidate_id }, options)
        .await?
        .try_collect()
        .await?;

    Ok(Json(comments.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRequest {
    candidate_id: String,
    body: String,
}

impl CommentRequest {
    fn into_core(self, voter_uid: String) -> Result<CommentCore> {
        let body = self.body.trim();
        if body.is_empty() {
            return Err(Error::Status(
                Status::BadRequest,
                "Comment must not be empty".to_string(),
            ));
        }
        if body.chars().count() > MAX_BODY_LEN {
            return Err(Error::Status(
                Status::BadRequest,
                format!("Comment must be at most {MAX_BODY_LEN} characters"),
            ));
        }
        Ok(CommentCore {
            candidate_id: parse_id(&self.candidate_id)?,
            voter_uid,
            body: body.to_string(),
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: String,
    pub candidate_id: String,
    pub author_uid: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id.to_string(),
            candidate_id: comment.comment.candidate_id.to_string(),
            author_uid: comment.comment.voter_uid,
            body: comment.comment.body,
            created_at: comment.comment.created_at,
        }
    }
}
