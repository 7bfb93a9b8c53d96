use chrono::Utc;
use mongodb::{bson::doc, options::ReplaceOptions};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::session::SessionToken,
    db::{Candidate, NewRating, Rating, RatingCore},
    mongodb::{Coll, Id},
};

use super::common::{candidate_by_id, parse_id};

pub fn routes() -> Vec<Route> {
    routes![rate, summary]
}

/// Rate a candidate from 1 to 5 stars. Re-rating replaces the previous
/// rating rather than adding another.
#[post("/api/ratings", data = "<request>", format = "json")]
async fn rate(
    token: SessionToken,
    request: Json<RateRequest>,
    candidates: Coll<Candidate>,
    ratings: Coll<NewRating>,
) -> Result<Status> {
    let rating = request.0.into_core(token.uid)?;
    candidate_by_id(rating.candidate_id, &candidates).await?;

    ratings
        .replace_one(
            doc! { "candidate_id": rating.candidate_id, "voter_uid": &rating.voter_uid },
            &rating,
            ReplaceOptions::builder().upsert(true).build(),
        )
        .await?;

    Ok(Status::Ok)
}

/// Average rating for a candidate.
#[get("/api/candidates/<candidate_id>/rating")]
async fn summary(
    _token: SessionToken,
    candidate_id: Id,
    candidates: Coll<Candidate>,
    ratings: Coll<Rating>,
) -> Result<Json<RatingSummary>> {
    candidate_by_id(candidate_id, &candidates).await?;

    let ratings: Vec<Rating> = ratings
        .find(doc! { "candidate_id": candidate_id }, None)
        .await?
        .try_collect()
        .await?;

    let count = ratings.len() as u64;
    let average = if count == 0 {
        0.0
    } else {
        ratings.iter().map(|r| r.stars as f64).sum::<f64>() / count as f64
    };

    Ok(Json(RatingSummary {
        candidate_id: candidate_id.to_string(),
        average,
        count,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateRequest {
    candidate_id: String,
    stars: u8,
}

impl RateRequest {
    fn into_core(self, voter_uid: String) -> Result<RatingCore> {
        if !(1..=5).contains(&self.stars) {
            return Err(Error::Status(
                Status::BadRequest,
                format!("Stars must be between 1 and 5, got {}", self.stars),
            ));
        }
        Ok(RatingCore {
            candidate_id: parse_id(&self.candidate_id)?,
            voter_uid,
            stars: self.stars,
            rated_at: Utc::now(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub candidate_id: String,
    pub average: f64,
    pub count: u64,
}
