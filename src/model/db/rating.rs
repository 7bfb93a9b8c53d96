use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core rating data, as stored in the database. One per voter per candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingCore {
    pub candidate_id: Id,
    pub voter_uid: String,
    /// 1 to 5 inclusive, validated at the API boundary.
    pub stars: u8,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub rated_at: DateTime<Utc>,
}

/// A rating without an ID.
pub type NewRating = RatingCore;

/// A rating from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Rating {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub rating: RatingCore,
}

impl Deref for Rating {
    type Target = RatingCore;

    fn deref(&self) -> &Self::Target {
        &self.rating
    }
}

impl DerefMut for Rating {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.rating
    }
}
