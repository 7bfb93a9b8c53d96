use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core comment data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentCore {
    pub candidate_id: Id,
    pub voter_uid: String,
    pub body: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A comment without an ID.
pub type NewComment = CommentCore;

/// A comment from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub comment: CommentCore,
}

impl Deref for Comment {
    type Target = CommentCore;

    fn deref(&self) -> &Self::Target {
        &self.comment
    }
}

impl DerefMut for Comment {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.comment
    }
}
