use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core election data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    pub name: String,
    pub description: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
}

impl ElectionCore {
    /// Is this election currently accepting votes?
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now < self.end_time
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn span(start_offset: i64, end_offset: i64) -> ElectionCore {
        let now = Utc::now();
        ElectionCore {
            name: "2028 National Survey".to_string(),
            description: "Unofficial national survey".to_string(),
            start_time: now + Duration::hours(start_offset),
            end_time: now + Duration::hours(end_offset),
        }
    }

    #[test]
    fn active_window_is_half_open() {
        let now = Utc::now();
        assert!(span(-1, 1).is_active(now));
        assert!(!span(1, 2).is_active(now));
        assert!(!span(-2, -1).is_active(now));
        // Exactly at the end is closed.
        let election = span(-1, 0);
        assert!(!election.is_active(election.end_time));
    }
}
