use std::ops::Deref;

use mongodb::{
    bson::doc,
    error::{Error as DbError, ErrorKind, WriteFailure},
    options::IndexOptions,
    Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    candidate::{Candidate, NewCandidate},
    comment::{Comment, NewComment},
    election::{Election, NewElection},
    rating::{NewRating, Rating},
    user::{NewUser, User},
    vote::{NewVote, Vote},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// User collections
const USERS: &str = "users";
impl MongoCollection for User {
    const NAME: &'static str = USERS;
}
impl MongoCollection for NewUser {
    const NAME: &'static str = USERS;
}

// Candidate collections
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}
impl MongoCollection for NewCandidate {
    const NAME: &'static str = CANDIDATES;
}

// Election collections
const ELECTIONS: &str = "elections";
impl MongoCollection for Election {
    const NAME: &'static str = ELECTIONS;
}
impl MongoCollection for NewElection {
    const NAME: &'static str = ELECTIONS;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

// Rating collections
const RATINGS: &str = "ratings";
impl MongoCollection for Rating {
    const NAME: &'static str = RATINGS;
}
impl MongoCollection for NewRating {
    const NAME: &'static str = RATINGS;
}

// Comment collections
const COMMENTS: &str = "comments";
impl MongoCollection for Comment {
    const NAME: &'static str = COMMENTS;
}
impl MongoCollection for NewComment {
    const NAME: &'static str = COMMENTS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // User collection: one profile per auth subject.
    let user_index = IndexModel::builder()
        .keys(doc! {"uid": 1})
        .options(unique.clone())
        .build();
    Coll::<User>::from_db(db).create_index(user_index, None).await?;

    // Vote collection: one vote per voter per election.
    let vote_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "voter_uid": 1})
        .options(unique.clone())
        .build();
    Coll::<Vote>::from_db(db).create_index(vote_index, None).await?;

    // Rating collection: one rating per voter per candidate.
    let rating_index = IndexModel::builder()
        .keys(doc! {"candidate_id": 1, "voter_uid": 1})
        .options(unique.clone())
        .build();
    Coll::<Rating>::from_db(db)
        .create_index(rating_index, None)
        .await?;

    Ok(())
}

/// Was this database error caused by violating a unique index?
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_err)) => write_err.code == 11000,
        _ => false,
    }
}
