//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in a DB-friendly way, e.g. IDs
//! and datetimes are serialised in MongoDB's own format. Each document type
//! comes as a `XCore` (the insertable fields) plus an `X` wrapper carrying
//! the database-assigned `_id`.

pub mod candidate;
pub mod comment;
pub mod election;
pub mod rating;
pub mod user;
pub mod vote;

pub use candidate::{Candidate, CandidateCore, NewCandidate};
pub use comment::{Comment, CommentCore, NewComment};
pub use election::{Election, ElectionCore, NewElection};
pub use rating::{NewRating, Rating, RatingCore};
pub use user::{NewUser, User, UserCore};
pub use vote::{NewVote, Vote, VoteCore};
