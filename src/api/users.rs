use mongodb::{bson::doc, options::ReplaceOptions};
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::session::{SessionToken, SESSION_COOKIE},
    db::{Comment, NewUser, Rating, User, UserCore},
    mongodb::Coll,
};

pub fn routes() -> Vec<Route> {
    routes![me, upsert_me, delete_me]
}

/// The caller's own profile. 404 until they have saved one.
#[get("/api/me")]
async fn me(token: SessionToken, users: Coll<User>) -> Result<Json<UserResponse>> {
    let user = users
        .find_one(doc! { "uid": &token.uid }, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Profile for {}", token.uid)))?;
    Ok(Json(user.into()))
}

/// Create or update the caller's profile. The subject identifier always
/// comes from the verified session, never from the request body.
#[put("/api/me", data = "<request>", format = "json")]
async fn upsert_me(
    token: SessionToken,
    request: Json<ProfileRequest>,
    users: Coll<NewUser>,
) -> Result<Json<UserResponse>> {
    let profile = request.0.into_core(token.uid)?;
    users
        .replace_one(
            doc! { "uid": &profile.uid },
            &profile,
            ReplaceOptions::builder().upsert(true).build(),
        )
        .await?;

    Ok(Json(profile.into()))
}

/// Delete the caller's account: profile and authored content go, and the
/// session cookie is revoked. Cast votes are sealed and kept for tallies.
#[delete("/api/me")]
async fn delete_me(
    token: SessionToken,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    ratings: Coll<Rating>,
    comments: Coll<Comment>,
) -> Result<Status> {
    users.delete_one(doc! { "uid": &token.uid }, None).await?;
    ratings
        .delete_many(doc! { "voter_uid": &token.uid }, None)
        .await?;
    comments
        .delete_many(doc! { "voter_uid": &token.uid }, None)
        .await?;

    cookies.remove(Cookie::named(SESSION_COOKIE));
    Ok(Status::NoContent)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRequest {
    name: String,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

impl ProfileRequest {
    /// The subject identifier is a parameter, not a request field: it can
    /// only ever come from the verified session.
    fn into_core(self, uid: String) -> Result<UserCore> {
        if self.name.trim().is_empty() {
            return Err(Error::Status(
                Status::BadRequest,
                "Name must not be empty".to_string(),
            ));
        }
        Ok(UserCore {
            uid,
            name: self.name,
            bio: self.bio,
            avatar_url: self.avatar_url,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub uid: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        user.user.into()
    }
}

impl From<NewUser> for UserResponse {
    fn from(user: NewUser) -> Self {
        Self {
            uid: user.uid,
            name: user.name,
            bio: user.bio,
            avatar_url: user.avatar_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_comes_from_the_session() {
        let request = ProfileRequest {
            name: "Maria Santos".to_string(),
            bio: None,
            avatar_url: None,
        };
        let profile = request.into_core("uid-1a2b3c".to_string()).unwrap();
        assert_eq!("uid-1a2b3c", profile.uid);
    }

    #[test]
    fn rejects_blank_names() {
        let request = ProfileRequest {
            name: "   ".to_string(),
            bio: None,
            avatar_url: None,
        };
        assert!(request.into_core("uid-1a2b3c".to_string()).is_err());
    }
}
