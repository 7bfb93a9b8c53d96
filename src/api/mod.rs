use rocket::Route;

mod candidates;
mod comments;
mod common;
mod elections;
mod ratings;
mod session;
mod users;
mod votes;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(session::routes());
    routes.extend(elections::routes());
    routes.extend(candidates::routes());
    routes.extend(votes::routes());
    routes.extend(ratings::routes());
    routes.extend(comments::routes());
    routes.extend(users::routes());
    routes.extend(crate::gate::routes());
    routes
}
