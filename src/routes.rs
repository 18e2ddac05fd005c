// routes.rs - (method, path, access, handler) bindings and their composition

use axum::{
    http::Method,
    middleware::from_fn_with_state,
    routing::{get, MethodRouter},
    Router,
};
use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::handlers::{self, albums, photos, users};
use crate::middleware::{dispatch, BearerAuth};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Requires a verified bearer token.
    Protected,
}

/// One method+path pair bound to its handler.
pub struct Binding {
    pub method: Method,
    pub path: &'static str,
    pub access: Access,
    route: MethodRouter<AppState>,
}

impl Binding {
    pub fn new(method: Method, path: &'static str, access: Access, route: MethodRouter<AppState>) -> Self {
        Self {
            method,
            path,
            access,
            route,
        }
    }
}

/// Every route the service exposes. Mutating operations are protected.
pub fn bindings() -> Vec<Binding> {
    let mut all = vec![Binding::new(Method::GET, "/status", Access::Public, get(handlers::status))];
    all.extend(user_bindings());
    all.extend(album_bindings());
    all.extend(photo_bindings());
    all
}

fn user_bindings() -> Vec<Binding> {
    use axum::routing::{delete, post, put};
    use Access::*;

    vec![
        Binding::new(Method::POST, "/user", Protected, post(users::create)),
        Binding::new(Method::POST, "/user/", Protected, post(users::create)),
        Binding::new(Method::GET, "/user/:id", Public, get(users::show)),
        Binding::new(Method::PUT, "/user/:id", Protected, put(users::update)),
        Binding::new(Method::DELETE, "/user/:id", Protected, delete(users::remove)),
        Binding::new(Method::GET, "/users", Public, get(users::list)),
    ]
}

fn album_bindings() -> Vec<Binding> {
    use axum::routing::{delete, post, put};
    use Access::*;

    vec![
        Binding::new(Method::POST, "/album", Protected, post(albums::create)),
        Binding::new(Method::POST, "/album/", Protected, post(albums::create)),
        Binding::new(Method::GET, "/album/:id", Public, get(albums::show)),
        Binding::new(Method::PUT, "/album/:id", Protected, put(albums::update)),
        Binding::new(Method::DELETE, "/album/:id", Protected, delete(albums::remove)),
        Binding::new(Method::GET, "/albums", Public, get(albums::list)),
    ]
}

fn photo_bindings() -> Vec<Binding> {
    use axum::routing::{delete, post, put};
    use Access::*;

    vec![
        Binding::new(Method::GET, "/album/:id/photos", Public, get(photos::list)),
        Binding::new(Method::GET, "/album/:id/photo/:photo_id", Public, get(photos::show)),
        Binding::new(Method::POST, "/album/:id/photo", Protected, post(photos::create)),
        Binding::new(Method::PUT, "/album/:id/photo/:photo_id", Protected, put(photos::update)),
        Binding::new(Method::DELETE, "/album/:id/photo/:photo_id", Protected, delete(photos::remove)),
    ]
}

/// Build the router: bindings sharing a path are merged into one method
/// router, protected ones behind the bearer guard. Unknown paths and
/// unbound methods on known paths both answer 404.
pub fn compose(bindings: Vec<Binding>, verifier: TokenVerifier) -> Router<AppState> {
    let guard = from_fn_with_state(Arc::new(BearerAuth::new(verifier)), dispatch::<BearerAuth>);

    let mut by_path: Vec<(&'static str, Vec<MethodRouter<AppState>>)> = Vec::new();
    for binding in bindings {
        tracing::debug!("Binding {} {} ({:?})", binding.method, binding.path, binding.access);
        let route = match binding.access {
            Access::Public => binding.route,
            Access::Protected => binding.route.route_layer(guard.clone()),
        };
        match by_path.iter_mut().find(|(path, _)| *path == binding.path) {
            Some((_, routes)) => routes.push(route),
            None => by_path.push((binding.path, vec![route])),
        }
    }

    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, routes)| {
            match routes.into_iter().reduce(|merged, route| merged.merge(route)) {
                Some(route) => router.route(path, route.fallback(handlers::not_found)),
                None => router,
            }
        })
        .fallback(handlers::not_found)
}
