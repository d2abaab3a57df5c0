//! Encrypted cookie sessions, a pluggable authenticator chain and
//! session-bound CSRF protection for axum services.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub mod crypto {
    pub mod jwe;
    pub mod keystore;
    pub mod password;
    pub mod token;
}

pub mod models {
    pub mod auth;
    pub mod csrf;
    pub mod oauth;
    pub mod session;
}

pub mod repositories {
    pub mod memory;
}

pub mod services {
    pub mod authenticator;
    pub mod csrf;
    pub mod database_auth;
    pub mod oauth;
    pub mod revocation;
    pub mod session;
    pub mod token_auth;
}

pub mod handlers {
    pub mod api;
    pub mod auth;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod csrf;
}

pub mod validation {
    pub mod auth;
}

#[cfg(test)]
mod test_support;
