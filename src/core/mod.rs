pub mod authorization_request;
pub mod claims;
pub mod client_auth;
pub mod error;
pub mod jose;
pub mod object;
pub mod util;
