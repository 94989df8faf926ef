pub use auth::{CredentialHandle, RefreshOutcome, RefreshState, TokenRefresher};
pub use credentials::{CredentialSet, CredentialStore};

pub mod api;
pub mod auth;
pub mod credentials;

pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const API_URL: &str = "https://api.spotify.com/v1";

#[macro_export]
macro_rules! query {
    ($base: literal ? $($param: ident = $value: expr),* $(,)?) => {
        format!("{}?{}",
            $base,
            vec![
                $(format!("{}={}", stringify!($param), $value)),*
            ].join("&")
        )
    };
    ($base: literal) => {
        $base.to_string()
    };
    ($base: expr ; $($param: ident = $value: expr),* $(,)?) => {
        format!("{}?{}",
            $base,
            vec![
                $(format!("{}={}", stringify!($param), $value)),*
            ].join("&")
        )
    };
}
