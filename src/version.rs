/// Release version. Builds can stamp their own through `SERVICEWATCH_VERSION`.
pub const VERSION: &str = match option_env!("SERVICEWATCH_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

/// `User-Agent` sent with service checks and webhook deliveries.
pub fn user_agent() -> String {
    format!("servicewatch/{VERSION}")
}
