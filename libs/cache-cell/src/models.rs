#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, serde::Serialize)]
pub struct CacheHealth {
    pub reachable: bool,
    pub detail: String,
}
