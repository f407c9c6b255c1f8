use anyhow::{Result, anyhow};
use reqwest::{
    Client, 
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }
    
    fn get_headers(&self, auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        
        headers.insert("apikey", HeaderValue::from_str(&self.anon_key).unwrap());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        
        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
            );
        }
        
        headers
    }
    
    pub async fn request<T>(&self, method: Method, path: &str, 
                            auth_token: Option<&str>, body: Option<Value>) 
                            -> Result<T> 
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);
        
        let headers = self.get_headers(auth_token);
        
        let mut req = self.client.request(method, &url)
            .headers(headers);
            
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }
        
        let response = req.send().await?;
        
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            
            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }
        
        let data = response.json::<T>().await?;
        Ok(data)
    }
    
    pub async fn get_user_profile(&self, _user_id: &str, auth_token: &str) -> Result<Value> {
        // Use the Supabase Auth API to get user data
        let path = "/auth/v1/user";
        
        self.request::<Value>(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await
    }
    
    pub async fn get_health_profile(&self, user_id: &str, auth_token: &str) -> Result<Value> {
        let path = format!("/rest/v1/health_profiles?patient_id=eq.{}", user_id);
        
        let result: Vec<Value> = self.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;
        
        if result.is_empty() {
            // Return empty profile if none exists
            return Ok(json!({
                "patient_id": user_id,
                "exists": false
            }));
        }
        
        Ok(result[0].clone())
    }

    /// Exchange a username/password for a Supabase Auth access token via the password grant.
    /// `username` is passed as the `email` field - this stack's users are provisioned in
    /// Supabase Auth by email, the same identity `get_user_profile`/`get_health_profile` assume.
    pub async fn sign_in_with_password(&self, username: &str, password: &str) -> Result<Value> {
        let path = "/auth/v1/token?grant_type=password";
        let body = json!({ "email": username, "password": password });

        self.request::<Value>(Method::POST, path, None, Some(body)).await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }

    // Method to get public URL for a storage path
    pub fn get_public_url(&self, storage_path: &str) -> String {
        format!("{}{}", self.base_url, storage_path)
    }

    /// Insert a row into `table`, returning the inserted representation.
    pub async fn insert<T, R>(&self, table: &str, row: &T) -> Result<R>
    where
        T: serde::Serialize,
        R: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}", table);
        let body = serde_json::to_value(row)?;

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let rows: Vec<R> = self
            .request_with_headers(Method::POST, &path, None, Some(body), Some(headers))
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("insert into {} returned no row", table))
    }

    /// Patch rows matching `filter` (a PostgREST query string, e.g. `id=eq.<uuid>`) in `table`.
    pub async fn patch<T, R>(&self, table: &str, filter: &str, patch: &T) -> Result<Vec<R>>
    where
        T: serde::Serialize,
        R: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}?{}", table, filter);
        let body = serde_json::to_value(patch)?;

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(Method::PATCH, &path, None, Some(body), Some(headers))
            .await
    }

    /// Select rows from `table` matching `filter` (may be empty).
    pub async fn select<R>(&self, table: &str, filter: &str) -> Result<Vec<R>>
    where
        R: DeserializeOwned,
    {
        let path = if filter.is_empty() {
            format!("/rest/v1/{}", table)
        } else {
            format!("/rest/v1/{}?{}", table, filter)
        };

        self.request_with_headers(Method::GET, &path, None, None, None)
            .await
    }

    /// Delete rows from `table` matching `filter`.
    pub async fn delete(&self, table: &str, filter: &str) -> Result<()> {
        let path = format!("/rest/v1/{}?{}", table, filter);
        let _: Vec<Value> = self
            .request_with_headers(Method::DELETE, &path, None, None, None)
            .await?;
        Ok(())
    }

    /// Acquire the advisory lock identified by `lock_key` by attempting to insert a row into the
    /// `scheduling_locks` table. PostgREST rejects the insert with a 409 when the primary key
    /// already exists, which this client surfaces as `Err` — the caller treats that as "lock held".
    /// Locks older than `stale_after_secs` are cleaned up (deleted) once, then the insert is
    /// retried a single time; a second failure is reported as lock contention rather than retried
    /// again, to avoid unbounded recursion.
    pub async fn acquire_lock(&self, lock_key: &str, stale_after_secs: i64) -> Result<()> {
        let now = chrono::Utc::now();
        let row = json!({ "lock_key": lock_key, "acquired_at": now.to_rfc3339() });

        match self
            .insert::<_, Value>("scheduling_locks", &row)
            .await
        {
            Ok(_) => Ok(()),
            Err(_) => {
                let filter = format!("lock_key=eq.{}", urlencoding::encode(lock_key));
                let existing: Vec<Value> = self.select("scheduling_locks", &filter).await?;

                if let Some(row) = existing.first() {
                    let stale = row
                        .get("acquired_at")
                        .and_then(|v| v.as_str())
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                        .map(|acquired| {
                            now.signed_duration_since(acquired.with_timezone(&chrono::Utc))
                                > chrono::Duration::seconds(stale_after_secs)
                        })
                        .unwrap_or(false);

                    if stale {
                        self.delete("scheduling_locks", &filter).await?;
                        let retry_row = json!({ "lock_key": lock_key, "acquired_at": now.to_rfc3339() });
                        return self
                            .insert::<_, Value>("scheduling_locks", &retry_row)
                            .await
                            .map(|_| ());
                    }
                }

                Err(anyhow!("lock {} is held", lock_key))
            }
        }
    }

    /// Release the advisory lock identified by `lock_key`. Always attempted, never allowed to
    /// panic the caller — failures are logged and swallowed since a stale lock is recovered by
    /// `acquire_lock`'s staleness check on the next attempt.
    pub async fn release_lock(&self, lock_key: &str) {
        let filter = format!("lock_key=eq.{}", urlencoding::encode(lock_key));
        if let Err(e) = self.delete("scheduling_locks", &filter).await {
            error!("failed to release lock {}: {}", lock_key, e);
        }
    }

pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                     auth_token: Option<&str>, body: Option<Value>,
                                     additional_headers: Option<HeaderMap>) 
                                     -> Result<T> 
where T: DeserializeOwned + Default {  // Add Default trait bound
    let url = format!("{}{}", self.base_url, path);
    debug!("Making request to {}", url);
    
    let mut headers = self.get_headers(auth_token);
    
    // Add additional headers if provided
    if let Some(add_headers) = additional_headers {
        for (name, value) in add_headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
    }
    
    let mut req = self.client.request(method, &url)
        .headers(headers);
        
    if let Some(body_data) = body {
        req = req.json(&body_data);
    }
    
    let response = req.send().await?;
    
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        error!("API error ({}): {}", status, error_text);
        
        return Err(match status.as_u16() {
            401 | 403 => anyhow!("Authentication error: {}", error_text),
            404 => anyhow!("Resource not found: {}", error_text),
            _ => anyhow!("API error ({}): {}", status, error_text),
        });
    }
    
    // Using bytes() allows us to keep the body data for debugging
    let bytes = response.bytes().await?;
    
    // If bytes are empty and T: Default, return default value (handles empty responses)
    if bytes.is_empty() {
        debug!("Empty response body, returning default value for type");
        return Ok(T::default());
    }
    
    let body_text = String::from_utf8_lossy(&bytes);
    debug!("Response body: {}", body_text);
    
    // Parse using the bytes
    let data = match serde_json::from_slice::<T>(&bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Failed to parse response: {} - Raw body: {}", e, body_text);
            return Err(anyhow!("Failed to parse response: {}", e));
        }
    };
    
    Ok(data)
    }

}