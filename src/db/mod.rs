use crate::{
    models::{Identity, Photo, PhotoPatch},
    utils::{config::DatabaseConfig, StoreError},
};
use async_trait::async_trait;
use postgrest::Postgrest;
use serde::de::DeserializeOwned;
use std::fmt::Display;

const USER_COLUMNS: &str = "id,username,email,blocked,firebase_uid,role:roles(id,name,type)";

/// Read access to identity records
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, StoreError>;

    /// All identities linked to the given provider subject, in store order.
    async fn find_by_provider_uid(&self, uid: &str) -> Result<Vec<Identity>, StoreError>;
}

/// Photo persistence used by the photo handlers and lifecycle
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn find_photo(&self, id: i64) -> Result<Option<Photo>, StoreError>;
    async fn update_photo(&self, id: i64, patch: &PhotoPatch) -> Result<Option<Photo>, StoreError>;
    async fn create_photo(&self, patch: &PhotoPatch) -> Result<Photo, StoreError>;
}

/// Database client wrapper for Supabase PostgreSQL
#[derive(Clone)]
pub struct Database {
    client: Postgrest,
}

impl Database {
    /// Create a new database client
    pub fn new(config: &DatabaseConfig) -> Self {
        let client = Postgrest::new(format!(
            "{}/rest/v1",
            config.supabase_url.trim_end_matches('/')
        ))
        .insert_header("apikey", &config.supabase_key)
        .insert_header("Authorization", format!("Bearer {}", config.supabase_key));

        Self { client }
    }
}

fn unreachable(err: impl Display) -> StoreError {
    StoreError::Unreachable(err.to_string())
}

fn read_rows<T: DeserializeOwned>(
    status: u16,
    body: &str,
    resource: &'static str,
) -> Result<Vec<T>, StoreError> {
    if !(200..300).contains(&status) {
        return Err(StoreError::UnexpectedStatus { resource, status });
    }

    serde_json::from_str(body).map_err(|source| StoreError::Malformed { resource, source })
}

fn patch_body(patch: &PhotoPatch) -> Result<String, StoreError> {
    serde_json::to_string(patch).map_err(|source| StoreError::Malformed {
        resource: "photo",
        source,
    })
}

#[async_trait]
impl IdentityStore for Database {
    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, StoreError> {
        let response = self
            .client
            .from("users")
            .select(USER_COLUMNS)
            .eq("id", id.to_string())
            .execute()
            .await
            .map_err(unreachable)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(unreachable)?;

        let users: Vec<Identity> = read_rows(status, &body, "user")?;
        Ok(users.into_iter().next())
    }

    async fn find_by_provider_uid(&self, uid: &str) -> Result<Vec<Identity>, StoreError> {
        let response = self
            .client
            .from("users")
            .select(USER_COLUMNS)
            .eq("firebase_uid", uid)
            .order("id.asc")
            .execute()
            .await
            .map_err(unreachable)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(unreachable)?;

        read_rows(status, &body, "user")
    }
}

#[async_trait]
impl PhotoStore for Database {
    async fn find_photo(&self, id: i64) -> Result<Option<Photo>, StoreError> {
        let response = self
            .client
            .from("photos")
            .select("*")
            .eq("id", id.to_string())
            .execute()
            .await
            .map_err(unreachable)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(unreachable)?;

        let photos: Vec<Photo> = read_rows(status, &body, "photo")?;
        Ok(photos.into_iter().next())
    }

    async fn update_photo(&self, id: i64, patch: &PhotoPatch) -> Result<Option<Photo>, StoreError> {
        let response = self
            .client
            .from("photos")
            .eq("id", id.to_string())
            .update(patch_body(patch)?)
            .execute()
            .await
            .map_err(unreachable)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(unreachable)?;

        let photos: Vec<Photo> = read_rows(status, &body, "photo")?;
        Ok(photos.into_iter().next())
    }

    async fn create_photo(&self, patch: &PhotoPatch) -> Result<Photo, StoreError> {
        let response = self
            .client
            .from("photos")
            .insert(patch_body(patch)?)
            .execute()
            .await
            .map_err(unreachable)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(unreachable)?;

        let photos: Vec<Photo> = read_rows(status, &body, "photo")?;
        photos
            .into_iter()
            .next()
            .ok_or(StoreError::EmptyResult { resource: "photo" })
    }
}
