//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use pattaya_api::{
    db::{IdentityStore, PhotoStore},
    models::{Identity, Photo, PhotoPatch, PhotoStatus, Role},
    utils::StoreError,
};
use serde_json::json;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

pub const SESSION_SECRET: &str = "test-session-secret-for-integration-tests";
pub const PROJECT_ID: &str = "pattaya-test";
pub const PROVIDER_KID: &str = "test-key-1";
pub const PROVIDER_JWKS: &str = include_str!("../fixtures/provider_jwks.json");
const PROVIDER_SIGNING_KEY: &str = include_str!("../fixtures/provider_signing_key.pem");

pub fn identity(id: i64, username: &str, provider_uid: Option<&str>, blocked: bool) -> Identity {
    Identity {
        id,
        username: username.to_string(),
        email: format!("{username}@example.com"),
        blocked,
        role: Some(Role {
            id: 1,
            name: "Authenticated".to_string(),
            role_type: "authenticated".to_string(),
        }),
        provider_uid: provider_uid.map(str::to_string),
    }
}

/// In-memory identity store that counts lookups
#[derive(Default)]
pub struct MemoryIdentityStore {
    pub users: Vec<Identity>,
    pub unreachable: AtomicBool,
    pub by_id_calls: AtomicUsize,
    pub by_uid_calls: AtomicUsize,
}

impl MemoryIdentityStore {
    pub fn new(users: Vec<Identity>) -> Self {
        Self {
            users,
            ..Default::default()
        }
    }

    pub fn by_id_calls(&self) -> usize {
        self.by_id_calls.load(Ordering::SeqCst)
    }

    pub fn by_uid_calls(&self) -> usize {
        self.by_uid_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(StoreError::UnexpectedStatus {
                resource: "user",
                status: 503,
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, StoreError> {
        self.by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_provider_uid(&self, uid: &str) -> Result<Vec<Identity>, StoreError> {
        self.by_uid_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self
            .users
            .iter()
            .filter(|u| u.provider_uid.as_deref() == Some(uid))
            .cloned()
            .collect())
    }
}

/// In-memory photo table applying patches the way PostgREST would
#[derive(Default)]
pub struct MemoryPhotoStore {
    pub photos: Mutex<Vec<Photo>>,
}

impl MemoryPhotoStore {
    pub fn with_photo(id: i64, status: PhotoStatus) -> Self {
        let photo = Photo {
            id,
            status,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            uploaded_at: Some(Utc::now() - Duration::days(1)),
            author: Some(1),
            extra: Default::default(),
        };
        Self {
            photos: Mutex::new(vec![photo]),
        }
    }

    pub fn get(&self, id: i64) -> Option<Photo> {
        self.photos.lock().unwrap().iter().find(|p| p.id == id).cloned()
    }
}

fn apply_patch(photo: &mut Photo, patch: &PhotoPatch) {
    if let Some(status) = patch.status {
        photo.status = status;
    }
    if let Some(value) = patch.approved_at {
        photo.approved_at = value;
    }
    if let Some(value) = patch.rejected_at {
        photo.rejected_at = value;
    }
    if let Some(value) = &patch.rejection_reason {
        photo.rejection_reason = value.clone();
    }
    if let Some(value) = patch.uploaded_at {
        photo.uploaded_at = value;
    }
    if let Some(author) = patch.author {
        photo.author = Some(author);
    }
    photo.extra.extend(patch.extra.clone());
}

#[async_trait]
impl PhotoStore for MemoryPhotoStore {
    async fn find_photo(&self, id: i64) -> Result<Option<Photo>, StoreError> {
        Ok(self.get(id))
    }

    async fn update_photo(&self, id: i64, patch: &PhotoPatch) -> Result<Option<Photo>, StoreError> {
        let mut photos = self.photos.lock().unwrap();
        Ok(photos.iter_mut().find(|p| p.id == id).map(|photo| {
            apply_patch(photo, patch);
            photo.clone()
        }))
    }

    async fn create_photo(&self, patch: &PhotoPatch) -> Result<Photo, StoreError> {
        let mut photos = self.photos.lock().unwrap();
        let mut photo = Photo {
            id: photos.iter().map(|p| p.id).max().unwrap_or(0) + 1,
            status: PhotoStatus::Pending,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            uploaded_at: None,
            author: None,
            extra: Default::default(),
        };
        apply_patch(&mut photo, patch);
        photos.push(photo.clone());
        Ok(photo)
    }
}

pub fn session_token(id: i64) -> String {
    pattaya_api::auth::SessionTokenVerifier::new(SESSION_SECRET)
        .issue(id, Duration::hours(1))
        .expect("Failed to create session token")
}

/// Provider ID token signed with the fixture key
pub fn provider_token(uid: &str) -> String {
    provider_token_with(uid, PROJECT_ID, Some(PROVIDER_KID), Duration::hours(1))
}

pub fn provider_token_with(
    uid: &str,
    project_id: &str,
    kid: Option<&str>,
    ttl: Duration,
) -> String {
    let now = Utc::now();
    let claims = json!({
        "iss": format!("https://securetoken.google.com/{project_id}"),
        "aud": project_id,
        "sub": uid,
        "iat": now.timestamp(),
        "exp": (now + ttl).timestamp(),
        "auth_time": now.timestamp(),
        "email": format!("{uid}@example.com"),
        "email_verified": true
    });

    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);

    let key = EncodingKey::from_rsa_pem(PROVIDER_SIGNING_KEY.as_bytes())
        .expect("Failed to load signing key");
    encode(&header, &claims, &key).expect("Failed to create provider token")
}

/// Serve the fixture key set; returns the server (keep it alive) and the JWKS URL
pub async fn jwks_server() -> (mockito::ServerGuard, mockito::Mock, String) {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/jwks")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(PROVIDER_JWKS)
        .create_async()
        .await;
    let url = format!("{}/jwks", server.url());
    (server, mock, url)
}
