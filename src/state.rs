use crate::{auth::CredentialResolver, db::PhotoStore, lifecycle::PhotoLifecycle, utils::Config};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub photos: Arc<dyn PhotoStore>,
    pub lifecycle: Arc<PhotoLifecycle>,
    pub resolver: Arc<CredentialResolver>,
    pub config: Arc<Config>,
}
