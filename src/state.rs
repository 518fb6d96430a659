use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db::Store;
use crate::services::{AuditService, AuthService, CsrfStore, SessionPolicy, UploadService};

/// Process-wide state shared by every request handler.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    /// In-process anti-forgery token store; would have to move to a shared
    /// store if this service were ever scaled past one process.
    pub csrf: Arc<CsrfStore>,

    pub uploads: Arc<UploadService>,

    pub audit: Arc<AuditService>,

    pub auth: Arc<AuthService>,

    pub session_policy: SessionPolicy,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let pruned = store
            .prune_audit(config.general.audit_retention_days)
            .await?;
        if pruned > 0 {
            info!("Pruned {pruned} audit entries past retention");
        }

        // The static file service serves straight out of the upload tree;
        // make sure it exists before the first request.
        std::fs::create_dir_all(&config.uploads.root)?;

        let audit = Arc::new(AuditService::new(store.clone()));
        let auth = Arc::new(AuthService::new(
            store.clone(),
            audit.clone(),
            config.security.clone(),
        ));
        let uploads = Arc::new(UploadService::new(config.uploads.clone()));
        let csrf = Arc::new(CsrfStore::default());
        let session_policy = SessionPolicy::from_config(&config.security.session);

        Ok(Self {
            config: Arc::new(config),
            store,
            csrf,
            uploads,
            audit,
            auth,
            session_policy,
        })
    }
}
