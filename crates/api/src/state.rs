use std::sync::Arc;

use lostfound_domain::items::ItemService;
use lostfound_domain::meetup::MeetupNegotiator;
use lostfound_domain::notifications::NotificationService;
use lostfound_domain::ports::items::ItemRepository;
use lostfound_domain::ports::notifications::NotificationRepository;
use lostfound_domain::ports::users::UserDirectory;
use lostfound_domain::proximity::ProximityService;
use lostfound_infra::config::AppConfig;
use lostfound_infra::db::{DbConfig, connect};
use lostfound_infra::repositories::{
    InMemoryItemRepository, InMemoryNotificationRepository, InMemoryUserDirectory,
    SurrealItemRepository, SurrealNotificationRepository, SurrealUserDirectory,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub items: ItemService,
    pub proximity: ProximityService,
    pub notifications: NotificationService,
    pub negotiator: MeetupNegotiator,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        if config.uses_surreal() {
            let db_config = DbConfig::from_app_config(&config);
            let client = connect(&db_config).await?;
            let timeout = db_config.store_timeout;
            return Ok(Self::with_repositories(
                config,
                Arc::new(SurrealItemRepository::with_client(client.clone(), timeout)),
                Arc::new(SurrealNotificationRepository::with_client(
                    client.clone(),
                    timeout,
                )),
                Arc::new(SurrealUserDirectory::with_client(client, timeout)),
            ));
        }

        let seed_user_ids = config.seed_user_ids();
        tracing::info!(
            seeded_users = seed_user_ids.len(),
            "using in-memory stores"
        );
        Ok(Self::with_repositories(
            config,
            Arc::new(InMemoryItemRepository::new()),
            Arc::new(InMemoryNotificationRepository::new()),
            Arc::new(InMemoryUserDirectory::seeded(seed_user_ids)),
        ))
    }

    pub fn with_repositories(
        config: AppConfig,
        items: Arc<dyn ItemRepository>,
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let notification_service =
            NotificationService::new(notifications.clone(), users, items.clone());
        Self {
            config,
            items: ItemService::new(items.clone(), notifications),
            proximity: ProximityService::new(items),
            negotiator: MeetupNegotiator::new(notification_service.clone()),
            notifications: notification_service,
        }
    }
}
