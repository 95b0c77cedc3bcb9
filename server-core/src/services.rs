//! The `Services` record (C0). Built once in `main`, then threaded through
//! every component as `Arc<Services>` instead of module-level singletons,
//! widened to the full capability set named in the Design Notes: every
//! component reaches its registries and repositories through this record,
//! never through a global singleton.

use std::sync::Arc;

use crate::config::Config;
use crate::instance::InstanceManager;
use crate::repository::{
    AchievementRepository, ChatRepository, InMemoryAchievementRepository, InMemoryChatRepository,
    InMemoryLeaderboardRepository, InMemoryUserRepository, InMemoryUserSettingsRepository, LeaderboardRepository,
    UserRepository, UserSettingsRepository,
};
use crate::room::RoomRegistry;
use crate::session::SessionRegistry;

pub struct Services {
    pub config: Config,
    pub sessions: SessionRegistry,
    pub rooms: RoomRegistry,
    pub instances: InstanceManager,
    pub users: Arc<dyn UserRepository>,
    pub user_settings: Arc<dyn UserSettingsRepository>,
    pub leaderboard: Arc<dyn LeaderboardRepository>,
    pub chat: Arc<dyn ChatRepository>,
    pub achievements: Arc<dyn AchievementRepository>,
}

impl Services {
    /// Wires the in-memory repository implementations. A deployment with a
    /// real document store swaps these five fields for Mongo-backed
    /// implementations without touching C2–C9.
    pub fn new_in_memory(config: Config) -> Arc<Services> {
        Arc::new(Services {
            config,
            sessions: SessionRegistry::new(),
            rooms: RoomRegistry::new(),
            instances: InstanceManager::new(),
            users: Arc::new(InMemoryUserRepository::default()),
            user_settings: Arc::new(InMemoryUserSettingsRepository::default()),
            leaderboard: Arc::new(InMemoryLeaderboardRepository::default()),
            chat: Arc::new(InMemoryChatRepository::default()),
            achievements: Arc::new(InMemoryAchievementRepository::default()),
        })
    }
}
