/// In-game assistant chat with a canned fallback.
pub mod assistant_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Upstream agents grading submissions and answering questions.
pub mod task_validator;
/// Accounts, progress saves, completion log and leaderboard.
pub mod user_service;
/// Task submission grading with timeout and safe degradation.
pub mod validation_service;
