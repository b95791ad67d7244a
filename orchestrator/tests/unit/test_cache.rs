//! Job cache unit tests

use std::sync::Arc;

use tokio::sync::RwLock;

use deploy_orchestrator::cache::jobs::{JobCache, JobHandle};
use deploy_orchestrator::deploy::pipeline::new_job;
use deploy_orchestrator::models::deployment::{DeploymentConfig, RolloutStrategy};

fn handle(version: &str) -> (String, JobHandle) {
    let job = new_job(
        DeploymentConfig::new("env-1", version, RolloutStrategy::Rolling),
        "tester",
    );
    (job.id.clone(), Arc::new(RwLock::new(job)))
}

#[test]
fn test_cache_insert_and_get() {
    let cache = JobCache::new(10);
    let (id, job) = handle("v1");

    cache.insert(id.clone(), job);

    assert_eq!(cache.len(), 1);
    let cached = cache.get(&id).unwrap();
    let version = tokio_test::block_on(async { cached.read().await.config.version.clone() });
    assert_eq!(version, "v1");
    assert!(cache.get("missing").is_none());
}

#[test]
fn test_cache_never_evicts_unfinished_jobs() {
    let cache = JobCache::new(1);
    for version in ["v1", "v2", "v3"] {
        let (id, job) = handle(version);
        cache.insert(id, job);
    }
    assert_eq!(cache.len(), 3);
}

#[test]
fn test_cache_evicts_oldest_finished_job() {
    let cache = JobCache::new(2);
    let mut ids = Vec::new();
    for version in ["v1", "v2", "v3"] {
        let (id, job) = handle(version);
        cache.insert(id.clone(), job);
        ids.push(id);
    }

    cache.mark_finished(&ids[0]);
    std::thread::sleep(std::time::Duration::from_millis(2));
    cache.mark_finished(&ids[1]);
    assert_eq!(cache.len(), 3);

    std::thread::sleep(std::time::Duration::from_millis(2));
    cache.mark_finished(&ids[2]);

    assert_eq!(cache.len(), 2);
    assert!(cache.get(&ids[0]).is_none());
    assert!(cache.get(&ids[1]).is_some());
    assert!(cache.get(&ids[2]).is_some());
}

#[test]
fn test_cache_keeps_latest_finished_job_with_zero_retention() {
    let cache = JobCache::new(0);
    let (first, job) = handle("v1");
    cache.insert(first.clone(), job);
    let (second, job) = handle("v2");
    cache.insert(second.clone(), job);

    cache.mark_finished(&first);
    assert!(cache.get(&first).is_some());

    cache.mark_finished(&second);
    assert!(cache.get(&first).is_none());
    assert!(cache.get(&second).is_some());
}

#[test]
fn test_cache_finishing_twice_does_not_evict() {
    let cache = JobCache::new(2);
    let mut ids = Vec::new();
    for version in ["v1", "v2"] {
        let (id, job) = handle(version);
        cache.insert(id.clone(), job);
        ids.push(id);
    }

    cache.mark_finished(&ids[0]);
    cache.mark_finished(&ids[1]);
    cache.mark_finished(&ids[1]);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_cache_remove() {
    let cache = JobCache::new(10);
    let (id, job) = handle("v1");
    cache.insert(id.clone(), job);

    assert!(cache.remove(&id).is_some());
    assert!(cache.is_empty());
    assert!(cache.remove(&id).is_none());
}
