//! Stress tests for splitter convergence under churn
//!
//! Run with: cargo test --release --test stress_splitter -- --nocapture
//!
//! Every round fires all pods' syncs as spawned tasks and joins them, then
//! expires records no live pod claims any more (standing in for the
//! staleness window elapsing on abandoned rows).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use podsplit_core::config::SplitterConfig;
use podsplit_core::metrics::NoopSink;
use podsplit_core::splitter::Splitter;
use podsplit_core::store::{InMemoryStore, PodStore};

const MAX_UNUSED: Duration = Duration::from_secs(30);

fn stress_config(full_scan_count: u32) -> SplitterConfig {
    SplitterConfig {
        delay: Duration::from_secs(15),
        max_unused: MAX_UNUSED,
        full_scan_count,
        group: "splitter".into(),
    }
}

fn spawn_pod(store: Arc<dyn PodStore>, full_scan_count: u32) -> Arc<Splitter> {
    Arc::new(
        Splitter::new(stress_config(full_scan_count), store, Arc::new(NoopSink))
            .expect("valid config"),
    )
}

/// Fire every pod's sync concurrently and wait for all of them. The spawn
/// order rotates per round so no pod is always first at the store.
async fn concurrent_round(pods: &[Arc<Splitter>], round: usize) {
    let mut handles = Vec::with_capacity(pods.len());
    for i in 0..pods.len() {
        let pod = pods[(i + round) % pods.len()].clone();
        handles.push(tokio::spawn(async move { pod.sync().await }));
    }
    for handle in handles {
        handle.await.expect("sync task panicked");
    }
}

/// Expire every record no live pod claims: a pod that moved to a lower
/// ordinal leaves its old row behind, and the row would age out on its
/// own after the staleness window.
fn expire_orphans(store: &InMemoryStore, claimed_before: &HashSet<u64>, pods: &[Arc<Splitter>]) {
    let claimed_now: HashSet<u64> = pods.iter().map(|p| p.id()).filter(|&id| id != 0).collect();
    for id in claimed_before.difference(&claimed_now) {
        store.expire(*id);
    }
}

fn is_converged(pods: &[Arc<Splitter>]) -> bool {
    let fleet = pods.len() as u32;
    let mut nums = Vec::with_capacity(pods.len());
    for pod in pods {
        let num = pod.num();
        if pod.count() != fleet || num < 1 || num > fleet {
            return false;
        }
        nums.push(num);
    }
    nums.sort_unstable();
    nums.dedup();
    // Distinct ordinals within bounds are necessarily {1..=fleet}.
    nums.len() == pods.len()
}

/// Run rounds until the fleet converges, up to `cap`. Returns rounds used.
async fn converge_within(store: &InMemoryStore, pods: &[Arc<Splitter>], cap: usize) -> usize {
    for round in 1..=cap {
        let claimed: HashSet<u64> = pods.iter().map(|p| p.id()).filter(|&id| id != 0).collect();
        concurrent_round(pods, round).await;
        expire_orphans(store, &claimed, pods);
        if is_converged(pods) {
            return round;
        }
    }
    panic!("fleet did not converge within {} rounds", cap);
}

/// Cold start at fleet scale: every pod races to claim simultaneously.
#[tokio::test]
async fn stress_cold_start_convergence() {
    let fleet = 16;
    let store = Arc::new(InMemoryStore::new(MAX_UNUSED));
    let pods: Vec<_> = (0..fleet).map(|_| spawn_pod(store.clone(), 0)).collect();

    let start = Instant::now();
    let rounds = converge_within(&store, &pods, 25).await;
    let elapsed = start.elapsed();

    println!("Cold start stress test:");
    println!("  Pods: {}", fleet);
    println!("  Rounds to converge: {}", rounds);
    println!("  Elapsed: {:?}", elapsed);

    assert_eq!(store.active_nums("splitter", MAX_UNUSED).len(), fleet);
}

/// Rolling churn: kill one pod, start one pod, reconverge, repeat.
#[tokio::test]
async fn stress_rolling_churn() {
    let fleet = 6;
    let churn_steps = 10;
    let store = Arc::new(InMemoryStore::new(MAX_UNUSED));
    let mut pods: Vec<_> = (0..fleet).map(|_| spawn_pod(store.clone(), 1)).collect();

    converge_within(&store, &pods, 25).await;

    let start = Instant::now();
    let mut total_rounds = 0;
    for step in 0..churn_steps {
        let killed = pods.remove(step % pods.len());
        store.expire(killed.id());
        pods.push(spawn_pod(store.clone(), 1));

        total_rounds += converge_within(&store, &pods, 10).await;
    }
    let elapsed = start.elapsed();

    println!("Rolling churn stress test:");
    println!("  Churn steps: {}", churn_steps);
    println!("  Total repair rounds: {}", total_rounds);
    println!(
        "  Avg rounds per repair: {:.2}",
        total_rounds as f64 / churn_steps as f64
    );
    println!("  Elapsed: {:?}", elapsed);

    // Ten single-pod replacements never grow the row set past one spare.
    assert!(store.record_count() <= fleet + churn_steps);
}

/// Scale the fleet up and back down, converging at every size.
#[tokio::test]
async fn stress_scale_up_and_down() {
    let store = Arc::new(InMemoryStore::new(MAX_UNUSED));
    let mut pods: Vec<_> = (0..2).map(|_| spawn_pod(store.clone(), 0)).collect();
    converge_within(&store, &pods, 25).await;

    // Up to 10 pods, one at a time.
    for _ in 0..8 {
        pods.push(spawn_pod(store.clone(), 0));
        converge_within(&store, &pods, 10).await;
    }
    assert_eq!(pods.len(), 10);

    // Back down to 3, always killing the pod holding the highest ordinal
    // so the remaining ordinals stay contiguous.
    while pods.len() > 3 {
        let highest = pods
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| p.num())
            .map(|(i, _)| i)
            .expect("fleet is non-empty");
        let killed = pods.remove(highest);
        store.expire(killed.id());
        converge_within(&store, &pods, 10).await;
    }

    println!("Scale stress test:");
    println!("  Final fleet: {}", pods.len());
    println!("  Rows in store: {}", store.record_count());
}
