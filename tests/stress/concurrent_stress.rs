//! Concurrent push stress tests
//!
//! Many independent sessions at once, each with its own files and context

use deltasync::config::SyncConfig;
use deltasync::push::{local_push_async, PushOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::fs;
use tokio::sync::Semaphore;

/// Run a single push and return success/duration
async fn run_single_push(file_size: usize, push_id: usize) -> (bool, u64) {
    let temp_dir = TempDir::new().unwrap();
    let new_path = temp_dir.path().join(format!("new_{}.bin", push_id));
    let old_path = temp_dir.path().join(format!("old_{}.bin", push_id));

    let mut rng = StdRng::seed_from_u64(push_id as u64);
    let mut old = vec![0u8; file_size];
    rng.fill(&mut old[..]);
    let mut new = old.clone();
    for _ in 0..5 {
        let at = rng.gen_range(0..new.len());
        new[at] = new[at].wrapping_add(1);
    }

    fs::write(&old_path, &old).await.unwrap();
    fs::write(&new_path, &new).await.unwrap();

    let start = Instant::now();
    let options = PushOptions::new(SyncConfig::with_block_size(1024));
    let result = local_push_async(new_path, old_path.clone(), options).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let success = match result {
        Ok(ctx) => {
            ctx.bytes_written == new.len() as u64
                && fs::read(&old_path).await.map(|d| d == new).unwrap_or(false)
        }
        Err(_) => false,
    };

    (success, duration_ms)
}

/// Stress test: Concurrent pushes at increasing parallelism
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_concurrent_pushes() {
    println!("\n========================================");
    println!("STRESS TEST: Concurrent Pushes");
    println!("========================================\n");

    println!(
        "{:<12} | {:<10} | {:<12}",
        "Concurrent", "Succeeded", "Duration"
    );
    println!("{}", "-".repeat(40));

    for concurrency in [1usize, 4, 16] {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let start = Instant::now();

        let handles: Vec<_> = (0..concurrency * 2)
            .map(|id| {
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.unwrap();
                    run_single_push(512 * 1024, concurrency * 100 + id).await
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            let (success, _) = handle.await.unwrap();
            if success {
                succeeded += 1;
            }
        }

        println!(
            "{:<12} | {:>4}/{:<5} | {:>10}ms",
            concurrency,
            succeeded,
            concurrency * 2,
            start.elapsed().as_millis()
        );

        assert_eq!(succeeded, concurrency * 2);
    }
}
