//! Large file stress tests
//!
//! Pushes multi-megabyte files through the file-based path with a range of
//! block lengths and edit patterns.

use deltasync::config::SyncConfig;
use deltasync::push::{local_push, PushOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::time::Instant;
use tempfile::TempDir;

/// Push one edited copy of a random file and return (success, ms, match ratio)
fn push_edited(file_size: usize, block_size: usize, edits: usize, seed: u64) -> (bool, u64, f64) {
    let temp_dir = TempDir::new().unwrap();
    let new_path = temp_dir.path().join("new.bin");
    let old_path = temp_dir.path().join("old.bin");

    let mut rng = StdRng::seed_from_u64(seed);
    let mut old = vec![0u8; file_size];
    rng.fill(&mut old[..]);

    let mut new = old.clone();
    for _ in 0..edits {
        let at = rng.gen_range(0..new.len());
        match rng.gen_range(0..3) {
            0 => new[at] = rng.gen(),
            1 => {
                new.insert(at, rng.gen());
            }
            _ => {
                new.remove(at);
            }
        }
    }

    fs::write(&old_path, &old).unwrap();
    fs::write(&new_path, &new).unwrap();

    let start = Instant::now();
    let options = PushOptions::new(SyncConfig::with_block_size(block_size));
    let ctx = match local_push(&new_path, &old_path, &options) {
        Ok(ctx) => ctx,
        Err(_) => return (false, 0, 0.0),
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    let success = fs::read(&old_path).map(|data| data == new).unwrap_or(false)
        && ctx.bytes_written == new.len() as u64;

    (success, duration_ms, ctx.match_ratio())
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

/// Stress test: Large files at various sizes
#[test]
fn stress_large_file_sizes() {
    println!("\n========================================");
    println!("STRESS TEST: Large File Pushes");
    println!("========================================\n");

    let file_sizes = vec![
        1024 * 1024,      // 1 MB
        4 * 1024 * 1024,  // 4 MB
        16 * 1024 * 1024, // 16 MB
    ];

    println!("Configuration: 4 KB blocks, 20 random edits\n");

    println!(
        "{:<12} | {:<12} | {:<10} | {:<10}",
        "File Size", "Duration", "Matched", "Success"
    );
    println!("{}", "-".repeat(52));

    for (i, file_size) in file_sizes.into_iter().enumerate() {
        let (success, duration_ms, ratio) = push_edited(file_size, 4096, 20, i as u64);

        println!(
            "{:<12} | {:>10}ms | {:>9.1}% | {:>10}",
            format_size(file_size),
            duration_ms,
            ratio,
            if success { "PASS" } else { "FAIL" }
        );

        assert!(success, "push of {} failed", format_size(file_size));
        assert!(ratio > 90.0);
    }
}

/// Stress test: Block length impact on a fixed file
#[test]
fn stress_block_size_impact() {
    println!("\n============================================");
    println!("STRESS TEST: Block Length Impact");
    println!("============================================\n");

    let block_sizes = vec![64, 512, 4096, 65536];

    println!("File size: 4 MB, 50 random edits\n");

    println!(
        "{:<12} | {:<12} | {:<10} | {:<10}",
        "Block", "Duration", "Matched", "Success"
    );
    println!("{}", "-".repeat(52));

    for block_size in block_sizes {
        let (success, duration_ms, ratio) = push_edited(4 * 1024 * 1024, block_size, 50, 99);

        println!(
            "{:<12} | {:>10}ms | {:>9.1}% | {:>10}",
            format_size(block_size),
            duration_ms,
            ratio,
            if success { "PASS" } else { "FAIL" }
        );

        assert!(success, "push with {} blocks failed", block_size);
    }
}

/// Stress test: Heavily repetitive content fills index buckets
#[test]
fn stress_repetitive_content() {
    println!("\n============================================");
    println!("STRESS TEST: Repetitive Content");
    println!("============================================\n");

    let temp_dir = TempDir::new().unwrap();
    let new_path = temp_dir.path().join("new.bin");
    let old_path = temp_dir.path().join("old.bin");

    let pattern = b"0123456789abcdef";
    let old: Vec<u8> = pattern.iter().copied().cycle().take(2 * 1024 * 1024).collect();
    let mut new = old.clone();
    new.splice(1_000_000..1_000_000, b"XYZ".iter().copied());

    fs::write(&old_path, &old).unwrap();
    fs::write(&new_path, &new).unwrap();

    let start = Instant::now();
    let ctx = local_push(&new_path, &old_path, &PushOptions::default()).unwrap();
    println!("{} in {}ms", ctx, start.elapsed().as_millis());

    assert_eq!(fs::read(&old_path).unwrap(), new);
    assert!(ctx.match_ratio() > 99.0);
}
