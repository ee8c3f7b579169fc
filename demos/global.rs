//! Runs a small program with `SuperblockGlobal` as the process allocator.
//!
//! Every allocation made here, including the standard library's, must fit in
//! 2048 bytes.

use sbmalloc::SuperblockGlobal;

#[global_allocator]
static ALLOC: SuperblockGlobal = SuperblockGlobal::new();

fn main() {
    ALLOC.claim_current_thread().expect("main thread owns the allocator");

    let mut boxes = Vec::with_capacity(200);
    for i in 0..200u64 {
        boxes.push(Box::new(i * 3));
    }
    let words: Vec<String> = (0..50).map(|i| format!("item-{i}")).collect();
    println!("boxed {} values, built {} strings", boxes.len(), words.len());

    drop(boxes);
    drop(words);

    let stats = ALLOC.stats().expect("same thread");
    for pool in stats.pools.iter().filter(|p| p.superblocks > 0) {
        println!(
            "class {} ({:>4} B): {} superblocks, {} free slots, {} whole",
            pool.class, pool.slot_size, pool.superblocks, pool.free_slots, pool.whole_superblocks
        );
    }
    println!(
        "mapped {} pages, unmapped {}",
        stats.metrics.pages_mapped, stats.metrics.pages_unmapped
    );
}
