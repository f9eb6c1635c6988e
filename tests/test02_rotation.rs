mod common;

use std::collections::HashSet;

use rpool::test_utils::MemoryDriver;
use rpool::{Pool, RpoolError};

fn hosts(driver: &MemoryDriver) -> Vec<String> {
    driver
        .connected_endpoints()
        .into_iter()
        .filter_map(|e| e.host)
        .collect()
}

#[tokio::test]
async fn each_new_connection_takes_the_next_endpoint() -> Result<(), RpoolError> {
    common::init_tracing();
    let driver = MemoryDriver::new();
    let pool = Pool::builder(
        driver.clone(),
        vec![
            "rethinkdb://a:28015",
            "rethinkdb://b:28015",
            "rethinkdb://c:28015",
        ],
    )
    .min(0)
    .max(4)
    .build()
    .await?;

    let mut held = Vec::new();
    for _ in 0..3 {
        held.push(pool.acquire().await?);
    }
    let first_round = hosts(&driver);
    let distinct: HashSet<_> = first_round.iter().cloned().collect();
    assert_eq!(distinct.len(), 3, "first three connections hit every endpoint");

    // the fourth connection wraps around to the first endpoint used
    held.push(pool.acquire().await?);
    let all = hosts(&driver);
    assert_eq!(all.len(), 4);
    assert_eq!(all[3], all[0]);

    drop(held);
    pool.drain().await;
    Ok(())
}

#[tokio::test]
async fn two_endpoints_start_on_the_second() -> Result<(), RpoolError> {
    let driver = MemoryDriver::new();
    let pool = Pool::builder(driver.clone(), vec!["rethinkdb://a", "rethinkdb://b"])
        .min(0)
        .max(3)
        .build()
        .await?;

    let c1 = pool.acquire().await?;
    let c2 = pool.acquire().await?;
    let c3 = pool.acquire().await?;
    assert_eq!(hosts(&driver), vec!["b", "a", "b"]);

    c1.release();
    c2.release();
    c3.release();
    pool.drain().await;
    Ok(())
}

#[tokio::test]
async fn reused_connections_do_not_advance_rotation() -> Result<(), RpoolError> {
    let driver = MemoryDriver::new();
    let pool = Pool::builder(driver.clone(), vec!["rethinkdb://a", "rethinkdb://b"])
        .min(0)
        .max(2)
        .build()
        .await?;

    for _ in 0..5 {
        pool.acquire().await?.release();
    }
    assert_eq!(driver.connect_count(), 1);
    assert_eq!(pool.endpoints().len(), 2);

    pool.drain().await;
    Ok(())
}
