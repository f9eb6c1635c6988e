mod common;

use std::time::Duration;

use rpool::test_utils::{MemoryDriver, MemoryError, MemoryQuery};
use rpool::{Job, JobOutput, Pool, QueryResult, QueryUnit, RpoolError, RunOptions};
use serde_json::json;

#[tokio::test]
async fn batch_results_keep_input_order() -> Result<(), RpoolError> {
    common::init_tracing();
    let driver = MemoryDriver::new();
    let pool = Pool::builder(driver.clone(), common::LOCAL).max(3).build().await?;

    let results = pool
        .run_all(
            vec![
                MemoryQuery::Delay(Duration::from_millis(30), json!("slow")),
                driver.expr("fast"),
                MemoryQuery::Rows(vec![json!(1), json!(2)]),
            ],
            &RunOptions::new(),
        )
        .await?;

    assert_eq!(
        results,
        vec![
            QueryResult::Value(json!("slow")),
            QueryResult::Value(json!("fast")),
            QueryResult::Rows(vec![json!(1), json!(2)]),
        ]
    );
    assert_eq!(pool.status().in_use, 0);

    pool.drain().await;
    Ok(())
}

#[tokio::test]
async fn failing_member_fails_the_batch_without_leaks() -> Result<(), RpoolError> {
    let driver = MemoryDriver::new();
    let pool = Pool::builder(driver.clone(), common::LOCAL).max(3).build().await?;

    let err = pool
        .run_all(
            vec![
                driver.expr(1),
                MemoryQuery::Fail("q2".into()),
                MemoryQuery::Delay(Duration::from_millis(40), json!(3)),
            ],
            &RunOptions::new(),
        )
        .await
        .unwrap_err();

    let source = err.driver_error().and_then(|e| e.downcast_ref::<MemoryError>());
    assert_eq!(source, Some(&MemoryError::QueryFailed("q2".into())));
    // every member finished and released before the error came back
    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.idle, status.size);

    pool.drain().await;
    assert_eq!(driver.open_count(), 0);
    Ok(())
}

#[tokio::test]
async fn earliest_failure_in_input_order_wins() -> Result<(), RpoolError> {
    let driver = MemoryDriver::new();
    let pool = Pool::builder(driver.clone(), common::LOCAL).build().await?;

    let units: Vec<QueryUnit<MemoryDriver>> = vec![
        MemoryQuery::Delay(Duration::from_millis(30), json!(0)).into(),
        QueryUnit::bound(MemoryQuery::BrokenCursor {
            rows: vec![],
            message: "first".into(),
        }),
        MemoryQuery::Fail("second".into()).into(),
    ];
    let err = pool.run_all(units, &RunOptions::new()).await.unwrap_err();
    assert!(matches!(err, RpoolError::CursorError(_)));

    pool.drain().await;
    Ok(())
}

#[tokio::test]
async fn concurrency_never_exceeds_max() -> Result<(), RpoolError> {
    let driver = MemoryDriver::new();
    let pool = Pool::builder(driver.clone(), common::LOCAL)
        .max(2)
        .build()
        .await?;

    let units = (0..10).map(|i| MemoryQuery::Delay(Duration::from_millis(5), json!(i)));
    let results = pool.run_all(units, &RunOptions::new()).await?;

    assert_eq!(results.len(), 10);
    assert_eq!(results[7].as_value(), Some(&json!(7)));
    assert!(driver.connect_count() <= 2);
    assert_eq!(pool.status().in_use, 0);

    pool.drain().await;
    Ok(())
}

#[tokio::test]
async fn nested_jobs_keep_their_shape() -> Result<(), RpoolError> {
    let driver = MemoryDriver::new();
    let pool = Pool::builder(driver.clone(), common::LOCAL).build().await?;

    let job = Job::Batch(vec![
        Job::Single(driver.expr("a").into()),
        Job::from(vec![
            QueryUnit::from(driver.expr("b")),
            QueryUnit::from(driver.expr("c")),
        ]),
    ]);
    let output = pool.run_job(job, &RunOptions::new()).await?;

    assert_eq!(
        output,
        JobOutput::Batch(vec![
            JobOutput::Single(QueryResult::Value(json!("a"))),
            JobOutput::Batch(vec![
                JobOutput::Single(QueryResult::Value(json!("b"))),
                JobOutput::Single(QueryResult::Value(json!("c"))),
            ]),
        ])
    );

    let single = pool
        .run_job(QueryUnit::from(driver.expr(5)), &RunOptions::new())
        .await?;
    assert_eq!(single.into_single(), Some(QueryResult::Value(json!(5))));

    pool.drain().await;
    Ok(())
}
