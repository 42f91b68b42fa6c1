use std::time::Duration;

use futures_util::future::join_all;
use netpool::{Connection, Error, Pool, PoolOptions};
use netpool_test::{setup_if_needed, MockConnection, MockConnector};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn pool(initial: usize, max: usize) -> anyhow::Result<(Pool<MockConnection>, MockConnector)> {
    setup_if_needed();

    let connector = MockConnector::new();
    let pool = Pool::connect(initial, max, connector.clone()).await?;

    Ok((pool, connector))
}

#[tokio::test]
async fn it_opens_initial_connections() -> anyhow::Result<()> {
    for (initial, max) in [(0, 1), (1, 1), (3, 5), (8, 8)] {
        let (pool, connector) = pool(initial, max).await?;

        assert_eq!(pool.size(), initial);
        assert_eq!(pool.max_size(), max);
        assert_eq!(connector.counters().opened(), initial);
    }

    Ok(())
}

#[tokio::test]
async fn it_rejects_invalid_sizes() -> anyhow::Result<()> {
    setup_if_needed();

    for (initial, max) in [(2, 1), (0, 0), (1, 0)] {
        let connector = MockConnector::new();
        let err = Pool::connect(initial, max, connector.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)), "{err:?}");
        assert_eq!(connector.counters().opened(), 0);
    }

    Ok(())
}

#[tokio::test]
async fn it_closes_prewarmed_connections_when_the_connector_fails() -> anyhow::Result<()> {
    setup_if_needed();

    let connector = MockConnector::new().fail_on(4);
    let counters = connector.counters();

    let err = PoolOptions::new()
        .initial_size(5)
        .max_size(5)
        .connect_with(connector)
        .await
        .unwrap_err();

    match err {
        Error::PoolFill { source } => assert!(matches!(*source, Error::Io(_))),
        other => panic!("expected PoolFill, got {other:?}"),
    }

    assert_eq!(counters.opened(), 3);
    assert_eq!(counters.closed(), 3);

    Ok(())
}

#[tokio::test]
async fn it_recycles_closed_connections() -> anyhow::Result<()> {
    let (pool, connector) = pool(2, 4).await?;

    let conn = pool.acquire().await?;
    let id = conn.id();
    assert_eq!(pool.size(), 1);

    conn.close().await?;
    assert_eq!(pool.size(), 2);
    assert_eq!(connector.counters().closed(), 0);

    // the buffer is FIFO: the other pre-warmed connection comes out first
    let first = pool.acquire().await?;
    let second = pool.acquire().await?;
    assert_ne!(first.id(), id);
    assert_eq!(second.id(), id);
    assert_eq!(connector.counters().opened(), 2);

    Ok(())
}

#[tokio::test]
async fn it_discards_connections_marked_unusable() -> anyhow::Result<()> {
    let (pool, connector) = pool(1, 4).await?;

    let mut conn = pool.acquire().await?;
    assert!(!conn.is_unusable());

    conn.mark_unusable();
    assert!(conn.is_unusable());

    conn.close().await?;

    assert_eq!(pool.size(), 0);
    assert_eq!(connector.counters().closed(), 1);

    // dropping an unusable connection does not return it either
    let mut conn = pool.acquire().await?;
    conn.mark_unusable();
    drop(conn);

    assert_eq!(pool.size(), 0);

    Ok(())
}

#[tokio::test]
async fn it_opens_connections_beyond_the_idle_count() -> anyhow::Result<()> {
    let (pool, connector) = pool(2, 3).await?;

    let mut conns = Vec::new();
    for _ in 0..5 {
        conns.push(pool.acquire().await?);
    }

    assert_eq!(connector.counters().opened(), 5);
    assert_eq!(pool.size(), 0);

    // every connection is usable
    for conn in &mut conns {
        conn.write_all(b"ping").await?;

        let mut buf = [0u8; 4];
        conn.peer().read_exact(&mut buf).await?;
        assert_eq!(&buf, b"ping");
    }

    Ok(())
}

#[tokio::test]
async fn it_closes_connections_released_into_a_full_pool() -> anyhow::Result<()> {
    let (pool, connector) = pool(0, 2).await?;

    let mut conns = Vec::new();
    for _ in 0..5 {
        conns.push(pool.acquire().await?);
    }

    for conn in conns {
        conn.close().await?;
        assert!(pool.size() <= 2);
    }

    assert_eq!(pool.size(), 2);
    assert_eq!(connector.counters().closed(), 3);

    Ok(())
}

#[tokio::test]
async fn it_reports_errors_from_real_closes() -> anyhow::Result<()> {
    let (pool, _connector) = pool(0, 1).await?;

    let mut conn = pool.acquire().await?;
    conn.fail_close();
    conn.mark_unusable();

    let err = conn.close().await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));

    Ok(())
}

#[tokio::test]
async fn it_closes_idle_connections_on_close() -> anyhow::Result<()> {
    let (pool, connector) = pool(3, 5).await?;

    let checked_out = pool.acquire().await?;
    assert_eq!(pool.size(), 2);

    pool.close().await;

    assert!(pool.is_closed());
    assert_eq!(pool.size(), 0);
    assert_eq!(connector.counters().closed(), 2);

    let err = pool.acquire().await.unwrap_err();
    assert!(err.is_pool_closed());
    assert!(pool.try_acquire().is_none());

    // closing again is harmless
    pool.close().await;
    assert_eq!(connector.counters().closed(), 2);

    // a connection checked out before the close is closed for real, without error
    checked_out.close().await?;
    assert_eq!(connector.counters().closed(), 3);
    assert_eq!(pool.size(), 0);

    Ok(())
}

#[tokio::test]
async fn it_closes_an_empty_pool() -> anyhow::Result<()> {
    let (pool, connector) = pool(0, 1).await?;

    pool.close().await;

    assert!(pool.is_closed());
    assert_eq!(connector.counters().closed(), 0);
    assert!(matches!(pool.acquire().await, Err(Error::PoolClosed)));

    Ok(())
}

#[tokio::test]
async fn it_returns_dropped_connections() -> anyhow::Result<()> {
    let (pool, connector) = pool(1, 2).await?;

    let conn = pool.acquire().await?;
    assert_eq!(pool.size(), 0);

    drop(conn);
    assert_eq!(pool.size(), 1);

    let conn = pool.acquire().await?;
    pool.close().await;
    drop(conn);

    // the pool is closed: the connection is dropped without being pooled or really closed
    assert_eq!(pool.size(), 0);
    assert_eq!(connector.counters().opened(), 1);
    assert_eq!(connector.counters().closed(), 0);

    Ok(())
}

#[tokio::test]
async fn it_keeps_detached_connections_out_of_the_pool() -> anyhow::Result<()> {
    let (pool, connector) = pool(1, 2).await?;

    let conn = pool.acquire().await?;
    let raw = conn.detach();
    assert_eq!(pool.size(), 0);

    raw.close().await?;
    assert_eq!(pool.size(), 0);
    assert_eq!(connector.counters().closed(), 1);

    Ok(())
}

#[tokio::test]
async fn it_never_opens_connections_in_try_acquire() -> anyhow::Result<()> {
    let (pool, connector) = pool(1, 2).await?;

    let conn = pool.try_acquire().expect("one idle connection");
    assert!(pool.try_acquire().is_none());
    assert_eq!(connector.counters().opened(), 1);

    conn.close().await?;
    assert!(pool.try_acquire().is_some());

    Ok(())
}

#[tokio::test]
async fn it_tracks_connection_timestamps() -> anyhow::Result<()> {
    let (pool, _connector) = pool(1, 1).await?;

    let conn = pool.acquire().await?;
    let created_at = conn.created_at();
    let first_acquired_at = conn.acquired_at();
    assert!(first_acquired_at >= created_at);
    conn.close().await?;

    tokio::time::sleep(Duration::from_millis(10)).await;

    let conn = pool.acquire().await?;
    assert_eq!(conn.created_at(), created_at);
    assert!(conn.acquired_at() > first_acquired_at);

    Ok(())
}

#[tokio::test]
async fn it_closes_for_real_once_the_pool_is_dropped() -> anyhow::Result<()> {
    let (pool, connector) = pool(0, 1).await?;

    let conn = pool.acquire().await?;
    drop(pool);

    conn.close().await?;
    assert_eq!(connector.counters().closed(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn it_waits_for_a_concurrent_close() -> anyhow::Result<()> {
    let (pool, connector) = pool(8, 8).await?;

    let closers = (0..4)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.close().await })
        })
        .collect::<Vec<_>>();

    for closed in join_all(closers).await {
        closed?;
    }

    // every caller only returns once the drain is done
    assert_eq!(connector.counters().closed(), 8);

    Ok(())
}

#[tokio::test]
async fn it_resumes_a_cancelled_close() -> anyhow::Result<()> {
    setup_if_needed();

    let connector = MockConnector::new().close_delay(Duration::from_millis(200));
    let pool = Pool::connect(2, 2, connector.clone()).await?;

    let cancelled = tokio::time::timeout(Duration::from_millis(50), pool.close()).await;
    assert!(cancelled.is_err());

    assert!(pool.is_closed());
    assert!(matches!(pool.acquire().await, Err(Error::PoolClosed)));

    tokio::time::timeout(Duration::from_secs(3), pool.close()).await?;

    assert_eq!(pool.size(), 0);
    assert_eq!(connector.counters().closed(), 2);

    // a finished close stays finished
    tokio::time::timeout(Duration::from_secs(1), pool.close()).await?;

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn it_closes_while_connections_are_in_use() -> anyhow::Result<()> {
    const MAX_SIZE: usize = 4;
    const TASKS: usize = 16;

    let (pool, connector) = pool(MAX_SIZE, MAX_SIZE).await?;

    let tasks = (0..TASKS)
        .map(|task| {
            let pool = pool.clone();
            tokio::spawn(async move {
                for i in 0.. {
                    let mut conn = match pool.acquire().await {
                        Ok(conn) => conn,
                        Err(Error::PoolClosed) => return anyhow::Ok(()),
                        Err(e) => return Err(e.into()),
                    };

                    if (task + i) % 7 == 0 {
                        conn.mark_unusable();
                    }

                    if i % 2 == 0 {
                        conn.close().await?;
                    } else {
                        drop(conn);
                    }

                    tokio::task::yield_now().await;
                }

                Ok(())
            })
        })
        .collect::<Vec<_>>();

    tokio::time::timeout(Duration::from_secs(30), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.close().await;

        assert!(pool.is_closed());
        assert_eq!(pool.size(), 0);

        for result in join_all(tasks).await {
            result??;
        }

        anyhow::Ok(())
    })
    .await??;

    // connections released after the close never make it back into the pool
    assert_eq!(pool.size(), 0);

    let counters = connector.counters();
    assert!(counters.closed() <= counters.opened());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn it_stays_bounded_under_concurrent_use() -> anyhow::Result<()> {
    const MAX_SIZE: usize = 4;
    const TASKS: usize = 32;
    const ITERATIONS: usize = 200;

    let (pool, connector) = pool(2, MAX_SIZE).await?;

    let tasks = (0..TASKS)
        .map(|task| {
            let pool = pool.clone();
            tokio::spawn(async move {
                for i in 0..ITERATIONS {
                    let mut conn = pool.acquire().await?;
                    assert!(pool.size() <= MAX_SIZE);

                    if (task + i) % 17 == 0 {
                        conn.mark_unusable();
                    }

                    if i % 2 == 0 {
                        conn.close().await?;
                    } else {
                        drop(conn);
                    }

                    assert!(pool.size() <= MAX_SIZE);
                    tokio::task::yield_now().await;
                }

                anyhow::Ok(())
            })
        })
        .collect::<Vec<_>>();

    tokio::time::timeout(Duration::from_secs(30), async {
        for result in join_all(tasks).await {
            result??;
        }

        anyhow::Ok(())
    })
    .await??;

    let counters = connector.counters();
    assert!(pool.size() <= MAX_SIZE);

    pool.close().await;

    // dropped connections are not counted as closed, so this is an upper bound
    assert!(counters.closed() <= counters.opened());
    assert_eq!(pool.size(), 0);

    Ok(())
}
