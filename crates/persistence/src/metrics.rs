//! Database metrics collection.
//!
//! Query latency histograms and connection pool gauges.

use metrics::{counter, gauge, histogram};
use sqlx::PgPool;
use std::future::Future;
use std::time::Instant;

/// Record connection pool gauges.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("gateway_db_connections", "state" => "active").set(active as f64);
    gauge!("gateway_db_connections", "state" => "idle").set(idle as f64);
}

/// Times one query and records its outcome.
pub struct QueryTimer {
    query: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            start: Instant::now(),
        }
    }

    pub fn record(self, ok: bool) {
        histogram!("gateway_db_query_duration_seconds", "query" => self.query)
            .record(self.start.elapsed().as_secs_f64());
        if !ok {
            counter!("gateway_db_query_errors_total", "query" => self.query).increment(1);
        }
    }
}

/// Awaits `query` under a [`QueryTimer`].
pub async fn timed<T, F>(query: &'static str, fut: F) -> Result<T, sqlx::Error>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let timer = QueryTimer::new(query);
    let result = fut.await;
    timer.record(result.is_ok());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_timer_creation() {
        let timer = QueryTimer::new("touch_online");
        assert_eq!(timer.query, "touch_online");
    }

    #[tokio::test]
    async fn test_timed_passes_result_through() {
        let ok: Result<i32, sqlx::Error> = timed("noop", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<i32, sqlx::Error> =
            timed("noop", async { Err(sqlx::Error::RowNotFound) }).await;
        assert!(matches!(err, Err(sqlx::Error::RowNotFound)));
    }
}
