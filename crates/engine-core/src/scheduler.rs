use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Fans one worker future per table across at most `max_workers`
/// concurrent tasks. A table failure never cancels its siblings;
/// cancellation is honored between tables, so in-flight work finishes
/// its current batch and closes its connection cleanly.
pub async fn run_tables<F, Fut>(
    names: Vec<String>,
    max_workers: usize,
    cancel: CancellationToken,
    worker: F,
) -> HashMap<String, bool>
where
    F: Fn(String) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut join_set = JoinSet::new();

    for name in names {
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();
        let worker = worker.clone();
        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (name, false);
            };
            if cancel.is_cancelled() {
                info!(table = %name, "skipping table, run cancelled");
                return (name, false);
            }
            let ok = worker(name.clone()).await;
            (name, ok)
        });
    }

    let mut results = HashMap::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((name, ok)) => {
                results.insert(name, ok);
            }
            Err(err) => {
                error!(%err, "table worker panicked");
            }
        }
    }
    results
}

/// Runs priority groups strictly in order: every table of priority `k`
/// finishes before any table of priority `k+1` starts.
pub async fn run_priority_groups<F, Fut>(
    groups: Vec<(u8, Vec<String>)>,
    max_workers: usize,
    cancel: CancellationToken,
    worker: F,
) -> HashMap<String, bool>
where
    F: Fn(String) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let mut results = HashMap::new();
    for (priority, names) in groups {
        if cancel.is_cancelled() {
            for name in names {
                results.insert(name, false);
            }
            continue;
        }
        info!(priority, tables = names.len(), "starting priority group");
        let group_results = run_tables(names, max_workers, cancel.clone(), worker.clone()).await;
        results.extend(group_results);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn all_tables_report_results() {
        let names: Vec<String> = (0..8).map(|i| format!("table_{i}")).collect();
        let results = run_tables(names.clone(), 3, CancellationToken::new(), |name| async move {
            !name.ends_with('3')
        })
        .await;

        assert_eq!(results.len(), 8);
        assert!(!results["table_3"]);
        assert!(results["table_0"]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let names: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();

        let (active_ref, peak_ref) = (active.clone(), peak.clone());
        let results = run_tables(names, 2, CancellationToken::new(), move |_name| {
            let active = active_ref.clone();
            let peak = peak_ref.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                true
            }
        })
        .await;

        assert_eq!(results.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn cancelled_runs_skip_remaining_tables() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let results = run_tables(
            vec!["a".to_string(), "b".to_string()],
            2,
            cancel,
            |_name| async move { true },
        )
        .await;
        assert!(results.values().all(|ok| !ok));
    }

    #[tokio::test]
    async fn priority_groups_run_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let groups = vec![
            (1, vec!["first_a".to_string(), "first_b".to_string()]),
            (5, vec!["second".to_string()]),
        ];

        let order_ref = order.clone();
        let results = run_priority_groups(groups, 4, CancellationToken::new(), move |name| {
            let order = order_ref.clone();
            async move {
                order.lock().unwrap().push(name);
                true
            }
        })
        .await;

        assert_eq!(results.len(), 3);
        let seen = order.lock().unwrap();
        let second_pos = seen.iter().position(|n| n == "second").unwrap();
        assert_eq!(second_pos, 2);
    }
}
