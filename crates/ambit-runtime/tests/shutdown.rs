//! Lives in its own binary because shutdown drains the process-wide task
//! registry, which would race with other tests' background tasks.

use std::time::Duration;

use ambit_runtime::{shutdown_background_tasks, spawn, TaskError};

#[tokio::test]
async fn shutdown_aborts_in_flight_tasks_and_waits_for_them() {
    let stuck = spawn("stuck", async {
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    let also_stuck = spawn("also-stuck", async {
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    tokio::task::yield_now().await;

    shutdown_background_tasks().await;

    assert!(matches!(stuck.await, Err(TaskError::Cancelled)));
    assert!(matches!(also_stuck.await, Err(TaskError::Cancelled)));

    // Tasks spawned afterwards run normally.
    let fresh = spawn("fresh", async { 1u32 });
    assert_eq!(fresh.await.unwrap(), 1);
}
