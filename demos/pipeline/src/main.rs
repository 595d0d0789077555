use std::sync::Arc;

use ambit::{
    bridge, lookup, record_metric, scope, shutdown_background_tasks, shutdown_dependencies,
    BoxError, Metric, MetricsSink, ScopeIdentity,
};

#[derive(Clone, Debug)]
struct BatchSize(usize);

struct StdoutSink;

impl MetricsSink for StdoutSink {
    fn enter_scope(&self, scope: &ScopeIdentity) -> Result<(), BoxError> {
        println!("enter {scope}");
        Ok(())
    }

    fn exit_scope(&self, scope: &ScopeIdentity) -> Result<(), BoxError> {
        println!("exit  {scope}");
        Ok(())
    }

    fn record(&self, scope: &ScopeIdentity, metric: &Metric) -> Result<(), BoxError> {
        println!("stat  {} {metric}", scope.label());
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    scope("pipeline")
        .with(BatchSize(4))
        .sink(Arc::new(StdoutSink))
        .run(async {
            let mut rows = bridge("row-source", |mut emitter| async move {
                let batch = lookup::<BatchSize>()?.0;
                for row in 0..batch {
                    emitter.send(row).await;
                }
                // A nested scope shrinks the batch for the tail of the feed.
                scope("tail")
                    .with(BatchSize(2))
                    .run(async {
                        let tail = lookup::<BatchSize>()?.0;
                        for row in 0..tail {
                            emitter.send(100 + row).await;
                        }
                        Ok::<_, BoxError>(())
                    })
                    .await
            });

            let mut count = 0u32;
            loop {
                match rows.next().await {
                    Ok(Some(row)) => {
                        println!("row {row}");
                        count += 1;
                    }
                    Ok(None) => break,
                    Err(error) => {
                        eprintln!("row source failed: {error}");
                        break;
                    }
                }
            }
            record_metric(Metric::counter("rows.consumed", f64::from(count)));

            // The root still sees its own batch size.
            println!(
                "root batch size after the feed: {}",
                lookup::<BatchSize>().map(|b| b.0).unwrap_or_default()
            );
        })
        .await;

    shutdown_background_tasks().await;
    shutdown_dependencies().await;
}
