use service_directory::{Directory, InMemoryDirectory, SnapshotTracker, Update};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let directory = InMemoryDirectory::new(["10.0.0.1:5000", "10.0.0.2:5000"]);
    let mut feed = directory.subscribe().await?;

    // Drive some churn from another task while we consume the feed.
    let backend = directory.clone();
    tokio::spawn(async move {
        let pause = || tokio::time::sleep(Duration::from_millis(100));
        pause().await;
        backend.remove(&"10.0.0.2:5000");
        pause().await;
        backend.fail("registry unavailable");
        pause().await;
        backend.recover();
        pause().await;
        backend.shutdown();
    });

    let mut tracker = SnapshotTracker::new();
    while let Some(event) = feed.next().await {
        match tracker.observe(event) {
            Update::Changed(diff) => {
                println!("ADDED={:?} REMOVED={:?}", diff.added, diff.removed)
            }
            Update::Unchanged => println!("UNCHANGED"),
            Update::Degraded { consecutive_errors } => {
                println!("DEGRADED={consecutive_errors} SERVING={:?}", tracker.current())
            }
        }
    }

    println!("FEED ENDED");

    Ok(())
}
